//! Classical planning over a STRIPS-style state representation.
//!
//! States are sets of ground literals in a [`kb::FactBase`]; operators are
//! [`strips::ActionSchema`]s grounded over a problem's object constants.
//! Three planners are provided: [`graphplan::GraphPlan`] builds a planning
//! graph with mutual-exclusion reasoning and extracts layered plans by
//! backward search, [`pop::PartialOrderPlanner`] refines a partially ordered
//! plan through causal links and threat resolution, and
//! [`htn::hierarchical_search`] decomposes high-level tasks against a
//! refinement library under resource and job-ordering constraints.
//!
//! The benchmark problems (air cargo, spare tire, block tower, ...) live in
//! [`domains`].

pub mod domains;
pub mod graphplan;
pub mod htn;
pub mod kb;
pub mod logic;
pub mod pop;
pub mod strips;
