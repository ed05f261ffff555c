//! Partial-order planning with causal links and threat resolution.
//!
//! The planner maintains a partially ordered set of actions, a set of causal
//! links protecting achieved preconditions, and a directed ordering-constraint
//! graph that must stay acyclic. Refinement is a depth-first search over
//! achiever choices: each step closes one open precondition from the agenda,
//! and a choice whose orderings or threats cannot be resolved is rolled back
//! to its snapshot before the next achiever is tried. The final plan is a
//! topological layering of the constraint graph.

use crate::logic::{Literal, Term};
use crate::strips::{GroundAction, Problem};
use anyhow::{ensure, Result};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Identifier of an action within the planner's pool.
type NodeId = usize;

const START: NodeId = 0;
const FINISH: NodeId = 1;

/// A refinement branch stops after closing this many agenda entries, and the
/// whole search aborts with it; reaching the cap is a recoverable "no
/// solution found", not a fault.
const ITERATION_LIMIT: usize = 200;

/// Expected dead-ends of a partial-order planning run. The three variants are
/// deliberately distinct: an unreachable goal, an unresolvable threat and
/// plain exhaustion call for different reactions from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PopError {
    #[error("no achiever exists for open precondition {0}")]
    UnreachableGoal(Literal),
    #[error("no ordering resolves the threat against causal link protecting {0}")]
    UnresolvableThreat(Literal),
    #[error("no solution found within {0} iterations")]
    Exhausted(usize),
}

/// A record that `producer` achieves `literal` for `consumer`. Any action
/// with the complementary effect ordered between the two would break the
/// link and must be promoted or demoted out of the interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CausalLink {
    pub producer: NodeId,
    pub literal: Literal,
    pub consumer: NodeId,
}

pub struct PartialOrderPlanner {
    /// All candidate actions: `Start`, `Finish`, then every grounding of the
    /// problem's schemas over its constants. Ids are indices into this pool.
    pool: Vec<GroundAction>,
    /// Pool members committed to the plan.
    in_plan: BTreeSet<NodeId>,
    /// Directed ordering edges; invariant: acyclic.
    constraints: BTreeSet<(NodeId, NodeId)>,
    causal_links: Vec<CausalLink>,
    /// Open preconditions: `(literal, consumer)`.
    agenda: BTreeSet<(Literal, NodeId)>,
}

impl PartialOrderPlanner {
    pub fn new(problem: &Problem) -> Result<PartialOrderPlanner> {
        for g in &problem.goals {
            ensure!(g.is_ground(), "partial-order planning requires ground goals, got {g}");
        }
        let start = GroundAction {
            name: "Start".to_string(),
            args: Vec::new(),
            precond: Vec::new(),
            effect: problem.init.clone(),
            persistence: false,
        };
        let finish = GroundAction {
            name: "Finish".to_string(),
            args: Vec::new(),
            precond: problem.goals.clone(),
            effect: Vec::new(),
            persistence: false,
        };
        let mut pool = vec![start, finish];
        pool.extend(ground_expansions(problem));
        Ok(PartialOrderPlanner {
            pool,
            in_plan: [START, FINISH].into(),
            constraints: [(START, FINISH)].into(),
            causal_links: Vec::new(),
            agenda: problem.goals.iter().map(|g| (g.clone(), FINISH)).collect(),
        })
    }

    /// Convenience: build the planner and run it.
    pub fn solve(problem: &Problem) -> Result<Vec<Vec<GroundAction>>, anyhow::Error> {
        Ok(PartialOrderPlanner::new(problem)?.execute()?)
    }

    pub fn constraints(&self) -> &BTreeSet<(NodeId, NodeId)> {
        &self.constraints
    }

    pub fn causal_links(&self) -> &[CausalLink] {
        &self.causal_links
    }

    pub fn is_acyclic(&self) -> bool {
        !cyclic(&self.constraints)
    }

    /// Runs the refinement search to completion and returns the topologically
    /// layered plan (sentinels excluded).
    pub fn execute(&mut self) -> Result<Vec<Vec<GroundAction>>, PopError> {
        let _span = tracing::span!(tracing::Level::TRACE, "pop").entered();
        self.refine(0)?;
        debug_assert!(self.is_acyclic());
        Ok(self.plan())
    }

    /// Closes one open precondition and recurses. Every candidate achiever is
    /// tried in turn, rolling the planner back to the pre-candidate snapshot
    /// when a branch dead-ends further down; the first fully refined branch
    /// wins. Hitting the depth cap aborts the whole search so non-converging
    /// runs stay bounded.
    fn refine(&mut self, depth: usize) -> Result<(), PopError> {
        if self.agenda.is_empty() {
            tracing::debug!("agenda closed after {depth} refinement steps");
            return Ok(());
        }
        if depth >= ITERATION_LIMIT {
            return Err(PopError::Exhausted(ITERATION_LIMIT));
        }
        let (goal, consumer) = self.select_open_precondition()?;
        self.agenda.remove(&(goal.clone(), consumer));
        let mut failure = None;
        for act0 in self.achievers(&goal, consumer) {
            let snapshot = self.snapshot();
            let attempt = self.commit(act0, &goal, consumer).and_then(|()| self.refine(depth + 1));
            match attempt {
                Ok(()) => return Ok(()),
                Err(PopError::Exhausted(limit)) => {
                    self.restore(snapshot);
                    return Err(PopError::Exhausted(limit));
                }
                Err(e) => {
                    self.restore(snapshot);
                    failure.get_or_insert(e);
                }
            }
        }
        Err(failure.unwrap_or(PopError::UnreachableGoal(goal)))
    }

    /// Commits `act0` as the achiever and re-protects every causal link.
    /// Failures here are ordering failures and surface as unresolvable
    /// threats; `UnreachableGoal` is reserved for preconditions with no
    /// candidate achiever at all.
    fn commit(&mut self, act0: NodeId, goal: &Literal, consumer: NodeId) -> Result<(), PopError> {
        if !self.support(act0, goal, consumer) {
            return Err(PopError::UnresolvableThreat(goal.clone()));
        }
        self.protect_all().map_err(PopError::UnresolvableThreat)
    }

    /// Least commitment: the open precondition with the fewest candidate
    /// achievers. Ties break on the `Ord` of `(literal, consumer)`, the
    /// agenda's iteration order, so runs are reproducible.
    fn select_open_precondition(&self) -> Result<(Literal, NodeId), PopError> {
        let mut best: Option<(usize, Literal, NodeId)> = None;
        for (lit, consumer) in &self.agenda {
            let n = self.achievers(lit, *consumer).len();
            if n == 0 {
                return Err(PopError::UnreachableGoal(lit.clone()));
            }
            if best.as_ref().is_none_or(|(c, _, _)| n < *c) {
                best = Some((n, lit.clone(), *consumer));
            }
        }
        let (_, lit, consumer) = best.expect("select called with an empty agenda");
        Ok((lit, consumer))
    }

    /// Candidate achievers of `goal`: committed actions first, then fresh
    /// pool groundings with the fewest preconditions left unsupported by the
    /// initial state. The sort is stable, so ties keep pool order and runs
    /// are reproducible.
    fn achievers(&self, goal: &Literal, consumer: NodeId) -> Vec<NodeId> {
        let candidate = |id: NodeId| id != consumer && id != FINISH && self.pool[id].effect.contains(goal);
        let committed = self.in_plan.iter().copied().filter(|&id| candidate(id));
        let mut fresh: Vec<NodeId> = (0..self.pool.len())
            .filter(|id| !self.in_plan.contains(id))
            .filter(|&id| candidate(id))
            .collect();
        fresh.sort_by_key(|&id| self.unsupported_preconds(id));
        committed.chain(fresh).collect()
    }

    /// How many of the action's preconditions `Start` does not establish.
    fn unsupported_preconds(&self, id: NodeId) -> usize {
        let init = &self.pool[START].effect;
        self.pool[id].precond.iter().filter(|p| !init.contains(p)).count()
    }

    /// Commits `act0` as the achiever of `(goal, consumer)`: orders it after
    /// `Start` and before `consumer`, opens its own preconditions, and
    /// records the causal link. Fails (caller restores) if an ordering would
    /// close a cycle.
    fn support(&mut self, act0: NodeId, goal: &Literal, consumer: NodeId) -> bool {
        if !self.in_plan.contains(&act0) {
            self.in_plan.insert(act0);
            let preconds = self.pool[act0].precond.clone();
            for p in preconds {
                self.agenda.insert((p, act0));
            }
        }
        if act0 != START && !self.add_const(START, act0) {
            return false;
        }
        if !self.add_const(act0, consumer) {
            return false;
        }
        self.causal_links.push(CausalLink {
            producer: act0,
            literal: goal.clone(),
            consumer,
        });
        true
    }

    /// Inserts an ordering edge unless it is degenerate (self edge, anything
    /// before `Start` or after `Finish`) or would close a cycle.
    fn add_const(&mut self, a: NodeId, b: NodeId) -> bool {
        if a == b || b == START || a == FINISH {
            return false;
        }
        if self.constraints.contains(&(a, b)) {
            return true;
        }
        self.constraints.insert((a, b));
        if cyclic(&self.constraints) {
            self.constraints.remove(&(a, b));
            return false;
        }
        true
    }

    /// Checks every causal link against every committed action. A threat is
    /// resolved by promotion (threat after the link's consumer) or demotion
    /// (threat before the link's producer); if neither keeps the ordering
    /// acyclic, returns the protected literal.
    fn protect_all(&mut self) -> Result<(), Literal> {
        let links = self.causal_links.clone();
        let members: Vec<NodeId> = self.in_plan.iter().copied().collect();
        for link in &links {
            for &a in &members {
                if a == link.producer || a == link.consumer {
                    continue;
                }
                if !self.pool[a].effect.contains(&link.literal.complement()) {
                    continue;
                }
                if self.add_const(link.consumer, a) {
                    continue;
                }
                if self.add_const(a, link.producer) {
                    continue;
                }
                return Err(link.literal.clone());
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            in_plan: self.in_plan.clone(),
            constraints: self.constraints.clone(),
            agenda: self.agenda.clone(),
            links: self.causal_links.len(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.in_plan = snapshot.in_plan;
        self.constraints = snapshot.constraints;
        self.agenda = snapshot.agenda;
        self.causal_links.truncate(snapshot.links);
    }

    /// The committed actions layered by `toposort`, sentinels stripped.
    fn plan(&self) -> Vec<Vec<GroundAction>> {
        self.toposort()
            .into_iter()
            .map(|layer| {
                layer
                    .into_iter()
                    .filter(|&id| id != START && id != FINISH)
                    .map(|id| self.pool[id].clone())
                    .collect::<Vec<_>>()
            })
            .filter(|layer| !layer.is_empty())
            .collect()
    }

    /// Kahn-style layering of the committed actions under the ordering
    /// constraints.
    pub fn toposort(&self) -> Vec<Vec<NodeId>> {
        layered_toposort(&self.in_plan, &self.constraints)
    }
}

struct Snapshot {
    in_plan: BTreeSet<NodeId>,
    constraints: BTreeSet<(NodeId, NodeId)>,
    agenda: BTreeSet<(Literal, NodeId)>,
    links: usize,
}

/// Every grounding of every schema over the problem's constants (initial
/// facts and goals alike). No precondition filtering: unlike the planning
/// graph, the partial-order planner has no current state to filter against.
fn ground_expansions(problem: &Problem) -> Vec<GroundAction> {
    let mut objects = problem.objects();
    objects.extend(
        problem
            .goals
            .iter()
            .flat_map(|g| g.args.iter())
            .filter(|t| !t.is_var())
            .cloned(),
    );
    let objects: Vec<Term> = objects.into_iter().collect();
    let mut out = Vec::new();
    for schema in &problem.actions {
        let free: Vec<usize> = (0..schema.arity()).filter(|&i| schema.params()[i].is_var()).collect();
        for perm in objects.iter().permutations(free.len()) {
            let mut args = schema.params().to_vec();
            for (&slot, obj) in free.iter().zip(perm) {
                args[slot] = obj.clone();
            }
            let ground = schema.ground(&args);
            // a grounding that both asserts and denies the same atom can
            // never execute; keep it out of the pool
            if ground.effect.iter().any(|e| ground.effect.contains(&e.complement())) {
                continue;
            }
            out.push(ground);
        }
    }
    out
}

/// Depth-first cycle detection over a directed edge set; catches self-loops
/// and longer cycles alike.
fn cyclic(edges: &BTreeSet<(NodeId, NodeId)>) -> bool {
    let mut adjacency: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for &(a, b) in edges {
        adjacency.entry(a).or_default().push(b);
    }
    // 0 = unvisited, 1 = on the current path, 2 = done
    let mut marks: BTreeMap<NodeId, u8> = BTreeMap::new();
    fn visit(node: NodeId, adjacency: &BTreeMap<NodeId, Vec<NodeId>>, marks: &mut BTreeMap<NodeId, u8>) -> bool {
        match marks.get(&node) {
            Some(1) => return true,
            Some(2) => return false,
            _ => {}
        }
        marks.insert(node, 1);
        if let Some(succs) = adjacency.get(&node) {
            for &s in succs {
                if visit(s, adjacency, marks) {
                    return true;
                }
            }
        }
        marks.insert(node, 2);
        false
    }
    let nodes: Vec<NodeId> = adjacency.keys().copied().collect();
    nodes.into_iter().any(|n| visit(n, &adjacency, &mut marks))
}

/// Repeatedly peels off the set of nodes with no unsatisfied dependency.
///
/// Panics if a non-empty residue has no source: a cycle survived into the
/// final ordering, which `add_const`/`protect` are supposed to rule out.
fn layered_toposort(nodes: &BTreeSet<NodeId>, edges: &BTreeSet<(NodeId, NodeId)>) -> Vec<Vec<NodeId>> {
    let mut remaining = nodes.clone();
    let mut edges: Vec<(NodeId, NodeId)> = edges
        .iter()
        .filter(|(a, b)| nodes.contains(a) && nodes.contains(b))
        .copied()
        .collect();
    let mut layers = Vec::new();
    while !remaining.is_empty() {
        let blocked: BTreeSet<NodeId> = edges.iter().map(|&(_, b)| b).collect();
        let layer: Vec<NodeId> = remaining.iter().copied().filter(|n| !blocked.contains(n)).collect();
        assert!(!layer.is_empty(), "ordering constraints contain a cycle");
        for n in &layer {
            remaining.remove(n);
        }
        edges.retain(|(a, _)| remaining.contains(a));
        layers.push(layer);
    }
    layers
}
