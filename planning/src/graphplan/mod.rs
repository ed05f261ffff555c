//! GraphPlan: lazy construction of a planning graph and backward solution
//! extraction with mutex-aware backtracking and nogood caching.

mod level;

pub use level::{ActId, Level};

use crate::logic::{Literal, Term};
use crate::strips::{ActionSchema, GroundAction, Problem};
use anyhow::{ensure, Result};
use itertools::Itertools;
use std::collections::BTreeSet;

/// An extensible sequence of levels, grown one level at a time from the
/// initial facts and a fixed schema set.
#[derive(Debug)]
pub struct Graph {
    levels: Vec<Level>,
    schemas: Vec<ActionSchema>,
    objects: Vec<Term>,
}

impl Graph {
    pub fn new(problem: &Problem) -> Graph {
        Graph {
            levels: vec![Level::initial(problem.initial_state())],
            schemas: problem.actions.clone(),
            objects: problem.objects().into_iter().collect(),
        }
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// Builds and mutex-analyzes the newest level, then appends its
    /// successor.
    pub fn expand(&mut self) {
        let last = self.levels.last_mut().unwrap();
        last.build(&self.schemas, &self.objects);
        last.find_mutex();
        let next = last.next_level();
        self.levels.push(next);
    }

    /// True iff no pair of goals is proposition-mutex at the given level.
    pub fn non_mutex_goals(&self, goals: &[Literal], index: usize) -> bool {
        goals
            .iter()
            .tuple_combinations()
            .all(|(p, q)| !self.levels[index].props_mutex(p, q))
    }

    /// Fixed point: the two newest levels hold the same facts, so further
    /// expansion cannot reveal anything new.
    pub fn leveled_off(&self) -> bool {
        let n = self.levels.len();
        n >= 2 && self.levels[n - 1].state() == self.levels[n - 2].state()
    }
}

/// A level-ordered plan: one set of mutually compatible actions per planning
/// graph layer, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayeredPlan(pub Vec<Vec<GroundAction>>);

impl LayeredPlan {
    /// Number of layers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drops the frame actions and flattens the layers into a single
    /// sequence suitable for sequential replay. The three mutex categories
    /// leave a layer's actions free to delete each other's preconditions, so
    /// within a layer an action is emitted only once no remaining peer still
    /// needs a literal it deletes; when every remaining action clobbers
    /// another, layer order is kept as is.
    pub fn linearize(&self) -> Vec<GroundAction> {
        let mut out = Vec::new();
        for layer in &self.0 {
            let mut remaining: Vec<GroundAction> = layer.iter().filter(|a| !a.persistence).cloned().collect();
            while !remaining.is_empty() {
                let pick = (0..remaining.len())
                    .find(|&i| {
                        remaining.iter().enumerate().all(|(j, peer)| {
                            j == i || !peer.precond.iter().any(|p| remaining[i].effect.contains(&p.complement()))
                        })
                    })
                    .unwrap_or(0);
                out.push(remaining.remove(pick));
            }
        }
        out
    }
}

type GoalSet = BTreeSet<Literal>;

/// The GraphPlan solver: drives graph expansion and extracts a plan by
/// backward search through the levels.
pub struct GraphPlan {
    graph: Graph,
    goals: Vec<Literal>,
    /// `(level, goals)` combinations proven unreachable.
    nogoods: BTreeSet<(usize, GoalSet)>,
}

impl GraphPlan {
    pub fn new(problem: &Problem) -> Result<GraphPlan> {
        for g in &problem.goals {
            ensure!(g.is_ground(), "GraphPlan requires ground goals, got {g}");
        }
        Ok(GraphPlan {
            graph: Graph::new(problem),
            goals: problem.goals.clone(),
            nogoods: BTreeSet::new(),
        })
    }

    /// Convenience: build the solver and run it.
    pub fn solve(problem: &Problem) -> Result<Option<LayeredPlan>> {
        Ok(GraphPlan::new(problem)?.run())
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Expands the graph until the goals show up mutually non-mutex and a
    /// plan can be extracted, or until the graph levels off. Leveling off
    /// without a plan is a definitive negative result, hence `None` rather
    /// than an error.
    pub fn run(&mut self) -> Option<LayeredPlan> {
        let _span = tracing::span!(tracing::Level::TRACE, "graphplan").entered();
        loop {
            let index = self.graph.levels().len() - 1;
            if self.goals_reachable(index) {
                let goals: GoalSet = self.goals.iter().cloned().collect();
                if let Some(layers) = self.extract(goals, index) {
                    tracing::debug!("plan found at level {index}");
                    return Some(LayeredPlan(layers));
                }
            }
            if self.graph.leveled_off() {
                tracing::debug!("graph leveled off after {} levels", self.graph.levels().len());
                return None;
            }
            self.graph.expand();
        }
    }

    /// All goals present at the level and no pair of them mutex.
    fn goals_reachable(&self, index: usize) -> bool {
        let level = &self.graph.levels()[index];
        self.goals.iter().all(|g| level.state().contains(g)) && self.graph.non_mutex_goals(&self.goals, index)
    }

    /// Backward extraction: picks one achiever per goal in the previous
    /// level, rejects internally mutex combinations, and regresses the goal
    /// set to the union of the chosen achievers' preconditions. Failed
    /// `(level, goals)` branches are cached as nogoods. Returns the first
    /// plan found.
    fn extract(&mut self, goals: GoalSet, index: usize) -> Option<Vec<Vec<GroundAction>>> {
        if goals.is_empty() || index == 0 {
            return Some(Vec::new());
        }
        {
            let level = &self.graph.levels()[index];
            if goals.iter().tuple_combinations().any(|(p, q)| level.props_mutex(p, q)) {
                self.nogoods.insert((index, goals));
                return None;
            }
        }

        // One achiever choice per goal; combinations in deterministic order.
        let combos: Vec<BTreeSet<ActId>> = {
            let prev = &self.graph.levels()[index - 1];
            let choices: Vec<&[ActId]> = goals.iter().map(|g| prev.producers_of(g)).collect();
            if choices.iter().any(|c| c.is_empty()) {
                self.nogoods.insert((index, goals));
                return None;
            }
            choices
                .iter()
                .map(|c| c.iter().copied())
                .multi_cartesian_product()
                .map(|combo| combo.into_iter().collect::<BTreeSet<ActId>>())
                .filter(|set| {
                    !set.iter()
                        .tuple_combinations()
                        .any(|(&a, &b)| prev.actions_mutex(a, b))
                })
                .dedup()
                .collect()
        };

        for set in combos {
            let new_goals: GoalSet = {
                let prev = &self.graph.levels()[index - 1];
                set.iter()
                    .flat_map(|&id| prev.action(id).precond.iter().cloned())
                    .collect()
            };
            if self.nogoods.contains(&(index - 1, new_goals.clone())) {
                continue;
            }
            if let Some(mut layers) = self.extract(new_goals, index - 1) {
                let prev = &self.graph.levels()[index - 1];
                layers.push(set.iter().map(|&id| prev.action(id).clone()).collect());
                return Some(layers);
            }
        }

        self.nogoods.insert((index, goals));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::{have_cake_and_eat_cake_too, spare_tire};
    use crate::logic::Literal;

    fn lit(s: &str) -> Literal {
        Literal::parse(s).unwrap()
    }

    fn names(plan: &[GroundAction]) -> Vec<String> {
        plan.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn cake_is_eaten_then_rebaked() {
        let problem = have_cake_and_eat_cake_too();
        let plan = GraphPlan::solve(&problem).unwrap().expect("cake problem is solvable");
        assert_eq!(names(&plan.linearize()), vec!["Eat(Cake)", "Bake(Cake)"]);
    }

    #[test]
    fn spare_tire_needs_two_layers() {
        let problem = spare_tire();
        let plan = GraphPlan::solve(&problem).unwrap().expect("spare tire is solvable");
        assert_eq!(plan.len(), 2);
        let linear = names(&plan.linearize());
        assert_eq!(
            linear,
            vec!["Remove(Flat, Axle)", "Remove(Spare, Trunk)", "PutOn(Spare, Axle)"]
        );
    }

    #[test]
    fn mutex_goals_fail_without_recursing() {
        let problem = have_cake_and_eat_cake_too();
        let mut solver = GraphPlan::new(&problem).unwrap();
        solver.graph.expand();
        // At level 1, Have(Cake) and Eaten(Cake) are inconsistent-support
        // mutex: extraction must fail immediately and record the nogood.
        let goals: GoalSet = [lit("Have(Cake)"), lit("Eaten(Cake)")].into_iter().collect();
        assert!(!solver.graph.non_mutex_goals(&problem.goals, 1));
        assert!(solver.extract(goals.clone(), 1).is_none());
        assert!(solver.nogoods.contains(&(1, goals)));
    }

    #[test]
    fn leveling_off_reports_unsolvable() {
        // The spare tire problem with an unreachable goal: nothing ever puts
        // a tire back into the trunk.
        let mut problem = spare_tire();
        problem.goals = vec![lit("At(Flat, Trunk)")];
        assert_eq!(GraphPlan::solve(&problem).unwrap(), None);
    }

    #[test]
    fn trivially_satisfied_goals_yield_an_empty_plan() {
        let mut problem = have_cake_and_eat_cake_too();
        problem.goals = vec![lit("Have(Cake)")];
        let plan = GraphPlan::solve(&problem).unwrap().unwrap();
        assert!(plan.is_empty());
        assert!(plan.linearize().is_empty());
    }

    #[test]
    fn variable_goals_are_rejected() {
        let mut problem = spare_tire();
        problem.goals = vec![lit("At(t, Axle)")];
        assert!(GraphPlan::new(&problem).is_err());
    }
}
