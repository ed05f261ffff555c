//! One layer of the planning graph: the propositions true at this depth, the
//! ground actions applicable to them, the links between the two, and the
//! mutual-exclusion relations of the layer.

use crate::kb::FactBase;
use crate::logic::{Literal, Term};
use crate::strips::{ActionSchema, GroundAction};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};

/// Index of a ground action within its level. Stable identity for the mutex
/// relation; the actions themselves are value-compared across levels.
pub type ActId = usize;

/// A planning-graph layer. Immutable once built, except for the mutex sets
/// populated by [`Level::find_mutex`], which only ever grow.
#[derive(Debug, Clone)]
pub struct Level {
    /// Propositions true at this depth.
    state: FactBase,
    /// Mutex relation over this level's propositions, inherited from the
    /// inconsistent-support analysis of the previous level.
    state_mutex: BTreeSet<(Literal, Literal)>,
    /// Ground actions of the layer: one frame action per proposition plus
    /// every applicable schema grounding. Registration order is
    /// deterministic, so `ActId`s are reproducible.
    actions: Vec<GroundAction>,
    /// Proposition -> actions requiring it (current-state side).
    consumers: BTreeMap<Literal, Vec<ActId>>,
    /// Next-layer proposition -> actions producing it.
    producers: BTreeMap<Literal, Vec<ActId>>,
    /// Mutex relation over this layer's actions, pairs normalized `(lo, hi)`.
    action_mutex: BTreeSet<(ActId, ActId)>,
    /// Derived mutex relation over the *next* layer's propositions.
    next_state_mutex: BTreeSet<(Literal, Literal)>,
}

impl Level {
    pub fn initial(state: FactBase) -> Level {
        Level::inherited(state, BTreeSet::new())
    }

    fn inherited(state: FactBase, state_mutex: BTreeSet<(Literal, Literal)>) -> Level {
        Level {
            state,
            state_mutex,
            actions: Vec::new(),
            consumers: BTreeMap::new(),
            producers: BTreeMap::new(),
            action_mutex: BTreeSet::new(),
            next_state_mutex: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> &FactBase {
        &self.state
    }

    pub fn action(&self, id: ActId) -> &GroundAction {
        &self.actions[id]
    }

    pub fn actions(&self) -> impl Iterator<Item = (ActId, &GroundAction)> {
        self.actions.iter().enumerate()
    }

    /// Actions of this layer producing `lit` in the next layer.
    pub fn producers_of(&self, lit: &Literal) -> &[ActId] {
        self.producers.get(lit).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn actions_mutex(&self, a: ActId, b: ActId) -> bool {
        a != b && self.action_mutex.contains(&ordered(a, b))
    }

    /// Mutex between two of this level's propositions.
    pub fn props_mutex(&self, p: &Literal, q: &Literal) -> bool {
        p != q && self.state_mutex.contains(&ordered_lits(p, q))
    }

    /// Populates the layer: a frame action per true proposition, then every
    /// grounding of every schema whose preconditions hold here. Grounding
    /// enumerates permutations of `objects` over the schema's variable
    /// positions (constant parameters stay pinned), the standard
    /// `O(|objects|^arity)` cost of GraphPlan.
    pub fn build(&mut self, schemas: &[ActionSchema], objects: &[Term]) {
        let props: Vec<Literal> = self.state.clauses().cloned().collect();
        for lit in &props {
            self.register(GroundAction::frame(lit));
        }
        for schema in schemas {
            let free: Vec<usize> = (0..schema.arity()).filter(|&i| schema.params()[i].is_var()).collect();
            for perm in objects.iter().permutations(free.len()) {
                let mut args = schema.params().to_vec();
                for (&slot, obj) in free.iter().zip(perm) {
                    args[slot] = obj.clone();
                }
                let ground = schema.ground(&args);
                let applicable = ground.precond.iter().all(|p| self.state.contains(p))
                    && schema
                        .precond_absent()
                        .iter()
                        .all(|p| !self.state.contains(&schema.substitute(p, &args)));
                if applicable {
                    self.register(ground);
                }
            }
        }
    }

    fn register(&mut self, action: GroundAction) {
        let id = self.actions.len();
        for p in &action.precond {
            self.consumers.entry(p.clone()).or_default().push(id);
        }
        for e in &action.effect {
            self.producers.entry(e.clone()).or_default().push(id);
        }
        self.actions.push(action);
    }

    /// Computes the mutex relations of the layer. Three derivations, in
    /// order; the third inspects the producer links and the action mutexes
    /// found by the first two, so it must run last.
    pub fn find_mutex(&mut self) {
        self.inconsistent_effects();
        self.competing_needs();
        self.inconsistent_support();
        tracing::debug!(
            "level: {} actions, {} action mutexes, {} derived proposition mutexes",
            self.actions.len(),
            self.action_mutex.len(),
            self.next_state_mutex.len()
        );
    }

    /// Two actions are mutex if one asserts a literal the other denies.
    fn inconsistent_effects(&mut self) {
        let negatives: Vec<Literal> = self.producers.keys().filter(|l| !l.positive).cloned().collect();
        for neg in negatives {
            let Some(pos_ids) = self.producers.get(&neg.complement()) else {
                continue;
            };
            let pairs: Vec<(ActId, ActId)> = self.producers[&neg]
                .iter()
                .cartesian_product(pos_ids.iter())
                .map(|(&a, &b)| (a, b))
                .collect();
            for (a, b) in pairs {
                self.mark_mutex(a, b);
            }
        }
    }

    /// Two actions are mutex if one requires a literal the other requires the
    /// complement of.
    fn competing_needs(&mut self) {
        let negatives: Vec<Literal> = self.consumers.keys().filter(|l| !l.positive).cloned().collect();
        for neg in negatives {
            let Some(pos_ids) = self.consumers.get(&neg.complement()) else {
                continue;
            };
            let pairs: Vec<(ActId, ActId)> = self.consumers[&neg]
                .iter()
                .cartesian_product(pos_ids.iter())
                .map(|(&a, &b)| (a, b))
                .collect();
            for (a, b) in pairs {
                self.mark_mutex(a, b);
            }
        }
    }

    /// Two next-layer propositions are mutex if no single action achieves
    /// both and every pair of their achievers is action-mutex.
    fn inconsistent_support(&mut self) {
        let props: Vec<&Literal> = self.producers.keys().collect();
        let mut derived = BTreeSet::new();
        for (&p, &q) in props.iter().tuple_combinations() {
            let ap = &self.producers[p];
            let aq = &self.producers[q];
            let exclusive = ap
                .iter()
                .cartesian_product(aq.iter())
                .all(|(&a, &b)| a != b && self.action_mutex.contains(&ordered(a, b)));
            if exclusive {
                derived.insert(ordered_lits(p, q));
            }
        }
        self.next_state_mutex.extend(derived);
    }

    fn mark_mutex(&mut self, a: ActId, b: ActId) {
        if a != b {
            self.action_mutex.insert(ordered(a, b));
        }
    }

    /// Builds the following level: its state is the deduplicated set of
    /// produced propositions, its proposition mutexes are the ones derived
    /// here. Which action produced what is forgotten.
    pub fn next_level(&self) -> Level {
        let state = self.producers.keys().cloned().collect();
        Level::inherited(state, self.next_state_mutex.clone())
    }
}

fn ordered(a: ActId, b: ActId) -> (ActId, ActId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn ordered_lits(p: &Literal, q: &Literal) -> (Literal, Literal) {
    if p <= q {
        (p.clone(), q.clone())
    } else {
        (q.clone(), p.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::have_cake_and_eat_cake_too;
    use crate::strips::Problem;

    fn lit(s: &str) -> Literal {
        Literal::parse(s).unwrap()
    }

    fn built_level(problem: &Problem) -> Level {
        let mut level = Level::initial(problem.initial_state());
        let objects: Vec<Term> = problem.objects().into_iter().collect();
        level.build(&problem.actions, &objects);
        level.find_mutex();
        level
    }

    fn id_of(level: &Level, name: &str) -> ActId {
        level
            .actions()
            .find(|(_, a)| a.name == name)
            .map(|(id, _)| id)
            .unwrap()
    }

    #[test]
    fn frame_actions_carry_every_fact() {
        let problem = have_cake_and_eat_cake_too();
        let level = built_level(&problem);
        let next = level.next_level();
        for fact in level.state().clauses() {
            assert!(next.state().contains(fact), "{fact} was not carried over");
        }
    }

    #[test]
    fn eating_conflicts_with_keeping_the_cake() {
        let problem = have_cake_and_eat_cake_too();
        let level = built_level(&problem);
        let eat = id_of(&level, "Eat");
        let keep = id_of(&level, "PHave");
        // Eat asserts NotHave while the frame action re-asserts Have.
        assert!(level.actions_mutex(eat, keep));

        let next = level.next_level();
        assert!(next.props_mutex(&lit("Have(Cake)"), &lit("Eaten(Cake)")));
        assert!(next.props_mutex(&lit("Have(Cake)"), &lit("NotHave(Cake)")));
        assert!(!next.props_mutex(&lit("Eaten(Cake)"), &lit("NotHave(Cake)")));
    }

    #[test]
    fn mutexes_persist_across_levels() {
        let problem = have_cake_and_eat_cake_too();
        let level0 = built_level(&problem);
        let mutex0 = (id_of(&level0, "Eat"), id_of(&level0, "PHave"));
        assert!(level0.actions_mutex(mutex0.0, mutex0.1));

        let mut level1 = level0.next_level();
        let objects: Vec<Term> = problem.objects().into_iter().collect();
        level1.build(&problem.actions, &objects);
        level1.find_mutex();
        // The structurally equivalent pair is mutex again one level deeper.
        assert!(level1.actions_mutex(id_of(&level1, "Eat"), id_of(&level1, "PHave")));
    }

    #[test]
    fn pinned_constants_restrict_grounding() {
        let problem = crate::domains::spare_tire();
        let mut level = Level::initial(
            [lit("Tire(Spare)"), lit("At(Spare, Ground)"), lit("NotAt(Flat, Axle)")]
                .into_iter()
                .collect(),
        );
        let objects: Vec<Term> = problem.objects().into_iter().collect();
        level.build(&problem.actions, &objects);
        // PutOn(t, Axle) only ever grounds its second parameter to Axle.
        let put_ons: Vec<&GroundAction> = level.actions().map(|(_, a)| a).filter(|a| a.name == "PutOn").collect();
        assert!(!put_ons.is_empty());
        assert!(put_ons.iter().all(|a| a.args[1] == Term::cst("Axle")));
    }
}
