//! Fact base: the store of ground literals describing a planning state.
//!
//! The store is deliberately dumb. It holds positive and negative literals as
//! distinct atoms and does not enforce that at most one of `P`/`NotP` is
//! present; action application (`strips::ActionSchema::apply`) retracts the
//! complement of every asserted effect to keep executions consistent.

use crate::logic::{unify, Bindings, Literal};
use std::collections::BTreeSet;

/// An ordered set of ground literals. Ordering makes every query and
/// iteration deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactBase {
    clauses: BTreeSet<Literal>,
}

impl FactBase {
    pub fn new() -> FactBase {
        FactBase::default()
    }

    pub fn tell(&mut self, fact: Literal) {
        debug_assert!(fact.is_ground(), "non-ground fact: {fact}");
        self.clauses.insert(fact);
    }

    /// Removes a literal. Removing an absent literal is a no-op.
    pub fn retract(&mut self, fact: &Literal) -> bool {
        self.clauses.remove(fact)
    }

    pub fn contains(&self, fact: &Literal) -> bool {
        self.clauses.contains(fact)
    }

    /// Unification-based query: returns the bindings of the first stored
    /// clause (in literal order) that unifies with `query`.
    pub fn ask(&self, query: &Literal) -> Option<Bindings> {
        let empty = Bindings::new();
        self.clauses.iter().find_map(|fact| unify(query, fact, &empty))
    }

    /// Satisfiability of a conjunction. Each conjunct is asked independently:
    /// bindings are not shared across conjuncts, matching the goal tests of
    /// the reference problems.
    pub fn ask_all(&self, conjunction: &[Literal]) -> bool {
        conjunction.iter().all(|q| self.ask(q).is_some())
    }

    pub fn clauses(&self) -> impl Iterator<Item = &Literal> {
        self.clauses.iter()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl FromIterator<Literal> for FactBase {
    fn from_iter<I: IntoIterator<Item = Literal>>(iter: I) -> FactBase {
        FactBase {
            clauses: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Term;

    fn lit(s: &str) -> Literal {
        Literal::parse(s).unwrap()
    }

    #[test]
    fn tell_retract_contains() {
        let mut kb = FactBase::new();
        kb.tell(lit("At(C1, SFO)"));
        assert!(kb.contains(&lit("At(C1, SFO)")));
        assert!(!kb.contains(&lit("NotAt(C1, SFO)")));
        assert!(kb.retract(&lit("At(C1, SFO)")));
        assert!(!kb.retract(&lit("At(C1, SFO)")));
        assert!(kb.is_empty());
    }

    #[test]
    fn ask_binds_variables() {
        let kb: FactBase = [lit("At(P1, SFO)"), lit("At(P2, JFK)")].into_iter().collect();
        let b = kb.ask(&lit("At(p, JFK)")).unwrap();
        assert_eq!(b.get("p"), Some(&Term::cst("P2")));
        assert!(kb.ask(&lit("At(p, LHR)")).is_none());
    }

    #[test]
    fn conjunction_is_asked_independently() {
        let kb: FactBase = [lit("At(P1, SFO)"), lit("At(P2, JFK)")].into_iter().collect();
        // `p` binds differently in each conjunct; the query still succeeds.
        assert!(kb.ask_all(&[lit("At(p, SFO)"), lit("At(p, JFK)")]));
    }

    #[test]
    fn negative_literals_are_distinct_atoms() {
        let mut kb = FactBase::new();
        kb.tell(lit("NotHave(Cake)"));
        assert!(kb.contains(&lit("NotHave(Cake)")));
        assert!(kb.ask(&lit("Have(Cake)")).is_none());
    }
}
