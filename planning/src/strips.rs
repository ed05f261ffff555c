//! STRIPS operators: parameterized action schemas, their groundings, and
//! sequential execution of ground actions against a fact base.

use crate::kb::FactBase;
use crate::logic::{Literal, Term};
use anyhow::{ensure, Context, Result};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Expected failures of sequential plan execution. Planning dead-ends get
/// their own types (`graphplan` returns `None`, `pop` has `PopError`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("action '{0}' not found")]
    UnknownAction(String),
    #[error("preconditions of '{0}' are not satisfied")]
    PreconditionFailed(String),
}

/// A parameterized operator: name, formal parameters, precondition and effect
/// conjunctions. Parameters may be pinned constants (`PutOn(t, Axle)`).
///
/// Preconditions are membership tests on the fact base, for both polarities:
/// a negative precondition `NotP(...)` requires the negative literal to be
/// *asserted*, not the positive one to be absent. `precond_absent` carries the
/// closed-world flavour used by the resource-constrained actions: literals
/// that must not be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSchema {
    name: String,
    params: Vec<Term>,
    precond: Vec<Literal>,
    precond_absent: Vec<Literal>,
    effect: Vec<Literal>,
}

impl ActionSchema {
    /// Builds a schema from its textual signature and precondition/effect
    /// literals, e.g. `ActionSchema::new("Remove(obj, loc)", &["At(obj, loc)"],
    /// &["At(obj, Ground)", "NotAt(obj, loc)"])`.
    pub fn new(signature: &str, precond: &[&str], effect: &[&str]) -> Result<ActionSchema> {
        let head = Literal::parse(signature).with_context(|| format!("invalid action signature '{signature}'"))?;
        ensure!(head.positive, "negated action signature '{signature}'");
        let parse_all = |texts: &[&str]| -> Result<Vec<Literal>> { texts.iter().map(|t| Literal::parse(t)).collect() };
        Ok(ActionSchema {
            name: head.pred,
            params: head.args,
            precond: parse_all(precond)?,
            precond_absent: Vec::new(),
            effect: parse_all(effect)?,
        })
    }

    /// Adds closed-world preconditions: literals that must be absent from the
    /// fact base for the action to be applicable.
    pub fn with_absent(mut self, absent: &[&str]) -> Result<ActionSchema> {
        self.precond_absent = absent.iter().map(|t| Literal::parse(t)).collect::<Result<Vec<_>>>()?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Term] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn precond(&self) -> &[Literal] {
        &self.precond
    }

    pub fn precond_absent(&self) -> &[Literal] {
        &self.precond_absent
    }

    pub fn effect(&self) -> &[Literal] {
        &self.effect
    }

    /// Replaces every occurrence of a formal parameter in `lit` with the
    /// aligned term of `args`. Non-parameter symbols are left untouched.
    /// Never mutates its input.
    pub fn substitute(&self, lit: &Literal, args: &[Term]) -> Literal {
        debug_assert_eq!(args.len(), self.params.len());
        let new_args = lit
            .args
            .iter()
            .map(|t| match self.params.iter().position(|p| p == t) {
                Some(i) => args[i].clone(),
                None => t.clone(),
            })
            .collect();
        Literal::new(lit.positive, lit.pred.clone(), new_args)
    }

    /// True iff every substituted precondition literal is present and every
    /// closed-world precondition is absent.
    pub fn check_precond(&self, kb: &FactBase, args: &[Term]) -> bool {
        self.precond.iter().all(|p| kb.contains(&self.substitute(p, args)))
            && self.precond_absent.iter().all(|p| !kb.contains(&self.substitute(p, args)))
    }

    /// Applies the action: asserts every substituted effect and retracts its
    /// complement so that at most one of `P`/`NotP` survives per atom.
    pub fn apply(&self, kb: &mut FactBase, args: &[Term]) -> Result<(), ExecError> {
        if !self.check_precond(kb, args) {
            return Err(ExecError::PreconditionFailed(self.ground(args).to_string()));
        }
        for eff in &self.effect {
            let eff = self.substitute(eff, args);
            kb.retract(&eff.complement());
            kb.tell(eff);
        }
        Ok(())
    }

    /// Grounds the schema with concrete arguments. The result is
    /// value-compared, never identity-tracked.
    pub fn ground(&self, args: &[Term]) -> GroundAction {
        GroundAction {
            name: self.name.clone(),
            args: args.to_vec(),
            precond: self.precond.iter().map(|p| self.substitute(p, args)).collect(),
            effect: self.effect.iter().map(|e| self.substitute(e, args)).collect(),
            persistence: false,
        }
    }
}

/// A fully instantiated action. Persistence (frame) actions of the planning
/// graph are flagged structurally; they display with the `P`-prefixed name of
/// the literal they carry, e.g. `PAt(Spare, Trunk)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroundAction {
    pub name: String,
    pub args: Vec<Term>,
    pub precond: Vec<Literal>,
    pub effect: Vec<Literal>,
    pub persistence: bool,
}

impl GroundAction {
    /// The no-op action carrying `lit` unchanged from one graph layer to the
    /// next.
    pub fn frame(lit: &Literal) -> GroundAction {
        GroundAction {
            name: format!("P{}", lit.pred_text()),
            args: lit.args.clone(),
            precond: vec![lit.clone()],
            effect: vec![lit.clone()],
            persistence: true,
        }
    }
}

impl Display for GroundAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "(")?;
            for (i, a) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{a}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

/// A planning problem: initial facts, goal conjunction and action schemas.
#[derive(Debug, Clone)]
pub struct Problem {
    pub init: Vec<Literal>,
    pub goals: Vec<Literal>,
    pub actions: Vec<ActionSchema>,
}

impl Problem {
    pub fn new(init: Vec<Literal>, goals: Vec<Literal>, actions: Vec<ActionSchema>) -> Result<Problem> {
        for fact in &init {
            ensure!(fact.is_ground(), "non-ground initial fact: {fact}");
        }
        for (i, a) in actions.iter().enumerate() {
            ensure!(
                actions[..i].iter().all(|b| b.name() != a.name()),
                "duplicate action schema '{}'",
                a.name()
            );
        }
        Ok(Problem { init, goals, actions })
    }

    pub fn initial_state(&self) -> FactBase {
        self.init.iter().cloned().collect()
    }

    /// The object constants appearing in the initial facts; the universe used
    /// to ground action schemas.
    pub fn objects(&self) -> BTreeSet<Term> {
        self.init
            .iter()
            .flat_map(|l| l.args.iter())
            .filter(|t| !t.is_var())
            .cloned()
            .collect()
    }

    /// Goal satisfaction by unification ask, so goals may contain variables.
    pub fn goal_holds(&self, kb: &FactBase) -> bool {
        kb.ask_all(&self.goals)
    }

    pub fn schema(&self, name: &str) -> Option<&ActionSchema> {
        self.actions.iter().find(|a| a.name() == name)
    }

    /// Sequential execution of one ground action by name.
    pub fn act(&self, kb: &mut FactBase, name: &str, args: &[Term]) -> Result<(), ExecError> {
        let schema = self
            .schema(name)
            .ok_or_else(|| ExecError::UnknownAction(name.to_string()))?;
        schema.apply(kb, args)
    }
}
