//! Terms and literals of the ground first-order fragment used by the planners.
//!
//! A literal is a named predicate applied to a list of terms. Polarity is
//! structural: the text form `NotAt(C1, SFO)` denotes the *negative* literal
//! of the `At` predicate, a distinct atom from `At(C1, SFO)`. Both polarities
//! may be asserted in a fact base; keeping the pair consistent is the job of
//! whoever applies effects (see `strips`).

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// A term is either a variable (identifier starting with a lowercase letter)
/// or a constant (anything else). The convention follows the problem texts:
/// `Remove(obj, loc)` has two variables, `PutOn(t, Axle)` pins its second
/// parameter to the constant `Axle`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Var(String),
    Const(String),
}

impl Term {
    pub fn parse(token: &str) -> Result<Term> {
        let token = token.trim();
        if token.is_empty() || !token.chars().all(|c| c.is_alphanumeric() || c == '_') {
            bail!("invalid term: '{token}'");
        }
        if token.chars().next().unwrap().is_lowercase() {
            Ok(Term::Var(token.to_string()))
        } else {
            Ok(Term::Const(token.to_string()))
        }
    }

    /// Builds a constant without going through the parsing convention.
    pub fn cst(name: &str) -> Term {
        Term::Const(name.to_string())
    }

    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Term::Var(s) | Term::Const(s) => s,
        }
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A (possibly lifted) literal: predicate, arguments and polarity.
///
/// `Ord` is derived so that every collection of literals in the planners can
/// iterate in a stable order, which keeps plans reproducible.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    pub pred: String,
    pub args: Vec<Term>,
    pub positive: bool,
}

impl Literal {
    pub fn new(positive: bool, pred: impl Into<String>, args: Vec<Term>) -> Literal {
        Literal {
            pred: pred.into(),
            args,
            positive,
        }
    }

    /// Parses `Name(arg, ...)` or a bare `Name`. A `Not` prefix followed by an
    /// uppercase letter marks the negative literal of the remaining predicate.
    pub fn parse(text: &str) -> Result<Literal> {
        let text = text.trim();
        let (head, args) = match text.find('(') {
            Some(open) => {
                let close = text
                    .rfind(')')
                    .with_context(|| format!("unbalanced parentheses in '{text}'"))?;
                let inner = &text[open + 1..close];
                let args = inner
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(Term::parse)
                    .collect::<Result<Vec<_>>>()?;
                (&text[..open], args)
            }
            None => (text, Vec::new()),
        };
        let head = head.trim();
        if head.is_empty() || !head.chars().all(|c| c.is_alphanumeric() || c == '_') {
            bail!("invalid predicate name in '{text}'");
        }
        let (positive, pred) = match head.strip_prefix("Not") {
            Some(rest) if rest.chars().next().is_some_and(|c| c.is_uppercase()) => (false, rest),
            _ => (true, head),
        };
        Ok(Literal::new(positive, pred, args))
    }

    /// The same atom with the opposite polarity.
    pub fn complement(&self) -> Literal {
        Literal {
            pred: self.pred.clone(),
            args: self.args.clone(),
            positive: !self.positive,
        }
    }

    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|t| !t.is_var())
    }

    /// Predicate name with the polarity prefix, e.g. `At` or `NotAt`.
    pub fn pred_text(&self) -> String {
        if self.positive {
            self.pred.clone()
        } else {
            format!("Not{}", self.pred)
        }
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.pred_text())?;
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

/// Substitution from variable names to terms, produced by unification.
pub type Bindings = BTreeMap<String, Term>;

/// Unifies a query literal (which may contain variables) against a ground
/// fact, extending `bindings`. Returns the extended bindings on success.
pub fn unify(query: &Literal, fact: &Literal, bindings: &Bindings) -> Option<Bindings> {
    if query.positive != fact.positive || query.pred != fact.pred || query.args.len() != fact.args.len() {
        return None;
    }
    let mut out = bindings.clone();
    for (q, f) in query.args.iter().zip(fact.args.iter()) {
        match q {
            Term::Const(_) => {
                if q != f {
                    return None;
                }
            }
            Term::Var(name) => match out.get(name) {
                Some(bound) => {
                    if bound != f {
                        return None;
                    }
                }
                None => {
                    out.insert(name.clone(), f.clone());
                }
            },
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let l = Literal::parse("At(C1, SFO)").unwrap();
        assert!(l.positive);
        assert_eq!(l.pred, "At");
        assert_eq!(l.args, vec![Term::cst("C1"), Term::cst("SFO")]);
        assert_eq!(l.to_string(), "At(C1, SFO)");

        let n = Literal::parse("NotAt(p, SFO)").unwrap();
        assert!(!n.positive);
        assert_eq!(n.pred, "At");
        assert!(n.args[0].is_var());
        assert_eq!(n.to_string(), "NotAt(p, SFO)");

        let bare = Literal::parse("LeaveOvernight").unwrap();
        assert!(bare.args.is_empty());
        assert_eq!(bare.to_string(), "LeaveOvernight");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Literal::parse("At(C1").is_err());
        assert!(Literal::parse("").is_err());
        assert!(Literal::parse("At C1)").is_err());
    }

    #[test]
    fn complement_flips_polarity_only() {
        let l = Literal::parse("Have(Cake)").unwrap();
        let c = l.complement();
        assert_eq!(c.to_string(), "NotHave(Cake)");
        assert_eq!(c.complement(), l);
    }

    #[test]
    fn unification() {
        let query = Literal::parse("At(p, SFO)").unwrap();
        let fact = Literal::parse("At(P1, SFO)").unwrap();
        let b = unify(&query, &fact, &Bindings::new()).unwrap();
        assert_eq!(b.get("p"), Some(&Term::cst("P1")));

        let other = Literal::parse("At(P1, JFK)").unwrap();
        assert!(unify(&query, &other, &Bindings::new()).is_none());

        // an existing binding must be respected
        let mut pre = Bindings::new();
        pre.insert("p".to_string(), Term::cst("P2"));
        assert!(unify(&query, &fact, &pre).is_none());
    }

    #[test]
    fn polarity_blocks_unification() {
        let query = Literal::parse("NotAt(p, SFO)").unwrap();
        let fact = Literal::parse("At(P1, SFO)").unwrap();
        assert!(unify(&query, &fact, &Bindings::new()).is_none());
    }
}
