//! Predicates over a [`State`] that guard transitions.
//!
//! A [`Condition`] is a closed set of variants. [`Condition::Default`] is the
//! always-true fallback and is the only variant the builder treats as
//! unconditional when checking for redundant transitions.

mod expr;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;

use serde_json::Value;

use crate::error::ConditionError;
use crate::state::State;

pub use expr::Expression;

/// A guard evaluated against a state snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Condition {
    /// Always true.
    #[default]
    Default,
    /// A compiled boolean expression.
    Expr(Arc<Expression>),
    /// True when every key equals its expected value.
    When(BTreeMap<String, Value>),
    /// Negation of the inner condition.
    Not(Box<Condition>),
    /// True when every inner condition holds.
    All(Vec<Condition>),
    /// True when any inner condition holds.
    Any(Vec<Condition>),
}

impl Condition {
    /// The always-true condition.
    pub fn default_condition() -> Self {
        Condition::Default
    }

    /// Compile an expression condition such as `count < 10`.
    pub fn expr(source: &str) -> Result<Self, ConditionError> {
        Ok(Condition::Expr(Arc::new(Expression::compile(source)?)))
    }

    /// A condition on exact key/value matches.
    pub fn when<I, K, V>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Condition::When(
            bindings
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Whether this is the unconditional fallback.
    pub fn is_default(&self) -> bool {
        matches!(self, Condition::Default)
    }

    /// Evaluate against `state`.
    pub fn evaluate(&self, state: &State) -> Result<bool, ConditionError> {
        match self {
            Condition::Default => Ok(true),
            Condition::Expr(expr) => expr.evaluate(state),
            Condition::When(expected) => {
                for (key, value) in expected {
                    let actual = state
                        .get(key)
                        .ok_or_else(|| ConditionError::MissingKey { key: key.clone() })?;
                    if !expr::values_equal(actual, value) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Not(inner) => Ok(!inner.evaluate(state)?),
            Condition::All(conditions) => {
                for condition in conditions {
                    if !condition.evaluate(state)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any(conditions) => {
                for condition in conditions {
                    if condition.evaluate(state)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// State keys this condition inspects.
    pub fn reads(&self) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        self.collect_reads(&mut keys);
        keys
    }

    fn collect_reads(&self, keys: &mut BTreeSet<String>) {
        match self {
            Condition::Default => {}
            Condition::Expr(expr) => keys.extend(expr.keys().iter().cloned()),
            Condition::When(expected) => keys.extend(expected.keys().cloned()),
            Condition::Not(inner) => inner.collect_reads(keys),
            Condition::All(conditions) | Condition::Any(conditions) => {
                for condition in conditions {
                    condition.collect_reads(keys);
                }
            }
        }
    }

    /// Diagnostic name, used in logs, models and DOT labels.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Default => f.write_str("default"),
            Condition::Expr(expr) => f.write_str(expr.source()),
            Condition::When(expected) => {
                let parts: Vec<String> = expected.iter().map(|(k, v)| format!("{k}={v}")).collect();
                f.write_str(&parts.join(", "))
            }
            Condition::Not(inner) => match inner.as_ref() {
                Condition::All(_) | Condition::Any(_) => write!(f, "~({inner})"),
                _ => write!(f, "~{inner}"),
            },
            Condition::All(conditions) => write_joined(f, conditions, " & "),
            Condition::Any(conditions) => write_joined(f, conditions, " | "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, conditions: &[Condition], sep: &str) -> fmt::Result {
    for (i, condition) in conditions.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match condition {
            Condition::All(_) | Condition::Any(_) => write!(f, "({condition})")?,
            _ => write!(f, "{condition}")?,
        }
    }
    Ok(())
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        match self {
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }
}

impl BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        match self {
            Condition::All(mut conditions) => {
                conditions.push(rhs);
                Condition::All(conditions)
            }
            lhs => Condition::All(vec![lhs, rhs]),
        }
    }
}

impl BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        match self {
            Condition::Any(mut conditions) => {
                conditions.push(rhs);
                Condition::Any(conditions)
            }
            lhs => Condition::Any(vec![lhs, rhs]),
        }
    }
}
