// ============================================================================
//                          GOAP ENGINE • VALUE TYPE
//        Dynamically Typed State Values, Including the Wildcard Sentinel
// ----------------------------------------------------------------------------
//   Architectural Role:
//       Models the tagged variant used throughout `State`, `Action`
//       preconditions, and `Action` effects: booleans, integers, floats,
//       strings (which may also be symbolic references), and the `Any`
//       wildcard sentinel used by effects that bind to whatever a goal asks
//       for at plan time.
// ============================================================================

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// A dynamically typed state value.
///
/// Equality is exact: `Any` only equals `Any`. Code that needs the "wildcard
/// matches any concrete value of the same key" rule from action equality
/// (spec. §3) must call [`Value::matches_elastic`] explicitly rather than
/// relying on `PartialEq` — ordinary state comparisons must never treat a
/// wildcard as matching a concrete value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// The wildcard sentinel: "whatever value the goal requests."
    Any,
}

impl Value {
    /// Elastic comparison used only by action-equality checks: the wildcard
    /// matches any concrete value of the same key. Two `Any` values match
    /// each other. A wildcard never matches another wildcard's absence, i.e.
    /// this is still a two-argument symmetric relation, not a one-sided one.
    pub fn matches_elastic(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Any, _) | (_, Value::Any) => true,
            _ => self == other,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Value::Any)
    }

    /// Returns the string slice if this is a `Str` value, for reference
    /// resolution. Non-string values are never references.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Any, Value::Any) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Any => {}
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Any => write!(f, "<any>"),
        }
    }
}
