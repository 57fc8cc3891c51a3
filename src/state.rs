// ============================================================================
//                           GOAP ENGINE • STATE
//        Symbolic World State: Key/Value Facts, Merge, and Satisfaction
// ----------------------------------------------------------------------------
//   Architectural Role:
//       `State` is the mapping from symbolic key to `Value` shared by world
//       state, action preconditions, action effects, and goals. Keys may
//       encode hierarchical paths (e.g. "TASK.INFO.LOADED") but the engine
//       treats them as opaque strings throughout.
// ============================================================================

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A symbolic world state / precondition fragment / effect fragment / goal.
///
/// Backed by a `BTreeMap` so iteration order (and therefore candidate
/// registration order derived from it) is deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State(BTreeMap<String, Value>);

impl State {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style single-key construction, mirroring how goals and
    /// preconditions are most often written in tests and examples.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Exact membership test used throughout the planner: is `(key, value)`
    /// already true in this state? This is a strict comparison — a wildcard
    /// stored in `self` (which should never happen for world state, only for
    /// unbound effect templates) never satisfies a concrete request.
    pub fn satisfies_pair(&self, key: &str, value: &Value) -> bool {
        self.0.get(key).map(|v| v == value).unwrap_or(false)
    }

    /// `goal ⊆ self` — every key/value pair in `goal` is present and equal
    /// in `self`. This is `Agent::is_goal_met` (spec §4.4).
    pub fn satisfies(&self, goal: &State) -> bool {
        goal.0.iter().all(|(k, v)| self.satisfies_pair(k, v))
    }

    /// Merges `other` into `self`, overwriting any overlapping keys. Used by
    /// `Agent::update_state` and by effect application.
    pub fn merge(&mut self, other: &State) {
        for (k, v) in other.0.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for (k, v) in self.0.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
            first = false;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfies_requires_every_goal_key_present_and_equal() {
        let state = State::new().with("a", true).with("b", 1i64);
        let goal = State::new().with("a", true);
        assert!(state.satisfies(&goal));

        let unmet = State::new().with("a", false);
        assert!(!state.satisfies(&unmet));

        let missing = State::new().with("c", true);
        assert!(!state.satisfies(&missing));
    }

    #[test]
    fn empty_goal_is_always_satisfied() {
        let state = State::new();
        assert!(state.satisfies(&State::new()));
    }

    #[test]
    fn merge_overwrites_overlapping_keys() {
        let mut state = State::new().with("a", 1i64).with("b", 2i64);
        state.merge(&State::new().with("a", 99i64).with("c", 3i64));
        assert_eq!(state.get("a"), Some(&Value::Int(99)));
        assert_eq!(state.get("b"), Some(&Value::Int(2)));
        assert_eq!(state.get("c"), Some(&Value::Int(3)));
    }
}
