// ============================================================================
//                       GOAP ENGINE • ACTION LOOKUP INDEX
//        Maps (effect_key, effect_value | wildcard) -> Candidate Actions
// ----------------------------------------------------------------------------
//   Architectural Role:
//       Built once per `load_actions` call by iterating the action registry;
//       for each action and each (k, v) in its effects, the action is
//       appended to `index[(k, v)]` (wildcard effects register under
//       `(k, Any)`). Read-only during planning. Rebuilt wholesale on any
//       action-set mutation rather than incrementally patched, which is
//       what makes `load_actions(A); load_actions(A)` trivially idempotent.
// ============================================================================

use crate::action::Action;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct ActionIndex {
    buckets: HashMap<(String, Value), Vec<Arc<Action>>>,
}

impl ActionIndex {
    /// Builds a fresh index from the given action templates. Candidate
    /// order within a bucket is registration order, which is what makes
    /// planner tie-breaking deterministic (spec §4.3).
    pub fn build(actions: &[Arc<Action>]) -> Self {
        let mut buckets: HashMap<(String, Value), Vec<Arc<Action>>> = HashMap::new();
        for action in actions {
            for (key, value) in action.effects.iter() {
                buckets
                    .entry((key.clone(), value.clone()))
                    .or_default()
                    .push(Arc::clone(action));
            }
        }
        Self { buckets }
    }

    /// Candidates whose effects produce exactly `(key, value)`.
    pub fn candidates(&self, key: &str, value: &Value) -> &[Arc<Action>] {
        self.buckets
            .get(&(key.to_string(), value.clone()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Candidates registered as wildcard producers for `key`.
    pub fn wildcard_candidates(&self, key: &str) -> &[Arc<Action>] {
        self.candidates(key, &Value::Any)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(name: &str, key: &str, value: impl Into<Value>) -> Arc<Action> {
        Arc::new(Action::new(name).with_effect(key, value))
    }

    #[test]
    fn candidates_are_registration_ordered() {
        let actions = vec![
            action("First", "k", true),
            action("Second", "k", true),
        ];
        let index = ActionIndex::build(&actions);
        let names: Vec<_> = index.candidates("k", &Value::Bool(true))
            .iter()
            .map(|a| a.name.clone())
            .collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[test]
    fn wildcard_effects_register_separately_from_concrete_values() {
        let actions = vec![Arc::new(
            Action::new("Move").with_effect("robot_location", Value::Any),
        )];
        let index = ActionIndex::build(&actions);
        assert!(index.candidates("robot_location", &Value::Str("P1".into())).is_empty());
        assert_eq!(index.wildcard_candidates("robot_location").len(), 1);
    }

    #[test]
    fn rebuild_from_same_actions_is_idempotent() {
        let actions = vec![action("A", "k", true)];
        let first = ActionIndex::build(&actions);
        let second = ActionIndex::build(&actions);
        assert_eq!(
            first.candidates("k", &Value::Bool(true)).len(),
            second.candidates("k", &Value::Bool(true)).len()
        );
    }
}
