// ============================================================================
//                          GOAP ENGINE • ACTION
//        Templates, Callback Contract, and Per-Copy Runtime State
// ----------------------------------------------------------------------------
//   Architectural Role:
//       `Action` is the immutable-by-convention template carrying
//       preconditions, effects, cost, timeout, and the async/auto-reset
//       flags, plus a pluggable `ActionBehavior` callback object for user
//       logic. Planning clones a template into a per-plan copy and may bind
//       a wildcard effect to a concrete value on that copy; the template
//       itself is never mutated. Per-copy mutable runtime state (the effect
//       backup needed by `reset_effects`) lives on the copy, never shared
//       back to the template it was cloned from.
//
//   Core Functions:
//       • Builder-style construction of action templates
//       • The `ActionBehavior` trait: the full user-overridable callback set
//       • Elastic action equality (wildcard effects match any concrete value)
//       • The impossible-action marker used when no producer exists
// ============================================================================

use crate::state::State;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default action timeout: "wall-clock bound for execution... default ~24h".
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// The infinite-cost sentinel marking an infeasible action.
pub const INFINITE_COST: f64 = f64::INFINITY;

/// Outcome of running an action's `execute()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Running,
    Success,
    Failure,
    Neutral,
    Aborted,
}

/// A cheaply cloneable handle user code uses to report the outcome of
/// `execute()` from inside the spawned task. Read by the executor's poll
/// loop from a different task, hence the `Mutex`.
#[derive(Clone)]
pub struct StatusHandle(Arc<Mutex<ActionStatus>>);

impl StatusHandle {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ActionStatus::Running)))
    }

    pub fn set(&self, status: ActionStatus) {
        *self.0.lock().unwrap() = status;
    }

    pub fn get(&self) -> ActionStatus {
        *self.0.lock().unwrap()
    }
}

impl Default for StatusHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// The full set of user-overridable callbacks an action may define. Every
/// method has a default so an action that only declares preconditions,
/// effects, cost, and timeout (no custom behavior) is fully usable.
#[async_trait]
pub trait ActionBehavior: Send + Sync {
    /// Last-moment gate before execution; `false` aborts the action as a
    /// failure without ever calling `execute`.
    fn check_runtime_precondition(&self) -> bool {
        true
    }

    /// Performs the work. Must report its outcome via `status`. The default
    /// behavior is a declarative no-op that succeeds immediately — most
    /// planning-only actions (the kind used in the seed scenarios) never
    /// need more than that.
    async fn execute(&self, status: StatusHandle) {
        status.set(ActionStatus::Success);
    }

    /// Writes `effects` into `state`. Returns the prior values of every
    /// touched key, as a `State`, so the engine can store it on the
    /// instance and later call `reset_effects`. The default implementation
    /// copies each effect key/value verbatim.
    fn apply_effects(&self, effects: &State, state: &mut State) -> State {
        let mut backup = State::new();
        for (k, v) in effects.iter() {
            if let Some(prev) = state.get(k) {
                backup.insert(k.clone(), prev.clone());
            }
            state.insert(k.clone(), v.clone());
        }
        backup
    }

    /// Restores the prior values captured by the last `apply_effects`.
    fn reset_effects(&self, effects: &State, state: &mut State, backup: &State) {
        for (k, _) in effects.iter() {
            match backup.get(k) {
                Some(v) => {
                    state.insert(k.clone(), v.clone());
                }
                None => {
                    state.remove(k);
                }
            }
        }
    }

    /// User-defined inverse action, invoked during LIFO rollback.
    async fn undo(&self) {}

    fn on_success(&self) {}
    fn on_failure(&self) {}
    fn on_neutral(&self) {}
    fn on_exit(&self) {}
    fn on_aborted(&self) {}
}

/// The default behavior used by actions that declare no custom callbacks.
pub struct NoopBehavior;

#[async_trait]
impl ActionBehavior for NoopBehavior {}

/// An action template (and, after cloning for a plan, a bound action copy).
pub struct Action {
    pub name: String,
    pub preconditions: State,
    pub effects: State,
    pub cost: f64,
    pub timeout: Duration,
    pub async_exec: bool,
    pub auto_reset: bool,
    behavior: Arc<dyn ActionBehavior>,
    /// Backup captured by the last `apply_effects` call on *this* copy.
    /// Never shared with the template this copy was cloned from.
    effect_backup: Mutex<Option<State>>,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preconditions: State::new(),
            effects: State::new(),
            cost: 1.0,
            timeout: DEFAULT_TIMEOUT,
            async_exec: false,
            auto_reset: false,
            behavior: Arc::new(NoopBehavior),
            effect_backup: Mutex::new(None),
        }
    }

    /// The impossible-action marker inserted when no feasible producer
    /// exists for a subgoal (spec §3, §4.3 step 5).
    pub fn impossible(key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        Action::new(format!("<impossible:{key}>"))
            .with_cost(INFINITE_COST)
            .with_effect(key, value)
    }

    pub fn is_impossible(&self) -> bool {
        self.cost.is_infinite()
    }

    pub fn with_precondition(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.preconditions.insert(key, value);
        self
    }

    pub fn with_effect(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.effects.insert(key, value);
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_async_exec(mut self, async_exec: bool) -> Self {
        self.async_exec = async_exec;
        self
    }

    pub fn with_auto_reset(mut self, auto_reset: bool) -> Self {
        self.auto_reset = auto_reset;
        self
    }

    pub fn with_behavior(mut self, behavior: Arc<dyn ActionBehavior>) -> Self {
        self.behavior = behavior;
        self
    }

    /// Elastic action equality (spec §3): same name, same cost, exactly
    /// equal preconditions, and effects equal under the wildcard-matches-
    /// anything rule. Used for plan deduplication (identical bound copies
    /// collapse to one) and for `load_actions` idempotence (identical
    /// template registrations collapse in the lookup index).
    pub fn matches_elastic(&self, other: &Action) -> bool {
        self.name == other.name
            && self.cost == other.cost
            && self.preconditions == other.preconditions
            && effects_match_elastic(&self.effects, &other.effects)
    }

    pub fn check_runtime_precondition(&self) -> bool {
        self.behavior.check_runtime_precondition()
    }

    pub async fn execute(&self, status: StatusHandle) {
        self.behavior.execute(status).await
    }

    pub fn apply_effects(&self, state: &mut State) {
        let backup = self.behavior.apply_effects(&self.effects, state);
        *self.effect_backup.lock().unwrap() = Some(backup);
    }

    pub fn reset_effects(&self, state: &mut State) {
        let backup = self.effect_backup.lock().unwrap().clone();
        if let Some(backup) = backup {
            self.behavior.reset_effects(&self.effects, state, &backup);
        }
    }

    /// Returns the backup captured by the last `apply_effects` call on this
    /// instance, if any. Used by the agent's completed-action stack, which
    /// keeps its own copy of the backup alongside a `Clone` of the action
    /// (a clone's own `effect_backup` always starts empty, so the backup
    /// has to travel separately).
    pub fn effect_backup(&self) -> Option<State> {
        self.effect_backup.lock().unwrap().clone()
    }

    /// Reverts `effects` in `state` using an explicitly supplied backup,
    /// bypassing this instance's own stored backup. See [`Action::effect_backup`].
    pub fn restore_effects(&self, state: &mut State, backup: &State) {
        self.behavior.reset_effects(&self.effects, state, backup);
    }

    pub async fn undo(&self) {
        self.behavior.undo().await
    }

    pub fn on_success(&self) {
        self.behavior.on_success()
    }

    pub fn on_failure(&self) {
        self.behavior.on_failure()
    }

    pub fn on_neutral(&self) {
        self.behavior.on_neutral()
    }

    pub fn on_exit(&self) {
        self.behavior.on_exit()
    }

    pub fn on_aborted(&self) {
        self.behavior.on_aborted()
    }
}

/// Effects compare under the wildcard-matches-anything rule: same key set,
/// and each value pair matches elastically.
fn effects_match_elastic(a: &State, b: &State) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(k, v)| match b.get(k) {
        Some(bv) => v.matches_elastic(bv),
        None => false,
    })
}

impl Clone for Action {
    /// Clones the template fields and the shared (stateless) behavior
    /// object, but always starts the copy with fresh runtime state — per
    /// spec §9, per-instance mutable state belongs on the copy, never
    /// shared back to the template.
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            preconditions: self.preconditions.clone(),
            effects: self.effects.clone(),
            cost: self.cost,
            timeout: self.timeout,
            async_exec: self.async_exec,
            auto_reset: self.auto_reset,
            behavior: Arc::clone(&self.behavior),
            effect_backup: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("preconditions", &self.preconditions)
            .field("effects", &self.effects)
            .field("cost", &self.cost)
            .field("timeout", &self.timeout)
            .field("async_exec", &self.async_exec)
            .field("auto_reset", &self.auto_reset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elastic_equality_treats_wildcard_as_matching_any_concrete_value() {
        let template = Action::new("Move")
            .with_effect("robot_location", Value::Any)
            .with_cost(1.0);
        let bound = Action::new("Move")
            .with_effect("robot_location", "P1")
            .with_cost(1.0);
        assert!(template.matches_elastic(&bound));
    }

    #[test]
    fn different_cost_breaks_equality() {
        let a = Action::new("A").with_cost(1.0);
        let b = Action::new("A").with_cost(2.0);
        assert!(!a.matches_elastic(&b));
    }

    #[test]
    fn clone_starts_with_fresh_runtime_state() {
        let action = Action::new("A").with_effect("k", true);
        let mut state = State::new().with("k", false);
        action.apply_effects(&mut state);
        assert_eq!(state.get("k"), Some(&Value::Bool(true)));

        let copy = action.clone();
        // The copy has no backup of its own yet; resetting it must not
        // touch state derived from the original's apply_effects call.
        copy.reset_effects(&mut state);
        assert_eq!(state.get("k"), Some(&Value::Bool(true)));

        action.reset_effects(&mut state);
        assert_eq!(state.get("k"), Some(&Value::Bool(false)));
    }

    #[test]
    fn apply_then_reset_round_trips() {
        let action = Action::new("A").with_effect("x", 5i64).with_effect("y", true);
        let mut state = State::new().with("x", 1i64);
        let before = state.clone();
        action.apply_effects(&mut state);
        assert_eq!(state.get("x"), Some(&Value::Int(5)));
        assert_eq!(state.get("y"), Some(&Value::Bool(true)));
        action.reset_effects(&mut state);
        assert_eq!(state, before);
    }

    #[test]
    fn impossible_action_has_infinite_cost() {
        let marker = Action::impossible("driving", Value::Bool(true));
        assert!(marker.is_impossible());
        assert_eq!(marker.cost, INFINITE_COST);
    }
}
