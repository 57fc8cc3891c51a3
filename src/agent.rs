// ============================================================================
//                        GOAP ENGINE • AGENT EXECUTOR
//        Plan-Execute-Replan Drive Loop, Action State Machine, Rollback
// ----------------------------------------------------------------------------
//   Architectural Role:
//       `Agent` owns the action registry, the lookup index, the live world
//       state, and the blacklist. It drives a goal to completion by
//       alternating planning (via `planner::generate_plan`) with stepwise
//       execution, replanning around any action that fails by temporarily
//       blacklisting it, and undoing completed work only when a goal proves
//       genuinely unreachable or is explicitly aborted.
//
//   Core Functions:
//       • `load_actions` / `update_state` — registry and world-state mutation
//       • `get_plan` — planning that never propagates errors to the caller
//       • `execute_plan` / `plan_and_execute` / `achieve_goal` — drive loops
//       • `execute_action` — the single-action runtime state machine
//       • `abort` / `undo_completed_actions` — cooperative cancellation & LIFO rollback
// ============================================================================

use crate::action::{Action, ActionStatus, StatusHandle};
use crate::error::{GoapError, Result};
use crate::index::ActionIndex;
use crate::planner::{generate_plan, Plan, PlannerConfig};
use crate::state::State;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Tunables for the agent's drive loop; see `SPEC_FULL.md` §A.3.
#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    /// How often `execute_action`'s poll loop checks an in-flight action's
    /// status and the abort flag.
    pub poll_interval: Duration,
    /// Forwarded to the planner as its recursion bound.
    pub recursion_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            recursion_limit: 64,
        }
    }
}

/// A completed action kept on the rollback stack, paired with the backup it
/// needs to reverse its own effects (a `Clone` of an `Action` never carries
/// its source's runtime backup, so the two travel together explicitly).
struct Completed {
    action: Action,
    backup: State,
}

/// An async action whose effects were applied optimistically and whose
/// `execute()` task is still running in the background.
struct PendingAsync {
    action: Action,
    status: StatusHandle,
    handle: tokio::task::JoinHandle<()>,
}

/// Drives one or more goals to completion against a registry of actions.
pub struct Agent {
    actions: Vec<Arc<Action>>,
    index: ActionIndex,
    state: State,
    blacklist: HashSet<String>,
    config: AgentConfig,
    abort_flag: Arc<AtomicBool>,
    completed: Vec<Completed>,
    pending: Vec<PendingAsync>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            actions: Vec::new(),
            index: ActionIndex::default(),
            state: State::new(),
            blacklist: HashSet::new(),
            config,
            abort_flag: Arc::new(AtomicBool::new(false)),
            completed: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn blacklist(&self) -> &HashSet<String> {
        &self.blacklist
    }

    /// Replaces the action registry and rebuilds the lookup index from
    /// scratch. Calling this twice with the same actions is a no-op on the
    /// resulting index (see `ActionIndex::build`).
    pub fn load_actions(&mut self, actions: Vec<Action>) {
        let actions: Vec<Arc<Action>> = actions.into_iter().map(Arc::new).collect();
        self.index = ActionIndex::build(&actions);
        debug!("loaded {} action template(s)", actions.len());
        self.actions = actions;
    }

    /// Merges `delta` into the world state, overwriting overlapping keys.
    pub fn update_state(&mut self, delta: &State) {
        self.state.merge(delta);
    }

    pub fn is_goal_met(&self, goal: &State) -> bool {
        self.state.satisfies(goal)
    }

    /// Plans toward `goal` from the current world state. Never propagates a
    /// planning error: on failure it logs the reason and returns an empty
    /// plan, since an empty plan and "could not plan" are indistinguishable
    /// to every caller that only cares whether there's something to run.
    pub fn get_plan(&self, goal: &State) -> Plan {
        let planner_config = PlannerConfig { recursion_limit: self.config.recursion_limit };
        match generate_plan(goal, &self.state, &self.blacklist, &self.index, &planner_config) {
            Ok(plan) => plan,
            Err(err) => {
                warn!("planning toward goal {goal} failed: {err}");
                Plan::default()
            }
        }
    }

    /// Signals every in-flight and future `execute_action` call to stop at
    /// its next poll tick.
    pub fn abort(&self) {
        self.abort_flag.store(true, Ordering::SeqCst);
    }

    /// Clears the abort flag so the agent can be driven again.
    pub fn reset(&mut self) {
        self.abort_flag.store(false, Ordering::SeqCst);
    }

    /// Runs a single plan to completion, stopping at the first action that
    /// fails, times out, or observes an abort. Does *not* undo the actions
    /// that already succeeded in this plan — those effects are real
    /// progress; only the caller's drive loop decides whether a failure is
    /// recoverable by blacklist-and-replan or terminal.
    pub async fn execute_plan(&mut self, plan: &Plan) -> Result<()> {
        for action in &plan.actions {
            if self.abort_flag.load(Ordering::SeqCst) {
                return Err(GoapError::ActionAborted { action: action.name.clone() });
            }
            self.execute_action(action).await?;
        }
        Ok(())
    }

    /// Drives `goal` to completion one step at a time: generate a plan,
    /// execute only its first action, then replan from the resulting state.
    /// Re-planning after every single step (rather than running a whole plan
    /// blind) is what lets the loop notice state drift and recover from a
    /// failed action by blacklisting it and choosing a different route.
    /// Sends each attempted plan on `progress`, if given, before executing
    /// its first step.
    pub async fn plan_and_execute(&mut self, goal: &State, progress: Option<UnboundedSender<Plan>>) -> Result<()> {
        loop {
            if self.abort_flag.load(Ordering::SeqCst) {
                self.undo_completed_actions().await;
                return Err(GoapError::ActionAborted { action: "<agent>".to_string() });
            }
            if self.is_goal_met(goal) {
                self.finish();
                return Ok(());
            }

            let plan = self.get_plan(goal);
            if plan.is_empty() {
                warn!("no feasible plan toward goal {goal}; unwinding completed actions");
                self.undo_completed_actions().await;
                return Err(GoapError::PlanningFailed {
                    reason: format!("no feasible plan toward goal {goal}"),
                });
            }

            if let Some(tx) = &progress {
                let _ = tx.send(plan.clone());
            }

            let step = &plan.actions[0];
            match self.execute_action(step).await {
                Ok(()) => continue,
                Err(GoapError::ActionFailed { action, reason }) => {
                    warn!("action '{action}' failed ({reason}); blacklisting and replanning");
                    self.blacklist.insert(action);
                }
                Err(GoapError::ActionTimedOut { action, timeout }) => {
                    warn!("action '{action}' timed out after {timeout:?}; blacklisting and replanning");
                    self.blacklist.insert(action);
                }
                Err(GoapError::ActionAborted { action }) => {
                    warn!("action '{action}' aborted; unwinding completed actions");
                    self.undo_completed_actions().await;
                    return Err(GoapError::ActionAborted { action });
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Called once the goal is met: reverts the effects of every completed
    /// `auto_reset` action and clears both the completed stack and the
    /// blacklist (spec §4.4 — both are scoped to a single drive-loop run).
    fn finish(&mut self) {
        for c in &self.completed {
            if c.action.auto_reset {
                c.action.restore_effects(&mut self.state, &c.backup);
            }
        }
        self.completed.clear();
        self.blacklist.clear();
    }

    /// Convenience wrapper over [`Agent::plan_and_execute`] with no progress
    /// channel.
    pub async fn achieve_goal(&mut self, goal: &State) -> Result<()> {
        self.plan_and_execute(goal, None).await
    }

    /// Unwinds the completed-action stack in LIFO order: each action's
    /// effects are reverted in the world state and its `undo` callback is
    /// invoked, most-recent action first.
    pub async fn undo_completed_actions(&mut self) {
        while let Some(Completed { action, backup }) = self.completed.pop() {
            debug!("undoing action '{}'", action.name);
            action.restore_effects(&mut self.state, &backup);
            action.undo().await;
        }
    }

    /// Runs one action to completion (or failure/timeout/abort), applying or
    /// rolling back its effects as appropriate and recording it for rollback
    /// on success.
    async fn execute_action(&mut self, action: &Action) -> Result<()> {
        if self.join_pending_producers_of(&action.preconditions).await {
            // A pending async predecessor failed to settle: this tick is a
            // no-op (spec §4.4 step 2 — "return NEUTRAL, caller replans").
            return Ok(());
        }

        if !action.check_runtime_precondition() {
            action.on_failure();
            return Err(GoapError::ActionFailed {
                action: action.name.clone(),
                reason: "runtime precondition check failed".to_string(),
            });
        }

        let status = StatusHandle::new();
        let spawned = Arc::new(action.clone());
        let task_status = status.clone();
        let task_action = Arc::clone(&spawned);
        let handle = tokio::spawn(async move {
            task_action.execute(task_status).await;
        });

        if action.async_exec {
            debug!("applying optimistic effects for async action '{}'", action.name);
            action.apply_effects(&mut self.state);
            let backup = action.effect_backup().unwrap_or_default();
            self.completed.push(Completed { action: action.clone(), backup });
            self.pending.push(PendingAsync { action: action.clone(), status, handle });
            action.on_success();
            self.unblock_superseded(action);
            return Ok(());
        }

        let outcome = self.poll_until_settled(action, &status).await;
        handle.abort();

        match outcome {
            Ok(ActionStatus::Success) => {
                action.apply_effects(&mut self.state);
                let backup = action.effect_backup().unwrap_or_default();
                action.on_success();
                self.unblock_superseded(action);
                self.completed.push(Completed { action: action.clone(), backup });
                Ok(())
            }
            Ok(ActionStatus::Neutral) => {
                action.on_neutral();
                Ok(())
            }
            Ok(ActionStatus::Failure) => {
                action.on_failure();
                Err(GoapError::ActionFailed {
                    action: action.name.clone(),
                    reason: "execute() reported failure".to_string(),
                })
            }
            Ok(ActionStatus::Aborted) | Ok(ActionStatus::Running) => {
                action.on_aborted();
                Err(GoapError::ActionAborted { action: action.name.clone() })
            }
            Err(err) => Err(err),
        }
    }

    /// Polls `status` every `poll_interval` until it leaves `Running`, the
    /// abort flag is observed, or `action.timeout` elapses.
    async fn poll_until_settled(&self, action: &Action, status: &StatusHandle) -> Result<ActionStatus> {
        let deadline = tokio::time::Instant::now() + action.timeout;
        loop {
            if self.abort_flag.load(Ordering::SeqCst) {
                return Ok(ActionStatus::Aborted);
            }
            match status.get() {
                ActionStatus::Running => {}
                settled => return Ok(settled),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(GoapError::ActionTimedOut { action: action.name.clone(), timeout: action.timeout });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Before running an action, joins any still-pending async predecessor
    /// whose effects overlap this action's preconditions — an implicit join
    /// point, since a downstream action requiring a key an async action
    /// produces can't safely run until that producer actually settles.
    ///
    /// Returns `true` if a joined predecessor failed to settle: per spec
    /// §4.4 step 2, that predecessor's effects are rolled back, it is
    /// permanently removed from the action registry (not merely
    /// blacklisted) and the lookup index is rebuilt, and this tick becomes a
    /// no-op so the caller's drive loop simply replans.
    async fn join_pending_producers_of(&mut self, preconditions: &State) -> bool {
        let needed: HashSet<String> = preconditions.iter().map(|(k, _)| k.clone()).collect();
        let mut still_pending = Vec::new();
        let pending = std::mem::take(&mut self.pending);
        let mut predecessor_failed = false;

        for p in pending {
            let overlaps = !predecessor_failed && p.action.effects.iter().any(|(k, _)| needed.contains(k));
            if !overlaps {
                still_pending.push(p);
                continue;
            }

            let PendingAsync { action, status, handle } = p;
            let _ = handle.await;
            match status.get() {
                ActionStatus::Success | ActionStatus::Neutral => {
                    debug!("async predecessor '{}' settled successfully", action.name);
                }
                ActionStatus::Failure | ActionStatus::Aborted | ActionStatus::Running => {
                    warn!("async predecessor '{}' failed to settle; removing it from the registry", action.name);
                    if let Some(pos) = self.completed.iter().position(|c| c.action.name == action.name) {
                        let backup = self.completed.remove(pos).backup;
                        action.restore_effects(&mut self.state, &backup);
                    }
                    self.actions.retain(|a| a.name != action.name);
                    self.index = ActionIndex::build(&self.actions);
                    predecessor_failed = true;
                }
            }
        }

        self.pending = still_pending;
        predecessor_failed
    }

    /// Removes any blacklisted action whose effect-key set is a superset of
    /// `succeeded`'s effects, since a successfully executed action whose
    /// effects are fully covered by a blocked action's effects means the
    /// state has advanced past whatever condition made the blocked action
    /// fail in the first place.
    fn unblock_superseded(&mut self, succeeded: &Action) {
        let succeeded_keys: HashSet<&String> = succeeded.effects.iter().map(|(k, _)| k).collect();
        let lookup = &self.actions;
        self.blacklist.retain(|name| {
            let Some(blacklisted) = lookup.iter().find(|a| &a.name == name) else {
                return true;
            };
            let blacklisted_keys: HashSet<&String> = blacklisted.effects.iter().map(|(k, _)| k).collect();
            let fully_covered = succeeded_keys.iter().all(|k| blacklisted_keys.contains(*k));
            if fully_covered {
                info!("unblocking '{name}': superseded by successful action '{}'", succeeded.name);
            }
            !fully_covered
        });
    }
}
