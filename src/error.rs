// ============================================================================
//                       GOAP ENGINE • ERROR TAXONOMY
//        Typed Failure Modes for Planning and Agent Execution
// ----------------------------------------------------------------------------
//   Architectural Role:
//       Defines the crate-wide error type. Planning failures and execution
//       failures are distinct enough in cause and recovery (replan vs.
//       blacklist-and-retry vs. terminal abort) that callers need to match on
//       them individually, so this is a `thiserror` enum rather than a single
//       opaque `anyhow::Error`.
// ============================================================================

use std::time::Duration;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GoapError>;

/// The error taxonomy surfaced by the planner and the agent executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GoapError {
    /// `generate_plan` could not produce a feasible plan for the given goal.
    #[error("planning failed: {reason}")]
    PlanningFailed {
        /// Human-readable description of why planning failed.
        reason: String,
    },

    /// A precondition resolution chain referred back to a key already being
    /// resolved, i.e. the reference graph contains a cycle.
    #[error("cyclic references while resolving '{key}'")]
    CyclicReference {
        /// The key whose resolution re-entered itself.
        key: String,
    },

    /// Reference resolution or subgoal regression exceeded the configured
    /// recursion bound without converging.
    #[error("recursion limit exceeded while resolving '{key}'")]
    RecursionLimitExceeded {
        /// The key being resolved when the limit was hit.
        key: String,
    },

    /// An action's runtime precondition check failed, or its execution
    /// reported `FAILURE`.
    #[error("action '{action}' failed: {reason}")]
    ActionFailed {
        /// Name of the action that failed.
        action: String,
        /// Description of the failure.
        reason: String,
    },

    /// The agent's abort flag was observed during execution of this action.
    #[error("action '{action}' aborted")]
    ActionAborted {
        /// Name of the action that was aborted.
        action: String,
    },

    /// The action's execution exceeded its declared timeout.
    #[error("action '{action}' timed out after {timeout:?}")]
    ActionTimedOut {
        /// Name of the action that timed out.
        action: String,
        /// The timeout that was exceeded.
        timeout: Duration,
    },
}

impl GoapError {
    /// True for any variant that originates from the planner rather than
    /// from executing an accepted plan.
    pub fn is_planning_failure(&self) -> bool {
        matches!(
            self,
            GoapError::PlanningFailed { .. }
                | GoapError::CyclicReference { .. }
                | GoapError::RecursionLimitExceeded { .. }
        )
    }
}
