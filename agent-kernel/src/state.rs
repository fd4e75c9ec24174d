//! Per-call state machine used by the dispatcher.

use agent_primitives::CallId;
use thiserror::Error;
use tracing::trace;

/// States a call record moves through during one dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    /// Parsed but not yet attempted.
    Pending,
    /// The capability was invoked, successfully or not.
    Executed,
    /// The call was not invoked (unknown tool, or already run as a sub-task).
    Skipped,
}

impl CallState {
    /// Returns `true` once the call can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Skipped)
    }
}

/// Tracks the state of a single call.
#[derive(Debug, Clone)]
pub struct CallTracker {
    call_id: CallId,
    state: CallState,
}

impl CallTracker {
    /// Starts tracking a call in [`CallState::Pending`].
    #[must_use]
    pub const fn new(call_id: CallId) -> Self {
        Self {
            call_id,
            state: CallState::Pending,
        }
    }

    /// Returns the tracked call identifier.
    #[must_use]
    pub const fn call_id(&self) -> &CallId {
        &self.call_id
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> CallState {
        self.state
    }

    /// Moves the call to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::InvalidTransition`] unless the call is still
    /// pending and `next` is a terminal state.
    pub fn advance(&mut self, next: CallState) -> StateResult<CallState> {
        if self.state != CallState::Pending || !next.is_terminal() {
            return Err(StateError::InvalidTransition {
                call_id: self.call_id.clone(),
                from: self.state,
                to: next,
            });
        }

        trace!(call_id = %self.call_id, ?next, "call state transition");
        self.state = next;
        Ok(self.state)
    }
}

/// Errors emitted by [`CallTracker`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    /// Transition was not permitted from the current state.
    #[error("invalid call transition from {from:?} to {to:?} for call {call_id}")]
    InvalidTransition {
        /// Call whose transition failed.
        call_id: CallId,
        /// State prior to the attempted transition.
        from: CallState,
        /// Requested state.
        to: CallState,
    },
}

/// Result alias used for call state operations.
pub type StateResult<T> = Result<T, StateError>;
