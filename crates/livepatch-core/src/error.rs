//! Session error types

use crate::state::SessionState;
use livepatch_patch::PatchError;

/// Errors surfaced by a live patch session
///
/// Inside a cycle these are caught at the session boundary and logged; only
/// [`crate::LivePatchSession::apply_now`] returns them to the host, and only
/// for requests that could not start.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// State change not allowed by the state machine
    #[error("illegal state transition: {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: SessionState,
        /// Requested state
        to: SessionState,
    },

    /// No session has been entered
    #[error("no live patch session is active")]
    NotActive,

    /// A cycle is already running
    #[error("session is busy ({0})")]
    Busy(SessionState),

    /// Patch engine failure
    #[error("patch engine error: {0}")]
    Patch(#[from] PatchError),
}

impl SessionError {
    /// Whether retrying later may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::NotActive)
    }
}
