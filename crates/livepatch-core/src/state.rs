//! Session state machine

use crate::error::SessionError;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// Where a session is in its watch, compile and patch loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionState {
    /// Not watching: no session, or auto-apply is off
    Idle,
    /// Waiting for a change batch
    Watching,
    /// Compiling a batch
    Compiling,
    /// Installing redirections
    Patching,
}

impl SessionState {
    /// Every state
    pub const ALL: [Self; 4] = [Self::Idle, Self::Watching, Self::Compiling, Self::Patching];

    /// Whether a cycle is running
    #[inline]
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Compiling | Self::Patching)
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Watching => "watching",
            Self::Compiling => "compiling",
            Self::Patching => "patching",
        };
        f.write_str(name)
    }
}

/// States reachable from `from` in one step
///
/// Idle reaches Compiling only through a manual apply; Compiling and
/// Patching fall back to Idle for the same reason and on session end.
#[must_use]
pub fn allowed_transitions(from: SessionState) -> Vec<SessionState> {
    use SessionState::{Compiling, Idle, Patching, Watching};
    match from {
        Idle => vec![Watching, Compiling],
        Watching => vec![Compiling, Idle],
        Compiling => vec![Patching, Watching, Idle],
        Patching => vec![Watching, Idle],
    }
}

/// Validate one state change
///
/// # Errors
/// Returns [`SessionError::IllegalTransition`] if `to` is not reachable from `from`.
pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), SessionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SessionError::IllegalTransition { from, to })
    }
}
