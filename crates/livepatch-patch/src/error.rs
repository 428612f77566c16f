//! Patch error types

use crate::redirector::RedirectionHandle;
use livepatch_runtime::MethodHandle;

/// Failure of a single redirector operation
///
/// These are counted per method and never abort a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedirectError {
    /// Redirector used before `prepare` or after `release`
    #[error("redirector is not prepared")]
    NotPrepared,

    /// Method is not loaded in the program
    #[error("method {0} is not loaded")]
    UnknownMethod(MethodHandle),

    /// Original and replacement cannot be swapped
    #[error("incompatible redirection: {0}")]
    Incompatible(String),

    /// Handle was never issued or is already reverted
    #[error("unknown redirection {0}")]
    UnknownRedirection(RedirectionHandle),

    /// Anything else the redirector reports
    #[error("redirector failed: {0}")]
    Failed(String),
}

impl RedirectError {
    /// Create a generic failure
    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Engine-level errors
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// `initialize` has not run
    #[error("patch engine is not initialized")]
    NotInitialized,

    /// `dispose` has run
    #[error("patch engine is disposed")]
    Disposed,

    /// The redirector could not be prepared
    #[error("failed to prepare redirector: {0}")]
    Prepare(#[from] RedirectError),
}
