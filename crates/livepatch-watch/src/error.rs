//! Watch error types

use std::path::PathBuf;

/// Errors raised by a watch backend
///
/// None of these are fatal to the host; the aggregator logs them and
/// degrades to an inert watch.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Watch root does not exist or is not a directory
    #[error("watch root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// OS notification facility failed
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// Backend-specific failure
    #[error("watch backend failed: {0}")]
    Backend(String),
}

impl WatchError {
    /// Create a backend error
    #[inline]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}
