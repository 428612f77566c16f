//! Watch backends
//!
//! A backend turns OS notifications into [`EventSink`] calls. The default
//! [`NotifyBackend`] uses the platform's recommended `notify` watcher.

use crate::error::WatchError;
use crate::sink::EventSink;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt::Debug;
use std::path::Path;

/// Source of file change events
pub trait WatchBackend: Send + Debug {
    /// Start delivering events for the tree under `root`
    ///
    /// # Errors
    /// Returns error if the watch cannot be established.
    fn arm(&mut self, root: &Path, sink: EventSink) -> Result<(), WatchError>;

    /// Stop delivering events; must be safe to call when not armed
    fn disarm(&mut self);
}

/// Recursive watcher built on the `notify` crate
#[derive(Default)]
pub struct NotifyBackend {
    watcher: Option<RecommendedWatcher>,
}

impl NotifyBackend {
    /// Create an unarmed backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Debug for NotifyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyBackend")
            .field("armed", &self.watcher.is_some())
            .finish()
    }
}

impl WatchBackend for NotifyBackend {
    fn arm(&mut self, root: &Path, sink: EventSink) -> Result<(), WatchError> {
        if !root.is_dir() {
            return Err(WatchError::RootNotFound(root.to_path_buf()));
        }

        let mut watcher =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                match res {
                    // create, write and rename all surface as Create/Modify
                    Ok(event) if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) => {
                        for path in &event.paths {
                            sink.record(path);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => sink.report_error(e.to_string()),
                }
            })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        self.watcher = Some(watcher);
        tracing::info!("Watching {} for changes", root.display());
        Ok(())
    }

    fn disarm(&mut self) {
        if self.watcher.take().is_some() {
            tracing::debug!("File watcher released");
        }
    }
}
