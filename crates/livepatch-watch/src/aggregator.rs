//! Debounced change aggregation

use crate::backend::{NotifyBackend, WatchBackend};
use crate::batch::ChangeBatch;
use crate::clock::{Clock, SystemClock};
use crate::filter::PathFilter;
use crate::sink::{EventSink, Shared};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default quiet period before a batch is released
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Lifecycle of the underlying watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Not watching
    Stopped,
    /// Backend delivering events
    Armed,
    /// Backend failed; nothing is detected until the next `start_watching`
    Inert,
}

/// Collects filtered change events and releases them as debounced batches
///
/// Events arrive on the backend's thread through an [`EventSink`]; the host
/// drains them on its own thread with [`ChangeAggregator::poll`].
#[derive(Debug)]
pub struct ChangeAggregator {
    shared: Arc<Shared>,
    backend: Box<dyn WatchBackend>,
    state: WatchState,
    root: Option<PathBuf>,
    debounce: Duration,
    rearmed: bool,
}

impl ChangeAggregator {
    /// Create an aggregator using the `notify` backend and the system clock
    #[must_use]
    pub fn new(filter: PathFilter, debounce: Duration) -> Self {
        Self::with_parts(
            filter,
            debounce,
            Box::new(NotifyBackend::new()),
            Arc::new(SystemClock),
        )
    }

    /// Create an aggregator with an explicit backend and clock
    #[must_use]
    pub fn with_parts(
        filter: PathFilter,
        debounce: Duration,
        backend: Box<dyn WatchBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared::new(filter, clock)),
            backend,
            state: WatchState::Stopped,
            root: None,
            debounce,
            rearmed: false,
        }
    }

    /// Current watch state
    #[inline]
    #[must_use]
    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Root being watched, if started
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Debounce interval
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Snapshot of the active filter
    #[must_use]
    pub fn filter(&self) -> Arc<PathFilter> {
        Arc::clone(&self.shared.filter.read())
    }

    /// Handle for delivering events
    #[must_use]
    pub fn sink(&self) -> EventSink {
        EventSink::new(Arc::clone(&self.shared))
    }

    /// Number of paths waiting for the debounce window to close
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().paths.len()
    }

    /// Start watching `root`
    ///
    /// Never fails: if the backend cannot be armed the watch becomes
    /// [`WatchState::Inert`] and the failure is logged.
    pub fn start_watching(&mut self, root: impl Into<PathBuf>) {
        let root = root.into();
        if self.state != WatchState::Stopped {
            self.backend.disarm();
        }

        *self.shared.root.write() = Some(root.clone());
        {
            let mut pending = self.shared.pending.lock();
            pending.paths.clear();
            pending.last_change = None;
            pending.backend_error = None;
        }
        self.rearmed = false;

        match self.backend.arm(&root, self.sink()) {
            Ok(()) => {
                self.state = WatchState::Armed;
                tracing::info!("Change aggregator armed on {}", root.display());
            }
            Err(e) => {
                self.state = WatchState::Inert;
                tracing::error!(
                    "Failed to start watching {}: {e}; changes will not be detected",
                    root.display()
                );
            }
        }
        self.root = Some(root);
    }

    /// Stop watching and discard pending changes
    pub fn stop_watching(&mut self) {
        self.backend.disarm();
        let mut pending = self.shared.pending.lock();
        pending.paths.clear();
        pending.last_change = None;
        pending.backend_error = None;
        drop(pending);

        if self.state != WatchState::Stopped {
            tracing::info!("Change aggregator stopped");
        }
        self.state = WatchState::Stopped;
    }

    /// Apply a new filter and debounce interval
    pub fn update_settings(&mut self, filter: PathFilter, debounce: Duration) {
        *self.shared.filter.write() = Arc::new(filter);
        self.debounce = debounce;
    }

    /// Take the pending batch if the debounce window has closed
    ///
    /// Returns `None` while changes are still arriving, when nothing is
    /// pending, or when the watch is not armed.
    pub fn poll(&mut self) -> Option<ChangeBatch> {
        self.handle_backend_error();
        if self.state != WatchState::Armed {
            return None;
        }

        let now = self.shared.clock.now();
        let mut pending = self.shared.pending.lock();
        if pending.paths.is_empty() {
            return None;
        }
        let quiet = pending
            .last_change
            .map_or(Duration::MAX, |last| now.saturating_duration_since(last));
        if quiet < self.debounce {
            return None;
        }

        let paths = std::mem::take(&mut pending.paths);
        pending.last_change = None;
        drop(pending);

        let batch = ChangeBatch::new(paths);
        tracing::debug!("Released change batch of {} file(s)", batch.len());
        Some(batch)
    }

    fn handle_backend_error(&mut self) {
        let Some(message) = self.shared.pending.lock().backend_error.take() else {
            return;
        };
        if self.state != WatchState::Armed {
            return;
        }

        self.backend.disarm();
        let Some(root) = self.root.clone() else {
            self.state = WatchState::Inert;
            return;
        };

        if self.rearmed {
            tracing::error!(
                "Watch on {} failed again ({message}); giving up until restarted",
                root.display()
            );
            self.go_inert();
            return;
        }

        self.rearmed = true;
        tracing::warn!("Watch on {} failed ({message}); re-arming", root.display());
        match self.backend.arm(&root, self.sink()) {
            Ok(()) => tracing::info!("Watch on {} re-armed", root.display()),
            Err(e) => {
                tracing::error!("Re-arming watch on {} failed: {e}", root.display());
                self.go_inert();
            }
        }
    }

    fn go_inert(&mut self) {
        self.backend.disarm();
        let mut pending = self.shared.pending.lock();
        pending.paths.clear();
        pending.last_change = None;
        drop(pending);
        self.state = WatchState::Inert;
    }
}

impl Drop for ChangeAggregator {
    fn drop(&mut self) {
        self.backend.disarm();
    }
}
