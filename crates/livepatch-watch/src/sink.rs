//! Shared pending-change state and the handle backends deliver into

use crate::clock::Clock;
use crate::filter::PathFilter;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default)]
pub(crate) struct Pending {
    pub(crate) paths: BTreeSet<PathBuf>,
    pub(crate) last_change: Option<Instant>,
    pub(crate) backend_error: Option<String>,
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) pending: Mutex<Pending>,
    pub(crate) filter: RwLock<Arc<PathFilter>>,
    pub(crate) root: RwLock<Option<PathBuf>>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Shared {
    pub(crate) fn new(filter: PathFilter, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            filter: RwLock::new(Arc::new(filter)),
            root: RwLock::new(None),
            clock,
        }
    }
}

/// Cloneable handle through which change events reach the aggregator
///
/// Backends call [`EventSink::record`] from their notification thread. Hosts
/// may also inject paths directly, for example from an editor save hook.
#[derive(Debug, Clone)]
pub struct EventSink {
    shared: Arc<Shared>,
}

impl EventSink {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Record a changed path; returns whether it passed the filter
    ///
    /// Paths under the watch root are filtered by their root-relative form.
    /// Relative paths are taken as already root-relative and stored joined to
    /// the root.
    pub fn record(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let root = self.shared.root.read().clone();

        let (relative, stored) = match root.as_deref() {
            Some(root) if path.is_absolute() => match path.strip_prefix(root) {
                Ok(rel) => (rel.to_path_buf(), path.to_path_buf()),
                Err(_) => (path.to_path_buf(), path.to_path_buf()),
            },
            Some(root) => (path.to_path_buf(), root.join(path)),
            None => (path.to_path_buf(), path.to_path_buf()),
        };

        let filter = Arc::clone(&self.shared.filter.read());
        if !filter.accepts(&relative) {
            tracing::trace!("Ignoring change outside filter: {}", relative.display());
            return false;
        }

        let now = self.shared.clock.now();
        let mut pending = self.shared.pending.lock();
        pending.paths.insert(stored);
        pending.last_change = Some(now);
        drop(pending);

        tracing::debug!("Change recorded: {}", relative.display());
        true
    }

    /// Report a backend failure; the aggregator handles it on its next poll
    pub fn report_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("Watch backend reported an error: {message}");
        self.shared.pending.lock().backend_error = Some(message);
    }
}
