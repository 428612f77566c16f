//! Patch engine: the table of active redirections

use crate::error::{PatchError, RedirectError};
use crate::redirector::{RedirectionHandle, Redirector};
use chrono::{DateTime, Utc};
use livepatch_diff::MethodChange;
use livepatch_runtime::MethodHandle;
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, info, warn};

/// One installed redirection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveRedirection {
    /// Method being redirected
    pub original: MethodHandle,
    /// Method now executing in its place
    pub replacement: MethodHandle,
    /// Redirector's handle for the install
    pub redirection: RedirectionHandle,
    /// `Type::method(params) -> module`
    pub description: String,
    /// When the redirection was installed
    pub installed_at: DateTime<Utc>,
}

/// Counts for one `apply_patches` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatchSummary {
    /// Redirections installed
    pub success_count: usize,
    /// Changes not installed, skips included
    pub failure_count: usize,
    /// Failures that were never-patch skips
    pub skipped_count: usize,
}

impl PatchSummary {
    /// Number of changes processed
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Ready,
    Disposed,
}

/// Installs and tracks redirections, at most one per original method
///
/// Each install is independent: a redirector error or panic on one method
/// is logged and counted, and the rest of the batch continues.
#[derive(Debug)]
pub struct PatchEngine {
    redirector: Box<dyn Redirector>,
    active: BTreeMap<MethodHandle, ActiveRedirection>,
    lifecycle: Lifecycle,
}

impl PatchEngine {
    /// Create an engine around a redirector; call [`PatchEngine::initialize`] before use
    #[must_use]
    pub fn new(redirector: Box<dyn Redirector>) -> Self {
        Self {
            redirector,
            active: BTreeMap::new(),
            lifecycle: Lifecycle::Created,
        }
    }

    /// Prepare the redirector; later calls are no-ops
    ///
    /// # Errors
    /// Returns error if the engine was disposed or the redirector cannot be
    /// prepared.
    pub fn initialize(&mut self) -> Result<(), PatchError> {
        match self.lifecycle {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Disposed => Err(PatchError::Disposed),
            Lifecycle::Created => {
                self.redirector.prepare()?;
                self.lifecycle = Lifecycle::Ready;
                debug!("Patch engine initialized");
                Ok(())
            }
        }
    }

    /// Whether `initialize` succeeded and `dispose` has not run
    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    /// Install a redirection for every change
    ///
    /// A change whose original carries the never-patch marker is skipped
    /// and counted as a failure. Replacing an existing redirection installs
    /// the new one before reverting the old, so the original is never left
    /// unredirected.
    ///
    /// # Errors
    /// Returns error if the engine is not initialized or already disposed.
    pub fn apply_patches(&mut self, changes: &[MethodChange]) -> Result<PatchSummary, PatchError> {
        match self.lifecycle {
            Lifecycle::Created => return Err(PatchError::NotInitialized),
            Lifecycle::Disposed => return Err(PatchError::Disposed),
            Lifecycle::Ready => {}
        }

        let mut summary = PatchSummary::default();
        for change in changes {
            if change.is_never_patch() {
                debug!("Skipping never-patch method {}", change.signature.display_name());
                summary.failure_count += 1;
                summary.skipped_count += 1;
                continue;
            }

            match self.install(change) {
                Ok(()) => summary.success_count += 1,
                Err(message) => {
                    error!(
                        "Failed to patch {}: {message}",
                        change.signature.display_name()
                    );
                    summary.failure_count += 1;
                }
            }
        }

        info!(
            success = summary.success_count,
            failure = summary.failure_count,
            skipped = summary.skipped_count,
            active = self.active.len(),
            "Patches applied"
        );
        Ok(summary)
    }

    fn install(&mut self, change: &MethodChange) -> Result<(), String> {
        let redirector = &mut self.redirector;
        let installed = catch_unwind(AssertUnwindSafe(|| {
            redirector.install(change.original, change.replacement)
        }));
        let redirection = match installed {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(payload) => return Err(format!("redirector panicked: {}", panic_message(&*payload))),
        };

        let entry = ActiveRedirection {
            original: change.original,
            replacement: change.replacement,
            redirection,
            description: change.describe(),
            installed_at: Utc::now(),
        };
        if let Some(previous) = self.active.insert(change.original, entry) {
            if let Err(e) = self.revert(previous.redirection) {
                warn!(
                    "Superseded redirection {} for {} could not be reverted: {e}",
                    previous.redirection, change.original
                );
            }
        }
        debug!("Patched {}", change.describe());
        Ok(())
    }

    fn revert(&mut self, handle: RedirectionHandle) -> Result<(), RedirectError> {
        let redirector = &mut self.redirector;
        catch_unwind(AssertUnwindSafe(|| redirector.revert(handle))).unwrap_or_else(|payload| {
            Err(RedirectError::failed(format!(
                "redirector panicked: {}",
                panic_message(&*payload)
            )))
        })
    }

    /// Revert every active redirection; returns how many were tracked
    ///
    /// Reverts are independent; failures are logged and the table is
    /// cleared regardless.
    pub fn clear_all_patches(&mut self) -> usize {
        let active = std::mem::take(&mut self.active);
        let count = active.len();
        for (original, redirection) in active {
            if let Err(e) = self.revert(redirection.redirection) {
                error!("Failed to revert patch on {original}: {e}");
            }
        }
        if count > 0 {
            info!("Reverted {count} patches");
        }
        count
    }

    /// Active redirections as original handle -> description
    #[must_use]
    pub fn active_patches(&self) -> BTreeMap<MethodHandle, String> {
        self.active
            .iter()
            .map(|(handle, active)| (*handle, active.description.clone()))
            .collect()
    }

    /// Active redirection for an original method
    #[inline]
    #[must_use]
    pub fn active(&self, original: MethodHandle) -> Option<&ActiveRedirection> {
        self.active.get(&original)
    }

    /// Number of active redirections
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Revert everything and release the redirector; idempotent
    pub fn dispose(&mut self) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        self.clear_all_patches();
        if self.lifecycle == Lifecycle::Ready {
            self.redirector.release();
        }
        self.lifecycle = Lifecycle::Disposed;
        debug!("Patch engine disposed");
    }
}

impl Drop for PatchEngine {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn summary_total() {
        let summary = PatchSummary {
            success_count: 2,
            failure_count: 3,
            skipped_count: 1,
        };
        assert_eq!(summary.total(), 5);
    }
}
