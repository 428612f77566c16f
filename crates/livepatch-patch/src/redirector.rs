//! Low-level redirection capability

use crate::error::RedirectError;
use livepatch_runtime::{DetourId, MethodHandle, Priority, Program};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

/// Identifies one installed redirection to the redirector that made it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RedirectionHandle(u64);

impl RedirectionHandle {
    /// Wrap a raw value
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Display for RedirectionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "redirect#{}", self.0)
    }
}

/// Makes invocations of one method execute another
///
/// Implementations must leave the original untouched when `install` fails.
pub trait Redirector: Send + Debug {
    /// Acquire whatever the redirector needs; called once
    ///
    /// # Errors
    /// Returns error if redirection is unavailable.
    fn prepare(&mut self) -> Result<(), RedirectError>;

    /// Redirect `original` to `replacement` with the highest priority
    ///
    /// # Errors
    /// Returns error if the redirection cannot be installed.
    fn install(
        &mut self,
        original: MethodHandle,
        replacement: MethodHandle,
    ) -> Result<RedirectionHandle, RedirectError>;

    /// Undo one installed redirection
    ///
    /// # Errors
    /// Returns error if the handle is unknown or the revert fails.
    fn revert(&mut self, handle: RedirectionHandle) -> Result<(), RedirectError>;

    /// Release everything acquired by `prepare`
    fn release(&mut self);
}

/// Redirector backed by the program's detour table
#[derive(Debug)]
pub struct DetourRedirector {
    program: Arc<Program>,
    prepared: bool,
    next: u64,
    installed: HashMap<RedirectionHandle, DetourId>,
}

impl DetourRedirector {
    /// Create a redirector for `program`
    #[must_use]
    pub fn new(program: Arc<Program>) -> Self {
        Self {
            program,
            prepared: false,
            next: 1,
            installed: HashMap::new(),
        }
    }

    /// Number of detours this redirector currently owns
    #[inline]
    #[must_use]
    pub fn installed_count(&self) -> usize {
        self.installed.len()
    }
}

impl Redirector for DetourRedirector {
    fn prepare(&mut self) -> Result<(), RedirectError> {
        self.prepared = true;
        Ok(())
    }

    fn install(
        &mut self,
        original: MethodHandle,
        replacement: MethodHandle,
    ) -> Result<RedirectionHandle, RedirectError> {
        if !self.prepared {
            return Err(RedirectError::NotPrepared);
        }
        let from = self
            .program
            .method(original)
            .ok_or(RedirectError::UnknownMethod(original))?;
        let to = self
            .program
            .method(replacement)
            .ok_or(RedirectError::UnknownMethod(replacement))?;
        if from.signature().arity() != to.signature().arity() {
            return Err(RedirectError::Incompatible(format!(
                "{} takes {} arguments, {} takes {}",
                from.signature().display_name(),
                from.signature().arity(),
                to.signature().display_name(),
                to.signature().arity()
            )));
        }

        let detour = self
            .program
            .detours()
            .install(original, replacement, Priority::HIGHEST);
        let handle = RedirectionHandle::from_raw(self.next);
        self.next += 1;
        self.installed.insert(handle, detour);
        tracing::trace!("{original} -> {replacement} via {detour}");
        Ok(handle)
    }

    fn revert(&mut self, handle: RedirectionHandle) -> Result<(), RedirectError> {
        let detour = self
            .installed
            .remove(&handle)
            .ok_or(RedirectError::UnknownRedirection(handle))?;
        if self.program.detours().remove(detour) {
            Ok(())
        } else {
            Err(RedirectError::failed(format!("{detour} was already removed")))
        }
    }

    fn release(&mut self) {
        for (_, detour) in self.installed.drain() {
            self.program.detours().remove(detour);
        }
        self.prepared = false;
    }
}
