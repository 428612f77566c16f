//! Call redirection table
//!
//! A [`DetourTable`] maps an original method handle to an ordered stack of
//! replacements. Every call made through [`crate::Program`] consults the
//! table once; the winning detour is the one with the highest priority, and
//! among equal priorities the most recently installed.
//!
//! Resolution is a single hop. A replacement that is itself detoured is not
//! followed, so installing `A -> B` and `B -> C` does not make `A` run `C`.

use crate::handle::MethodHandle;
use dashmap::DashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

/// Detour priority, higher wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(pub i32);

impl Priority {
    /// Lowest possible priority
    pub const LOWEST: Self = Self(i32::MIN);
    /// Default priority
    pub const NORMAL: Self = Self(0);
    /// Highest possible priority
    pub const HIGHEST: Self = Self(i32::MAX);
}

/// Identity of an installed detour
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DetourId(u64);

impl DetourId {
    /// Raw id value
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Display for DetourId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "detour#{}", self.0)
    }
}

/// An installed redirection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detour {
    /// Identity
    pub id: DetourId,
    /// Method that runs instead of the original
    pub replacement: MethodHandle,
    /// Precedence among detours on the same original
    pub priority: Priority,
}

/// Concurrent table of detours keyed by original method
#[derive(Debug, Default)]
pub struct DetourTable {
    /// original -> detours, sorted by (priority desc, id desc)
    by_original: DashMap<MethodHandle, Vec<Detour>>,
    /// detour id -> original
    owner: DashMap<DetourId, MethodHandle>,
    next_id: AtomicU64,
}

impl DetourTable {
    /// Create an empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Redirect calls of `original` to `replacement`
    pub fn install(
        &self,
        original: MethodHandle,
        replacement: MethodHandle,
        priority: Priority,
    ) -> DetourId {
        let id = DetourId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let detour = Detour {
            id,
            replacement,
            priority,
        };

        let mut stack = self.by_original.entry(original).or_default();
        stack.push(detour);
        stack.sort_by(|a, b| b.priority.cmp(&a.priority).then(b.id.cmp(&a.id)));
        drop(stack);

        self.owner.insert(id, original);
        tracing::trace!("Installed {id}: {original} -> {replacement}");
        id
    }

    /// Remove a detour; returns `false` if it was not installed
    pub fn remove(&self, id: DetourId) -> bool {
        let Some((_, original)) = self.owner.remove(&id) else {
            return false;
        };

        let emptied = match self.by_original.get_mut(&original) {
            Some(mut stack) => {
                stack.retain(|d| d.id != id);
                stack.is_empty()
            }
            None => false,
        };
        if emptied {
            self.by_original.remove_if(&original, |_, stack| stack.is_empty());
        }

        tracing::trace!("Removed {id} from {original}");
        true
    }

    /// Handle that a call to `handle` should execute
    #[must_use]
    pub fn resolve(&self, handle: MethodHandle) -> MethodHandle {
        self.by_original
            .get(&handle)
            .and_then(|stack| stack.first().map(|d| d.replacement))
            .unwrap_or(handle)
    }

    /// Detours on `original`, winner first
    #[must_use]
    pub fn detours_for(&self, original: MethodHandle) -> Vec<Detour> {
        self.by_original
            .get(&original)
            .map(|stack| stack.clone())
            .unwrap_or_default()
    }

    /// Original method a detour is installed on
    #[must_use]
    pub fn original_of(&self, id: DetourId) -> Option<MethodHandle> {
        self.owner.get(&id).map(|entry| *entry)
    }

    /// Number of installed detours
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.owner.len()
    }

    /// Whether no detours are installed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty()
    }

    /// Remove every detour
    pub fn clear(&self) {
        self.by_original.clear();
        self.owner.clear();
    }
}
