//! Opaque identities for methods and modules

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Opaque reference to a callable method in the program
///
/// Handles are allocated by [`crate::Program::allocate_handle`] and never reused,
/// so a handle identifies one method body for the lifetime of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodHandle(u64);

impl MethodHandle {
    /// Wrap a raw handle value
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw handle value
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl Display for MethodHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "m#{}", self.0)
    }
}

/// Load-order identity of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(u32);

impl ModuleId {
    /// Wrap a raw module id
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw id value
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl Display for ModuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "mod#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_display() {
        assert_eq!(MethodHandle::from_raw(7).to_string(), "m#7");
        assert_eq!(ModuleId::from_raw(2).to_string(), "mod#2");
    }

    #[test]
    fn handle_ordering_follows_raw() {
        assert!(MethodHandle::from_raw(1) < MethodHandle::from_raw(2));
    }
}
