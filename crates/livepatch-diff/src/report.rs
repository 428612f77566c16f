//! Diff results

use livepatch_runtime::{MethodFlags, MethodHandle, MethodSignature};
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

/// A compiled method paired with the running method it replaces
///
/// Original and replacement share declaring type, name and parameter types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodChange {
    /// Running method
    pub original: MethodHandle,
    /// Newly compiled method
    pub replacement: MethodHandle,
    /// Signature of the original
    pub signature: MethodSignature,
    /// Flags of the original
    pub original_flags: MethodFlags,
    /// Module that owns the replacement
    pub replacement_module: String,
}

impl MethodChange {
    /// Whether the original must never be redirected
    #[inline]
    #[must_use]
    pub fn is_never_patch(&self) -> bool {
        self.original_flags.no_patch
    }

    /// Human-readable description of the redirection
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} -> {}", self.signature.display_name(), self.replacement_module)
    }
}

/// Why a compiled method has no running counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnmatchedReason {
    /// Declaring type is not running
    NewType,
    /// Type is running but no method has this name and parameter list
    NewSignature,
}

impl Display for UnmatchedReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewType => write!(f, "new type"),
            Self::NewSignature => write!(f, "new signature"),
        }
    }
}

/// A compiled method that will not be patched in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedMethod {
    /// Compiled signature
    pub signature: MethodSignature,
    /// Reason
    pub reason: UnmatchedReason,
}

/// Outcome of diffing one compiled module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    /// Methods to patch, in declaration order
    pub changes: Vec<MethodChange>,
    /// Methods with no running counterpart
    pub unmatched: Vec<UnmatchedMethod>,
    /// Generated members excluded from matching
    pub skipped_generated: Vec<MethodSignature>,
}

impl DiffReport {
    /// Whether there is anything to patch
    #[inline]
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}
