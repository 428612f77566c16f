//! Runtime error types

use crate::handle::MethodHandle;

/// Errors raised while loading modules or executing methods
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// Handle does not refer to a registered method
    #[error("unknown method handle {0}")]
    UnknownMethod(MethodHandle),

    /// No loaded type has this full name
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// Type exists but has no method with this name and argument types
    #[error("no method {type_name}::{method}({params})")]
    MethodNotFound {
        /// Declaring type full name
        type_name: String,
        /// Method name
        method: String,
        /// Comma-separated argument type names
        params: String,
    },

    /// Wrong number of arguments for a call
    #[error("{method} expects {expected} argument(s), got {found}")]
    ArityMismatch {
        /// Method being invoked
        method: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        found: usize,
    },

    /// Operator applied to values of the wrong type
    #[error("cannot apply '{op}' to {lhs} and {rhs}")]
    TypeMismatch {
        /// Operator symbol
        op: &'static str,
        /// Left operand type
        lhs: &'static str,
        /// Right operand type (or "-" for unary)
        rhs: &'static str,
    },

    /// Integer division or remainder by zero
    #[error("division by zero")]
    DivisionByZero,

    /// Integer arithmetic overflowed
    #[error("integer overflow")]
    Overflow,

    /// Call nesting exceeded the program's limit
    #[error("call depth exceeded ({0})")]
    CallDepthExceeded(usize),

    /// Module with this name is already loaded
    #[error("module already loaded: {0}")]
    DuplicateModule(String),

    /// Method handle already registered by another module
    #[error("method handle {0} already registered")]
    DuplicateHandle(MethodHandle),

    /// Error reported by a native method body
    #[error("native method failed: {0}")]
    Native(String),
}

impl RuntimeError {
    /// Create a native-body error
    #[inline]
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native(message.into())
    }

    /// Whether the error comes from executing code rather than loading it
    #[inline]
    #[must_use]
    pub fn is_execution_error(&self) -> bool {
        !matches!(self, Self::DuplicateModule(_) | Self::DuplicateHandle(_))
    }
}
