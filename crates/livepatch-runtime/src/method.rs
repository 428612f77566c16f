//! Method definitions

use crate::error::RuntimeError;
use crate::handle::MethodHandle;
use crate::ir::Body;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

/// Nominal signature of a method
///
/// Parameter and return types are full type names (`int`, `Game.Vec2`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Full name of the declaring type
    pub declaring_type: String,
    /// Method name
    pub name: String,
    /// Ordered parameter type names
    pub params: Vec<String>,
    /// Return type name
    pub return_type: String,
}

impl MethodSignature {
    /// Create a signature
    #[must_use]
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        params: Vec<String>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            params,
            return_type: return_type.into(),
        }
    }

    /// Number of parameters
    #[inline]
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// `Type::name(params)` without the return type
    #[must_use]
    pub fn display_name(&self) -> String {
        format!(
            "{}::{}({})",
            self.declaring_type,
            self.name,
            self.params.join(", ")
        )
    }
}

impl Display for MethodSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.display_name(), self.return_type)
    }
}

/// Declaration flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodFlags {
    /// Declared `pub`
    pub is_public: bool,
    /// Declared `static`
    pub is_static: bool,
    /// Declared `unsafe`
    pub is_unsafe: bool,
    /// Carries the never-patch marker
    pub no_patch: bool,
}

impl MethodFlags {
    /// With `pub`
    #[inline]
    #[must_use]
    pub fn public(mut self) -> Self {
        self.is_public = true;
        self
    }

    /// With `static`
    #[inline]
    #[must_use]
    pub fn with_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// With the never-patch marker
    #[inline]
    #[must_use]
    pub fn never_patch(mut self) -> Self {
        self.no_patch = true;
        self
    }
}

/// Native method implementation
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Executable body of a method
#[derive(Clone)]
pub enum MethodBody {
    /// Lowered IR run by the interpreter
    Interpreted(Arc<Body>),
    /// Host-provided Rust function
    Native(NativeFn),
}

impl MethodBody {
    /// Wrap a native function
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Self::Native(Arc::new(f))
    }

    /// Wrap lowered IR
    #[inline]
    #[must_use]
    pub fn interpreted(body: Body) -> Self {
        Self::Interpreted(Arc::new(body))
    }
}

impl Debug for MethodBody {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interpreted(body) => f
                .debug_struct("Interpreted")
                .field("slots", &body.slot_count)
                .field("stmts", &body.stmts.len())
                .finish(),
            Self::Native(_) => f.write_str("Native(..)"),
        }
    }
}

/// A method registered in the program
#[derive(Debug, Clone)]
pub struct MethodDef {
    handle: MethodHandle,
    signature: MethodSignature,
    flags: MethodFlags,
    body: MethodBody,
}

impl MethodDef {
    /// Create a method definition
    #[must_use]
    pub fn new(
        handle: MethodHandle,
        signature: MethodSignature,
        flags: MethodFlags,
        body: MethodBody,
    ) -> Self {
        Self {
            handle,
            signature,
            flags,
            body,
        }
    }

    /// Handle of this method
    #[inline]
    #[must_use]
    pub fn handle(&self) -> MethodHandle {
        self.handle
    }

    /// Signature
    #[inline]
    #[must_use]
    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    /// Method name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.signature.name
    }

    /// Declaration flags
    #[inline]
    #[must_use]
    pub fn flags(&self) -> MethodFlags {
        self.flags
    }

    /// Executable body
    #[inline]
    #[must_use]
    pub fn body(&self) -> &MethodBody {
        &self.body
    }
}
