//! livepatch runtime
//!
//! The running program that live patches are applied to.
//!
//! # Overview
//!
//! - **Program**: every loaded module, a method registry keyed by [`MethodHandle`],
//!   and the detour table consulted on every call
//! - **LoadedModule**: a named set of types with an origin (on disk, in memory,
//!   or produced by a hot reload)
//! - **MethodDef**: signature, flags and a body (interpreted IR or native Rust)
//! - **DetourTable**: priority-ordered redirections from an original method to a
//!   replacement; the only mechanism that changes what a handle executes
//!
//! # Example
//!
//! ```rust
//! use livepatch_runtime::{
//!     MethodBody, MethodDef, MethodFlags, MethodSignature, ModuleBuilder, ModuleOrigin,
//!     Program, TypeDef, Value,
//! };
//!
//! let program = Program::new();
//! let mut ty = TypeDef::new("Demo.Math");
//! ty.add_method(MethodDef::new(
//!     program.allocate_handle(),
//!     MethodSignature::new("Demo.Math", "double", vec!["int".into()], "int"),
//!     MethodFlags::default(),
//!     MethodBody::native(|args| Ok(Value::Int(args[0].as_int().unwrap_or(0) * 2))),
//! ));
//!
//! let mut module = ModuleBuilder::new("demo", ModuleOrigin::InMemory);
//! module.add_type(ty);
//! program.load_module(module).unwrap();
//!
//! let result = program.call_by_name("Demo.Math", "double", vec![Value::Int(21)]).unwrap();
//! assert_eq!(result, Value::Int(42));
//! ```

#![warn(missing_docs)]

pub mod detour;
pub mod error;
pub mod handle;
pub mod ir;
pub mod method;
pub mod module;
pub mod program;
pub mod value;

mod interp;

// Re-exports
pub use detour::{Detour, DetourId, DetourTable, Priority};
pub use error::RuntimeError;
pub use handle::{MethodHandle, ModuleId};
pub use ir::{BinaryOp, Body, Expr, Stmt, UnaryOp};
pub use method::{MethodBody, MethodDef, MethodFlags, MethodSignature, NativeFn};
pub use module::{LoadedModule, ModuleBuilder, ModuleOrigin, TypeDef};
pub use program::{Program, DEFAULT_MAX_CALL_DEPTH};
pub use value::{primitive, Value};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
