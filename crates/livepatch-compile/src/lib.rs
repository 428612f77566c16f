//! livepatch compilation adapter
//!
//! Turns a batch of changed source files into a new module loaded into the
//! running [`Program`](livepatch_runtime::Program), resolving references
//! against the modules already there.
//!
//! # Pipeline
//!
//! - **lexer**: `logos` tokenizer
//! - **parser**: recursive descent with recovery at `type` boundaries
//! - **compiler**: declares every type and signature in the batch, then type
//!   checks and lowers bodies to runtime IR
//! - **adapter**: reads files, picks references, loads the result as a
//!   `livepatch.hot.<n>` module
//!
//! A batch either compiles completely or not at all; failures leave the
//! program untouched and are reported as [`Diagnostic`]s.
//!
//! # Example
//!
//! ```rust
//! use livepatch_compile::{compile_sources, CompileOptions, SourceText};
//! use livepatch_runtime::Program;
//!
//! let program = Program::new();
//! let output = compile_sources(
//!     &program,
//!     &[],
//!     &[SourceText::new("math.src", "type Math { fn double(x: int) -> int { return x * 2; } }")],
//!     &CompileOptions::default(),
//! );
//! assert!(!output.has_errors());
//! assert_eq!(output.types[0].full_name(), "Math");
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod ast;
pub mod compiler;
pub mod diagnostic;
pub mod lexer;
pub mod options;
pub mod parser;
pub mod resolve;

mod lower;

// Re-exports
pub use adapter::{CompilationAdapter, CompiledModule, HOT_MODULE_PREFIX};
pub use compiler::{compile_sources, qualified_name, CompileOutput, SourceText};
pub use diagnostic::{codes, Diagnostic, Severity, SourceLocation};
pub use options::{CompileOptions, OptimizationLevel};
pub use parser::{parse, ParseError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
