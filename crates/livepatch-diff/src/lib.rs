//! livepatch diff engine
//!
//! Pairs each method of a freshly compiled module with the method it
//! replaces in the running program. Matching is nominal: declaring type full
//! name, method name and the ordered parameter type list must all be equal.
//!
//! # Overview
//!
//! - [`SymbolTable`]: matchable methods of the compiled module
//! - [`ProgramSnapshot`]: running methods keyed by [`MethodKey`]
//! - [`DiffEngine`]: the join; hits become [`MethodChange`]s, misses become
//!   [`UnmatchedMethod`]s
//!
//! Misses are expected (new helpers, new overloads) and never errors.

#![warn(missing_docs)]

pub mod engine;
pub mod generated;
pub mod key;
pub mod report;
pub mod snapshot;
pub mod table;

// Re-exports
pub use engine::DiffEngine;
pub use generated::{classify, is_matchable, GeneratedKind};
pub use key::MethodKey;
pub use report::{DiffReport, MethodChange, UnmatchedMethod, UnmatchedReason};
pub use snapshot::{ProgramSnapshot, RunningMethod, RunningType};
pub use table::{SymbolEntry, SymbolTable};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
