//! livepatch patch engine
//!
//! Redirects running methods to their freshly compiled replacements and
//! keeps the table needed to undo that.
//!
//! # Overview
//!
//! - [`Redirector`]: the low-level capability (install, revert)
//! - [`DetourRedirector`]: default redirector over the program's detour table
//! - [`PatchEngine`]: at most one [`ActiveRedirection`] per original method,
//!   best-effort batches, atomic clear
//!
//! # Example
//!
//! ```rust
//! use livepatch_patch::{DetourRedirector, PatchEngine};
//! use livepatch_runtime::Program;
//! use std::sync::Arc;
//!
//! let program = Arc::new(Program::new());
//! let mut engine = PatchEngine::new(Box::new(DetourRedirector::new(program)));
//! engine.initialize().unwrap();
//!
//! let summary = engine.apply_patches(&[]).unwrap();
//! assert_eq!(summary.total(), 0);
//! engine.dispose();
//! ```

#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod redirector;

// Re-exports
pub use engine::{ActiveRedirection, PatchEngine, PatchSummary};
pub use error::{PatchError, RedirectError};
pub use redirector::{DetourRedirector, RedirectionHandle, Redirector};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
