//! livepatch session orchestrator
//!
//! Ties the change aggregator, compilation adapter, diff engine and patch
//! engine to a host's lifecycle. The host calls
//! [`HostLifecycle::on_session_entered`] when its monitored run starts,
//! [`HostLifecycle::on_tick`] once per frame, and
//! [`HostLifecycle::on_session_exiting`] when it stops.
//!
//! # Example
//!
//! ```rust,no_run
//! use livepatch_core::{HostLifecycle, LivePatchConfig, LivePatchSession, TickOutcome};
//! use livepatch_runtime::Program;
//! use std::sync::Arc;
//!
//! let program = Arc::new(Program::new());
//! let mut session = LivePatchSession::new(program, "/path/to/project", LivePatchConfig::default());
//! session.on_session_entered();
//!
//! if let TickOutcome::Cycle(report) = session.on_tick() {
//!     println!("{:?}", report.outcome);
//! }
//! session.on_session_exiting();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod health;
pub mod session;
pub mod state;

// Re-exports
pub use config::{ConfigError, ConfigSource, LivePatchConfig, SharedConfig};
pub use error::SessionError;
pub use health::{check_environment, HealthIssue, MAX_DEBOUNCE_MS};
pub use session::{
    CycleOutcome, CycleReport, HostLifecycle, LivePatchSession, StatusReport, TickOutcome,
};
pub use state::{allowed_transitions, validate_transition, SessionState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
