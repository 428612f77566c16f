//! livepatch change aggregator
//!
//! Watches a source tree, filters events by include/exclude prefixes and
//! source extension, and coalesces bursts of edits into one [`ChangeBatch`]
//! once the tree has been quiet for the debounce interval.
//!
//! # Example
//!
//! ```rust,no_run
//! use livepatch_watch::{ChangeAggregator, PathFilter, DEFAULT_DEBOUNCE};
//!
//! let mut aggregator = ChangeAggregator::new(PathFilter::default(), DEFAULT_DEBOUNCE);
//! aggregator.start_watching("/path/to/project");
//!
//! // once per host tick
//! if let Some(batch) = aggregator.poll() {
//!     for path in batch.paths() {
//!         println!("changed: {}", path.display());
//!     }
//! }
//! ```

#![warn(missing_docs)]

pub mod aggregator;
pub mod backend;
pub mod batch;
pub mod clock;
pub mod error;
pub mod filter;
pub mod sink;

pub use aggregator::{ChangeAggregator, WatchState, DEFAULT_DEBOUNCE};
pub use backend::{NotifyBackend, WatchBackend};
pub use batch::ChangeBatch;
pub use clock::{Clock, SystemClock};
pub use error::WatchError;
pub use filter::PathFilter;
pub use sink::EventSink;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
