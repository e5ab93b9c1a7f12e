//! snapdiff library
//!
//! Differential filesystem snapshots: a dump side that diffs a crawl
//! against the previous snapshot, and a restore side that replays a packed
//! record stream onto a directory tree.

pub mod config;
pub mod entry;
pub mod executor;
pub mod fs;
pub mod shutdown;
pub mod snapshot;
pub mod sync;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use entry::{Entry, Kind, Op, Record};
pub use snapshot::SnapshotSet;
pub use utils::errors::{ObjectError, Result, SnapError};
