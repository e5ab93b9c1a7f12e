//! Restore side: replaying a packed record stream onto a directory tree.

pub mod copy;
pub mod materialize;

pub use materialize::{DeferredLink, MaterializeOptions, MaterializeSummary, Materializer};
