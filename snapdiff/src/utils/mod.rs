//! Utility modules for snapdiff.

pub mod errors;
pub mod logger;
pub mod privilege;

pub use errors::{ObjectError, Result, SnapError};
