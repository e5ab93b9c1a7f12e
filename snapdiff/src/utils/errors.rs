//! Custom error types for snapdiff.

use std::path::PathBuf;
use thiserror::Error;

use crate::entry::packed::PackedError;

/// Run-level failures. Anything in here stops the current run.
#[derive(Error, Debug)]
pub enum SnapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("For safety reasons snapdiff will not run suid/sgid (uid {uid}/{euid}, gid {gid}/{egid})")]
    UnsafePrivileges {
        uid: u32,
        euid: u32,
        gid: u32,
        egid: u32,
    },

    #[error("Could not get current working directory: {0}")]
    WorkingDirectory(std::io::Error),

    #[error("Could not open snapshot {path}: {source}")]
    SnapshotOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not persist snapshot {path}: {source}")]
    SnapshotPersist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not record parent directory {path}: {source}")]
    Prepend {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed stream: {0}")]
    Stream(#[from] PackedError),
}

/// Failure to create, replace or remove a single filesystem object.
///
/// These are reported and counted; they never abort a run.
#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("Failed to create `{path}`: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove `{path}`: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Write failure `{path}`: {source}")]
    Copy {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create {kind} `{source_path} -> {target}`: {source}")]
    Link {
        kind: &'static str,
        source_path: PathBuf,
        target: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unsupported object type for `{0}`")]
    Unsupported(PathBuf),

    #[error("Refusing path outside the target directory: `{0}`")]
    UnsafePath(PathBuf),
}

pub type Result<T> = std::result::Result<T, SnapError>;
