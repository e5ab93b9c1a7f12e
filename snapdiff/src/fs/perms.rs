//! Temporary write access to a directory.
//!
//! `chmod u+w dir && modify && chmod <old> dir`, with the restore tied to a
//! guard so it runs on every exit path.

use nix::sys::stat::Mode;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::entry::PERMISSION_MASK;

/// Grant the owner-write bit on `path` and return its original permission
/// bits. `None` means the path could not be stat-ed and nothing was changed.
///
/// Assumes the process owns `path`; group and other bits are left alone.
pub fn acquire(path: &Path) -> Option<u32> {
    let metadata = fs::metadata(path).ok()?;
    let saved = metadata.permissions().mode() & PERMISSION_MASK;
    let writable = saved | Mode::S_IWUSR.bits() as u32;

    if writable != saved {
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(writable)) {
            debug!("Could not make {} writable: {}", path.display(), e);
        }
    }
    Some(saved)
}

/// Put back the permission bits saved by [`acquire`].
pub fn release(path: &Path, saved: Option<u32>) {
    let Some(mode) = saved else {
        return;
    };
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        debug!("Could not restore mode {:o} on {}: {}", mode, path.display(), e);
    }
}

/// Syntactic parent, `path/..`.
pub fn parent_of(path: &Path) -> PathBuf {
    path.join("..")
}

/// Directory whose entries change when `path` is created or removed.
pub fn containing_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => parent_of(path),
    }
}

/// Holds write access on a directory until dropped.
#[derive(Debug)]
pub struct WritableScope {
    path: PathBuf,
    saved: Option<u32>,
}

impl WritableScope {
    pub fn enter(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let saved = acquire(&path);
        Self { path, saved }
    }

    /// Scope on the directory containing `path`.
    pub fn around(path: &Path) -> Self {
        Self::enter(containing_dir(path))
    }

    pub fn is_granted(&self) -> bool {
        self.saved.is_some()
    }
}

impl Drop for WritableScope {
    fn drop(&mut self) {
        release(&self.path, self.saved.take());
    }
}
