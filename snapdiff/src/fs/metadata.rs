//! Bridging `lstat` results and [`Entry`] values.

use std::fs::{self, Metadata};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;

use crate::entry::{Entry, Link};

/// Build an entry from the object at `path`, without following symlinks.
pub fn entry_from_path(path: &Path) -> std::io::Result<Entry> {
    let metadata = fs::symlink_metadata(path)?;
    entry_from_metadata(path, &metadata)
}

/// Build an entry from already fetched `lstat` data. Symlink targets are
/// read here; hardlink detection is the crawler's business.
pub fn entry_from_metadata(path: &Path, metadata: &Metadata) -> std::io::Result<Entry> {
    let mut entry = Entry::new(path, metadata.mode());
    entry.uid = Some(metadata.uid());
    entry.gid = Some(metadata.gid());
    entry.mtime = Some(metadata.mtime());
    entry.ctime = Some(metadata.ctime());

    if metadata.file_type().is_symlink() {
        entry.link = Some(Link::Symbolic(fs::read_link(path)?));
        entry.size = entry.path_bytes().len() as u64;
    } else if metadata.is_file() {
        entry.size = metadata.len();
    }

    Ok(entry)
}

/// Set the permission bits of `mode` on `path`.
pub fn apply_permissions(path: &Path, mode: u32) -> std::io::Result<()> {
    let perms = fs::Permissions::from_mode(mode & crate::entry::PERMISSION_MASK);
    fs::set_permissions(path, perms)
}
