//! In-memory description of one filesystem object.
//!
//! An [`Entry`] is produced either by the crawler (dump side) or by decoding
//! a stream record (restore side). Two on-disk forms exist: the snapshot
//! line ([`line`]) and the packed stream record ([`packed`]).

pub mod line;
pub mod packed;

use nix::libc::mode_t;
use nix::sys::stat::SFlag;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Separator between source and target of a link inside a combined name.
pub const LINK_DELIMITER: &[u8] = b" -> ";

/// Permission bits of a mode, including setuid/setgid/sticky.
pub const PERMISSION_MASK: u32 = 0o7777;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Kind {
    File,
    Directory,
    Symlink,
    Hardlink,
    Other,
}

/// Whether a stream record creates/updates or deletes its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Remove,
}

/// Second path carried by link entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// Literal symlink contents.
    Symbolic(PathBuf),
    /// Path of an object this entry shares an inode with.
    Hard(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Primary key in a snapshot set. Not assumed to be UTF-8.
    pub path: PathBuf,
    /// File type bits plus permission bits.
    pub mode: u32,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    /// Seconds since the Unix epoch.
    pub mtime: Option<i64>,
    pub ctime: Option<i64>,
    /// Byte length for regular files; for links, the byte length of `path`.
    pub size: u64,
    pub link: Option<Link>,
}

/// One record of a packed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub op: Op,
    pub entry: Entry,
}

impl Entry {
    /// Entry with only a path and a mode, the shape a snapshot line decodes to.
    pub fn new(path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            path: path.into(),
            mode,
            uid: None,
            gid: None,
            mtime: None,
            ctime: None,
            size: 0,
            link: None,
        }
    }

    pub fn symlink(path: impl Into<PathBuf>, target: impl Into<PathBuf>, permissions: u32) -> Self {
        let mut entry = Self::new(path, type_bits(SFlag::S_IFLNK) | (permissions & PERMISSION_MASK));
        entry.size = entry.path_bytes().len() as u64;
        entry.link = Some(Link::Symbolic(target.into()));
        entry
    }

    /// Hardlinks keep the mode of the regular file they point at.
    pub fn hardlink(path: impl Into<PathBuf>, target: impl Into<PathBuf>, mode: u32) -> Self {
        let mut entry = Self::new(path, mode);
        entry.size = entry.path_bytes().len() as u64;
        entry.link = Some(Link::Hard(target.into()));
        entry
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn kind(&self) -> Kind {
        if let Some(Link::Hard(_)) = self.link {
            return Kind::Hardlink;
        }
        let file_type = file_type(self.mode);
        if file_type == SFlag::S_IFDIR {
            Kind::Directory
        } else if file_type == SFlag::S_IFREG {
            Kind::File
        } else if file_type == SFlag::S_IFLNK {
            Kind::Symlink
        } else {
            Kind::Other
        }
    }

    pub fn permissions(&self) -> u32 {
        self.mode & PERMISSION_MASK
    }

    pub fn path_bytes(&self) -> &[u8] {
        self.path.as_os_str().as_bytes()
    }

    pub fn link_target(&self) -> Option<&Path> {
        match &self.link {
            Some(Link::Symbolic(target)) | Some(Link::Hard(target)) => Some(target),
            None => None,
        }
    }

    /// `source -> target` for links, the plain path otherwise.
    pub fn combined_name(&self) -> Vec<u8> {
        let mut name = self.path_bytes().to_vec();
        if let Some(target) = self.link_target() {
            name.extend_from_slice(LINK_DELIMITER);
            name.extend_from_slice(target.as_os_str().as_bytes());
        }
        name
    }

    /// True when the object changed after `since` (seconds since epoch).
    /// Objects without timestamps always count as changed.
    pub fn changed_since(&self, since: i64) -> bool {
        match (self.mtime, self.ctime) {
            (None, None) => true,
            (mtime, ctime) => mtime.max(ctime).unwrap_or(0) > since,
        }
    }
}

/// Type bits of `mode` as an `SFlag`.
pub fn file_type(mode: u32) -> SFlag {
    SFlag::from_bits_truncate((mode as mode_t) & SFlag::S_IFMT.bits())
}

pub fn type_bits(flag: SFlag) -> u32 {
    flag.bits() as u32
}

pub(crate) fn path_from_bytes(bytes: &[u8]) -> PathBuf {
    PathBuf::from(OsStr::from_bytes(bytes))
}
