//! Loading and persisting the snapshot file.
//!
//! The file is a sequence of `<mode> <path>` lines, newline or NUL
//! terminated. Corrupt lines are skipped with a diagnostic; they never fail
//! a load. Persisting goes through a temporary file and a rename, so an
//! interrupted write leaves the previous snapshot intact.

use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use super::SnapshotSet;
use crate::entry::line::{self, Delimiter};
use crate::utils::errors::{Result, SnapError};

/// Full when there is no usable previous snapshot, incremental otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DumpMode {
    Full,
    Incremental {
        /// Modification time of the previous snapshot, seconds since epoch.
        since: i64,
    },
}

impl DumpMode {
    pub fn since(&self) -> Option<i64> {
        match self {
            DumpMode::Full => None,
            DumpMode::Incremental { since } => Some(*since),
        }
    }

    pub fn since_local(&self) -> Option<DateTime<Local>> {
        self.since()
            .and_then(|since| Local.timestamp_opt(since, 0).single())
    }

    pub fn label(&self) -> &'static str {
        match self {
            DumpMode::Full => "full",
            DumpMode::Incremental { .. } => "incremental",
        }
    }
}

/// Result of decoding a snapshot stream.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub set: SnapshotSet,
    /// Lines skipped as corrupt.
    pub corrupt: usize,
}

/// Decode snapshot lines from `reader`.
pub fn load<R: BufRead>(reader: R, delimiter: Delimiter) -> io::Result<LoadOutcome> {
    let mut outcome = LoadOutcome::default();

    for line in reader.split(delimiter.byte()) {
        let line = line?;
        match line::decode(&line) {
            Ok(entry) => {
                outcome.set.insert(entry);
            }
            Err(e) => {
                warn!(
                    "Corrupt entry in snapshot, skipping ({}): {:?}",
                    e,
                    String::from_utf8_lossy(&line)
                );
                outcome.corrupt += 1;
            }
        }
    }

    Ok(outcome)
}

/// Write one line per entry, in set order.
pub fn persist<W: Write>(set: &SnapshotSet, writer: &mut W, delimiter: Delimiter) -> io::Result<()> {
    for entry in set {
        line::encode(entry, delimiter, writer)?;
    }
    writer.flush()
}

/// Determine the dump mode from the snapshot's `lstat` data.
pub fn dump_mode_of(path: &Path) -> DumpMode {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.len() > 0 && metadata.mtime() > 0 => DumpMode::Incremental {
            since: metadata.mtime(),
        },
        Ok(_) => DumpMode::Full,
        Err(e) => {
            debug!("No usable snapshot at {}: {}", path.display(), e);
            DumpMode::Full
        }
    }
}

/// The snapshot file of one dump.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    delimiter: Delimiter,
}

impl SnapshotFile {
    /// Open `path`, creating it when missing. Existing contents are left
    /// untouched; failure to open is fatal for the run.
    pub fn open(path: impl Into<PathBuf>, delimiter: Delimiter) -> Result<Self> {
        let path = path.into();
        OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| SnapError::SnapshotOpen {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path, delimiter })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    pub fn dump_mode(&self) -> DumpMode {
        dump_mode_of(&self.path)
    }

    pub fn load(&self) -> Result<LoadOutcome> {
        let file = File::open(&self.path).map_err(|source| SnapError::SnapshotOpen {
            path: self.path.clone(),
            source,
        })?;
        Ok(load(BufReader::new(file), self.delimiter)?)
    }

    /// Replace the snapshot with `set` atomically, keeping the old file's
    /// permission bits.
    pub fn persist(&self, set: &SnapshotSet) -> Result<()> {
        self.write_atomically(set, None)
            .map_err(|source| SnapError::SnapshotPersist {
                path: self.path.clone(),
                source,
            })
    }

    /// Like [`SnapshotFile::persist`], with the file's mtime set to
    /// `as_of`. The next run treats objects changed after `as_of` as
    /// changed, so it should be taken before the crawl.
    pub fn persist_as_of(&self, set: &SnapshotSet, as_of: SystemTime) -> Result<()> {
        self.write_atomically(set, Some(as_of))
            .map_err(|source| SnapError::SnapshotPersist {
                path: self.path.clone(),
                source,
            })
    }

    fn write_atomically(&self, set: &SnapshotSet, as_of: Option<SystemTime>) -> io::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;

        if let Ok(metadata) = fs::metadata(&self.path) {
            temp.as_file().set_permissions(metadata.permissions())?;
        }

        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            persist(set, &mut writer, self.delimiter)?;
        }
        if let Some(as_of) = as_of {
            temp.as_file().set_modified(as_of)?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| e.error)?;

        debug!("Persisted {} entries to {}", set.len(), self.path.display());
        Ok(())
    }
}
