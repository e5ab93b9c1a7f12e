//! Snapshot line codec: `<mode-as-decimal> <path>`.
//!
//! Only `mode` and `path` survive a round trip. Owner and timestamps are
//! dropped on purpose; decoded entries always have them unset.

use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use thiserror::Error;
use tracing::warn;

use super::{path_from_bytes, Entry};

/// Shortest line that can hold a mode digit, the separator and a path byte.
pub const MIN_LINE_LEN: usize = 3;

/// Record terminator of the snapshot file and of the dump list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    #[default]
    Newline,
    Nul,
}

impl Delimiter {
    pub fn from_null_flag(null: bool) -> Self {
        if null {
            Delimiter::Nul
        } else {
            Delimiter::Newline
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            Delimiter::Newline => b'\n',
            Delimiter::Nul => b'\0',
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LineError {
    #[error("line too short ({0} bytes)")]
    TooShort(usize),

    #[error("no separator between mode and path")]
    MissingSeparator,

    #[error("unreadable mode `{0}`")]
    BadMode(String),

    #[error("empty path")]
    EmptyPath,
}

/// Whether `entry` survives a round trip under `delimiter`, i.e. its path
/// does not contain the terminator byte.
pub fn fits(entry: &Entry, delimiter: Delimiter) -> bool {
    !entry.path_bytes().contains(&delimiter.byte())
}

/// Write one line, terminator included. A path containing the terminator is
/// written as is and will read back as two corrupt lines.
pub fn encode<W: Write>(entry: &Entry, delimiter: Delimiter, out: &mut W) -> io::Result<()> {
    if !fits(entry, delimiter) {
        warn!(
            "{:?} contains the record terminator and will not read back; use -0 for NUL-delimited records",
            entry.path
        );
    }
    write!(out, "{} ", entry.mode)?;
    out.write_all(entry.path.as_os_str().as_bytes())?;
    out.write_all(&[delimiter.byte()])
}

/// Decode one line with its terminator already stripped.
pub fn decode(line: &[u8]) -> Result<Entry, LineError> {
    if line.len() < MIN_LINE_LEN {
        return Err(LineError::TooShort(line.len()));
    }

    let space = line
        .iter()
        .position(|&b| b == b' ')
        .ok_or(LineError::MissingSeparator)?;
    let (mode, path) = (&line[..space], &line[space + 1..]);

    let mode = std::str::from_utf8(mode)
        .ok()
        .and_then(|m| m.parse::<u32>().ok())
        .filter(|&m| m != 0)
        .ok_or_else(|| LineError::BadMode(String::from_utf8_lossy(mode).into_owned()))?;

    if path.is_empty() {
        return Err(LineError::EmptyPath);
    }

    Ok(Entry::new(path_from_bytes(path), mode))
}
