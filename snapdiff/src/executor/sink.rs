//! Where removals and backups of a dump go.
//!
//! [`ListSink`] prints one `+`/`-` line per object. [`PackedSink`] writes
//! the packed record stream, file contents included, which
//! `snapdiff-up` replays.

use serde::Serialize;
use std::fs::File;
use std::io::Write;
use tracing::{debug, warn};

use crate::entry::line::{self, Delimiter};
use crate::entry::packed::PackedWriter;
use crate::entry::{Entry, Kind, Op, Record};
use crate::snapshot::DumpMode;
use crate::utils::errors::{ObjectError, Result};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub removals: usize,
    pub backups: usize,
    /// Backups left out because the object did not change since the
    /// previous dump.
    pub unchanged: usize,
    pub failed: usize,
    pub bytes: u64,
}

/// Consumer of the diff. Errors returned from here are fatal for the run;
/// trouble with a single object is counted in [`SinkStats`] instead.
pub trait ArchiveSink {
    /// Called once before the first record.
    fn begin(&mut self, _mode: DumpMode) -> Result<()> {
        Ok(())
    }

    fn remove(&mut self, entry: &Entry) -> Result<()>;

    /// `known` is true when the previous snapshot already held the path.
    fn backup(&mut self, entry: &Entry, known: bool) -> Result<()>;

    fn finish(&mut self) -> Result<()>;

    fn stats(&self) -> SinkStats;
}

/// Whether `entry` has to be emitted under `mode`. Paths the previous
/// snapshot did not hold, directories and links are always emitted;
/// everything else only when it changed after the previous dump.
pub fn needs_backup(entry: &Entry, known: bool, mode: DumpMode) -> bool {
    match mode {
        DumpMode::Full => true,
        DumpMode::Incremental { .. } if !known => true,
        DumpMode::Incremental { since } => match entry.kind() {
            Kind::Directory | Kind::Symlink | Kind::Hardlink => true,
            Kind::File | Kind::Other => entry.changed_since(since),
        },
    }
}

pub struct ListSink<W> {
    out: W,
    delimiter: Delimiter,
    mode: DumpMode,
    stats: SinkStats,
}

impl<W: Write> ListSink<W> {
    pub fn new(out: W, delimiter: Delimiter) -> Self {
        Self {
            out,
            delimiter,
            mode: DumpMode::Full,
            stats: SinkStats::default(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, sign: u8, entry: &Entry) -> Result<()> {
        self.out.write_all(&[sign])?;
        line::encode(entry, self.delimiter, &mut self.out)?;
        Ok(())
    }
}

impl<W: Write> ArchiveSink for ListSink<W> {
    fn begin(&mut self, mode: DumpMode) -> Result<()> {
        self.mode = mode;
        Ok(())
    }

    fn remove(&mut self, entry: &Entry) -> Result<()> {
        self.write_line(b'-', entry)?;
        self.stats.removals += 1;
        Ok(())
    }

    fn backup(&mut self, entry: &Entry, known: bool) -> Result<()> {
        if !needs_backup(entry, known, self.mode) {
            self.stats.unchanged += 1;
            return Ok(());
        }
        self.write_line(b'+', entry)?;
        self.stats.backups += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    fn stats(&self) -> SinkStats {
        self.stats
    }
}

pub struct PackedSink<W> {
    writer: PackedWriter<W>,
    mode: DumpMode,
    stats: SinkStats,
}

impl<W: Write> PackedSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: PackedWriter::new(out),
            mode: DumpMode::Full,
            stats: SinkStats::default(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_file(&mut self, entry: &Entry) -> Result<()> {
        let file = match File::open(&entry.path) {
            Ok(file) => file,
            Err(source) => {
                warn!(
                    "{}",
                    ObjectError::Read {
                        path: entry.path.clone(),
                        source,
                    }
                );
                self.stats.failed += 1;
                return Ok(());
            }
        };

        self.writer.write_record(&Record {
            op: Op::Add,
            entry: entry.clone(),
        })?;
        let copied = self.writer.write_content(file, entry.size)?;
        if copied < entry.size {
            warn!(
                "{} shrank to {} bytes while dumping, padded to {}",
                entry.path.display(),
                copied,
                entry.size
            );
        }
        self.stats.bytes += copied;
        Ok(())
    }
}

impl<W: Write> ArchiveSink for PackedSink<W> {
    fn begin(&mut self, mode: DumpMode) -> Result<()> {
        self.mode = mode;
        Ok(())
    }

    fn remove(&mut self, entry: &Entry) -> Result<()> {
        self.writer.write_record(&Record {
            op: Op::Remove,
            entry: entry.clone(),
        })?;
        self.stats.removals += 1;
        Ok(())
    }

    fn backup(&mut self, entry: &Entry, known: bool) -> Result<()> {
        if !needs_backup(entry, known, self.mode) {
            self.stats.unchanged += 1;
            return Ok(());
        }

        match entry.kind() {
            Kind::File => self.write_file(entry)?,
            kind => {
                debug!("Packing {:?} {}", kind, entry.path.display());
                self.writer.write_record(&Record {
                    op: Op::Add,
                    entry: entry.clone(),
                })?;
            }
        }
        self.stats.backups += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn stats(&self) -> SinkStats {
        self.stats
    }
}
