//! Dump executor - orchestrates one snapshot diff.
//!
//! The run order is fixed:
//! 1. dump mode from the snapshot's timestamp
//! 2. open (or create) the snapshot and load the previous set
//! 3. crawl every root into the current set
//! 4. emit removals, then every current entry as a backup
//! 5. persist the new snapshot
//!
//! Cancellation is polled per crawled object and per emitted record. An
//! interrupted crawl leaves the previous snapshot untouched. An interrupted
//! emission persists what was actually emitted.
//!
//! The persisted snapshot is stamped with the start of the run, so objects
//! changing while the run is in progress count as changed next time.

pub mod sink;

use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::entry::line::Delimiter;
use crate::fs::walker::{prepend_parents, CrawlStats, Crawler, WalkOptions};
use crate::snapshot::store::dump_mode_of;
use crate::snapshot::{DumpMode, LoadOutcome, SnapshotFile, SnapshotSet};
use crate::utils::errors::Result;

pub use sink::{ArchiveSink, ListSink, PackedSink, SinkStats};

/// Dump job configuration
#[derive(Debug, Clone)]
pub struct DumpJob {
    /// Snapshot file, created when missing.
    pub snapshot: PathBuf,
    /// Absolute roots to crawl.
    pub roots: Vec<PathBuf>,
    pub delimiter: Delimiter,
    pub walk: WalkOptions,
}

/// Dump execution result
#[derive(Debug, Clone, Serialize)]
pub struct DumpSummary {
    pub mode: DumpMode,
    /// Timestamp of the previous snapshot, local time.
    pub since: Option<String>,
    pub previous_entries: usize,
    pub corrupt_lines: usize,
    pub current_entries: usize,
    pub removals: usize,
    pub backups: usize,
    pub crawl: CrawlStats,
    pub sink: SinkStats,
    pub interrupted: bool,
    pub persisted: bool,
    pub duration_ms: u64,
}

pub struct DumpExecutor {
    job: DumpJob,
    cancel: CancellationToken,
}

impl DumpExecutor {
    pub fn new(job: DumpJob, cancel: CancellationToken) -> Self {
        Self { job, cancel }
    }

    pub fn execute<S: ArchiveSink + ?Sized>(&self, sink: &mut S) -> Result<DumpSummary> {
        let started = Instant::now();
        // Timestamps have one second granularity; step back so a change in
        // the starting second is still newer than the stamp.
        let as_of = SystemTime::now() - Duration::from_secs(1);

        let mode = dump_mode_of(&self.job.snapshot);
        let since = mode.since_local().map(|since| since.to_rfc3339());
        match &since {
            Some(since) => info!("Incremental dump, previous snapshot from {}", since),
            None => info!("Full dump"),
        }

        let snapshot = SnapshotFile::open(&self.job.snapshot, self.job.delimiter)?;
        let LoadOutcome {
            set: previous,
            corrupt,
        } = snapshot.load()?;
        if corrupt > 0 {
            warn!(
                "Skipped {} corrupt entries in {}",
                corrupt,
                snapshot.path().display()
            );
        }

        let mut summary = DumpSummary {
            mode,
            since,
            previous_entries: previous.len(),
            corrupt_lines: corrupt,
            current_entries: 0,
            removals: 0,
            backups: 0,
            crawl: CrawlStats::default(),
            sink: SinkStats::default(),
            interrupted: false,
            persisted: false,
            duration_ms: 0,
        };

        let mut current = SnapshotSet::new();
        let mut crawler = Crawler::new(self.job.walk.clone());
        for root in &self.job.roots {
            info!("Crawling {}", root.display());
            prepend_parents(&mut current, root)?;
            if !crawler.crawl(&mut current, root, &self.cancel) {
                summary.interrupted = true;
                break;
            }
        }
        summary.crawl = crawler.stats();
        summary.current_entries = current.len();

        if summary.interrupted {
            warn!("Interrupted while crawling, previous snapshot left untouched");
            summary.duration_ms = elapsed_ms(started);
            return Ok(summary);
        }

        let removals = previous.subtract(&current);
        info!(
            "{} entries, {} removed since the previous snapshot",
            current.len(),
            removals.len()
        );

        sink.begin(mode)?;
        let mut completed = previous;

        for entry in &removals {
            if self.cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }
            sink.remove(entry)?;
            completed.remove(&entry.path);
            summary.removals += 1;
        }

        if !summary.interrupted {
            for entry in &current {
                if self.cancel.is_cancelled() {
                    summary.interrupted = true;
                    break;
                }
                // Removals are absent from `current`, so this is exactly
                // membership in the previous snapshot.
                let known = completed.contains(&entry.path);
                sink.backup(entry, known)?;
                completed.insert(entry.clone());
                summary.backups += 1;
            }
        }

        sink.finish()?;
        summary.sink = sink.stats();

        if summary.interrupted {
            warn!(
                "Interrupted after {} removals and {} backups, persisting what was emitted",
                summary.removals, summary.backups
            );
            snapshot.persist_as_of(&completed, as_of)?;
        } else {
            snapshot.persist_as_of(&current, as_of)?;
        }
        summary.persisted = true;
        summary.duration_ms = elapsed_ms(started);

        info!(
            "Dump finished: {} removals, {} backups in {}ms",
            summary.removals, summary.backups, summary.duration_ms
        );
        Ok(summary)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Make `path` absolute against `cwd` and drop `.` and `..` components
/// lexically. Symlinks in the path are not resolved.
pub fn resolve_root(cwd: &Path, path: &Path) -> PathBuf {
    let joined = cwd.join(path);
    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}
