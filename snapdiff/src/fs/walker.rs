//! Directory traversal feeding the current snapshot set.
//!
//! Every object beneath a root becomes one [`Entry`], the root included.
//! Symlinks are recorded, never followed. Objects sharing an inode with one
//! seen earlier in the run are recorded as hardlinks to that first path.

use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, Metadata};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::metadata::{entry_from_metadata, entry_from_path};
use crate::entry::Entry;
use crate::snapshot::SnapshotSet;
use crate::utils::errors::{Result, SnapError};

pub const DEFAULT_MARKER: &str = ".nobackup";

/// Options for directory walking
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Do not cross filesystem boundaries
    pub one_file_system: bool,

    /// Skip the contents of directories holding `marker`
    pub honor_marker: bool,

    /// Name of the exclusion marker file
    pub marker: String,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            one_file_system: false,
            honor_marker: true,
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}

/// Counters of one or more crawls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub entries: usize,
    pub hardlinks: usize,
    pub excluded_dirs: usize,
    pub errors: usize,
}

/// Walks roots into a [`SnapshotSet`]. Hardlink tracking spans every root
/// crawled by the same instance.
pub struct Crawler {
    options: WalkOptions,
    inodes: HashMap<(u64, u64), PathBuf>,
    stats: CrawlStats,
}

impl Crawler {
    pub fn new(options: WalkOptions) -> Self {
        Self {
            options,
            inodes: HashMap::new(),
            stats: CrawlStats::default(),
        }
    }

    pub fn stats(&self) -> CrawlStats {
        self.stats
    }

    /// Add every object beneath `root` to `set`.
    ///
    /// Unreadable objects are logged and skipped. Returns `false` when the
    /// walk stopped early because `cancel` fired.
    pub fn crawl(&mut self, set: &mut SnapshotSet, root: &Path, cancel: &CancellationToken) -> bool {
        let mut walker = WalkDir::new(root)
            .follow_links(false)
            .same_file_system(self.options.one_file_system)
            .sort_by_file_name()
            .into_iter();

        while let Some(next) = walker.next() {
            if cancel.is_cancelled() {
                info!("Crawl of {} interrupted", root.display());
                return false;
            }

            let dir_entry = match next {
                Ok(dir_entry) => dir_entry,
                Err(e) => {
                    warn!("Skipping unreadable object: {}", e);
                    self.stats.errors += 1;
                    continue;
                }
            };
            let path = dir_entry.path();

            let metadata = match dir_entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Could not stat {}: {}", path.display(), e);
                    self.stats.errors += 1;
                    continue;
                }
            };

            match self.describe(path, &metadata) {
                Ok(entry) => {
                    set.insert(entry);
                    self.stats.entries += 1;
                }
                Err(e) => {
                    warn!("Could not read {}: {}", path.display(), e);
                    self.stats.errors += 1;
                    continue;
                }
            }

            if metadata.is_dir() && self.is_excluded(path) {
                debug!("{} holds {}, not descending", path.display(), self.options.marker);
                self.stats.excluded_dirs += 1;
                walker.skip_current_dir();
            }
        }

        true
    }

    fn describe(&mut self, path: &Path, metadata: &Metadata) -> std::io::Result<Entry> {
        let mut entry = entry_from_metadata(path, metadata)?;

        if !metadata.is_dir() && metadata.nlink() > 1 {
            let key = (metadata.dev(), metadata.ino());
            match self.inodes.get(&key) {
                Some(first) => {
                    let mut link = Entry::hardlink(path, first.clone(), metadata.mode());
                    link.uid = entry.uid;
                    link.gid = entry.gid;
                    link.mtime = entry.mtime;
                    link.ctime = entry.ctime;
                    entry = link;
                    self.stats.hardlinks += 1;
                }
                None => {
                    self.inodes.insert(key, path.to_path_buf());
                }
            }
        }

        Ok(entry)
    }

    fn is_excluded(&self, dir: &Path) -> bool {
        self.options.honor_marker && fs::symlink_metadata(dir.join(&self.options.marker)).is_ok()
    }
}

/// Record every ancestor directory of `root` (except `/`), so the path
/// leading to a root does not show up as new or removed between runs.
pub fn prepend_parents(set: &mut SnapshotSet, root: &Path) -> Result<()> {
    for ancestor in root.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() || ancestor == Path::new("/") {
            continue;
        }
        let entry = entry_from_path(ancestor).map_err(|source| SnapError::Prepend {
            path: ancestor.to_path_buf(),
            source,
        })?;
        set.insert(entry);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Kind, Link};
    use tempfile::TempDir;

    fn crawl(root: &Path, options: WalkOptions) -> (SnapshotSet, CrawlStats) {
        let mut set = SnapshotSet::new();
        let mut crawler = Crawler::new(options);
        assert!(crawler.crawl(&mut set, root, &CancellationToken::new()));
        (set, crawler.stats())
    }

    #[test]
    fn test_crawl_records_root_and_children() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir(root.join("subdir"))?;
        fs::write(root.join("file1.txt"), b"content1")?;
        fs::write(root.join("subdir/file2.txt"), b"content2")?;
        std::os::unix::fs::symlink("file1.txt", root.join("link"))?;

        let (set, stats) = crawl(root, WalkOptions::default());

        assert_eq!(set.len(), 5);
        assert_eq!(stats.entries, 5);
        assert_eq!(set.get(root).unwrap().kind(), Kind::Directory);
        assert_eq!(set.get(&root.join("subdir/file2.txt")).unwrap().size, 8);
        assert_eq!(
            set.get(&root.join("link")).unwrap().link,
            Some(Link::Symbolic("file1.txt".into()))
        );
        Ok(())
    }

    #[test]
    fn test_marker_excludes_contents() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::create_dir(root.join("cache"))?;
        fs::write(root.join("cache/.nobackup"), b"")?;
        fs::write(root.join("cache/blob"), b"x")?;
        fs::write(root.join("keep.txt"), b"keep")?;

        let (set, stats) = crawl(root, WalkOptions::default());
        assert!(set.contains(&root.join("cache")));
        assert!(!set.contains(&root.join("cache/blob")));
        assert!(!set.contains(&root.join("cache/.nobackup")));
        assert!(set.contains(&root.join("keep.txt")));
        assert_eq!(stats.excluded_dirs, 1);

        let options = WalkOptions {
            honor_marker: false,
            ..WalkOptions::default()
        };
        let (set, _) = crawl(root, options);
        assert!(set.contains(&root.join("cache/blob")));
        Ok(())
    }

    #[test]
    fn test_hardlinks_point_at_first_path() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        fs::write(root.join("a"), b"shared")?;
        fs::hard_link(root.join("a"), root.join("b"))?;

        let (set, stats) = crawl(root, WalkOptions::default());

        assert_eq!(stats.hardlinks, 1);
        assert_eq!(set.get(&root.join("a")).unwrap().kind(), Kind::File);
        let b = set.get(&root.join("b")).unwrap();
        assert_eq!(b.kind(), Kind::Hardlink);
        assert_eq!(b.link, Some(Link::Hard(root.join("a"))));
        Ok(())
    }

    #[test]
    fn test_cancelled_crawl_stops() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("file"), b"x")?;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut set = SnapshotSet::new();
        let mut crawler = Crawler::new(WalkOptions::default());
        assert!(!crawler.crawl(&mut set, temp_dir.path(), &cancel));
        assert!(set.is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_root_is_not_fatal() {
        let mut set = SnapshotSet::new();
        let mut crawler = Crawler::new(WalkOptions::default());
        assert!(crawler.crawl(&mut set, Path::new("/nonexistent/snapdiff"), &CancellationToken::new()));
        assert!(set.is_empty());
        assert_eq!(crawler.stats().errors, 1);
    }

    #[test]
    fn test_prepend_parents() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("a/b");
        fs::create_dir_all(&root)?;

        let mut set = SnapshotSet::new();
        prepend_parents(&mut set, &root)?;

        assert!(set.contains(&temp_dir.path().join("a")));
        assert!(set.contains(temp_dir.path()));
        assert!(!set.contains(&root));
        assert!(!set.contains(Path::new("/")));
        assert!(set.iter().all(|e| e.kind() == Kind::Directory));
        Ok(())
    }
}
