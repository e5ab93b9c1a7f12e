//! Rebuilding a tree from a packed record stream.
//!
//! Records are applied in stream order, each one under a [`WritableScope`]
//! on the directory it touches. Hardlinks are collected during the first
//! pass and created once the stream is exhausted, because the object a
//! link points at may only show up later in the stream.
//!
//! Failures on a single object are logged and counted. Only a broken
//! stream stops the run, since record alignment cannot be recovered.

use serde::Serialize;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{self, BufRead, Read};
use std::os::unix::fs::{symlink, DirBuilderExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::copy::{copy_exact, drain, CopyError, DEFAULT_BUFFER_SIZE};
use crate::entry::packed::{carries_content, PackedError, PackedReader};
use crate::entry::{Entry, Kind, Link, Op, Record};
use crate::fs::metadata::apply_permissions;
use crate::fs::perms::WritableScope;
use crate::utils::errors::{ObjectError, Result, SnapError};

#[derive(Debug, Clone)]
pub struct MaterializeOptions {
    /// Directory every record path is rebased under.
    pub root: PathBuf,
    /// Decode and log records without touching the filesystem.
    pub dry_run: bool,
    /// Chunk size for file content copies.
    pub buffer_size: usize,
}

impl MaterializeOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dry_run: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

/// Counters of one materialization run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializeSummary {
    pub records: usize,
    pub created: usize,
    /// Existing directories whose permissions were refreshed.
    pub updated: usize,
    pub removed: usize,
    /// Records of object types that cannot be materialized.
    pub skipped: usize,
    pub failed: usize,
    /// Records only logged because of a dry run.
    pub planned: usize,
    pub bytes_written: u64,
    pub links_deferred: usize,
    pub links_created: usize,
    pub links_failed: usize,
    pub interrupted: bool,
}

impl MaterializeSummary {
    /// Failures of any kind, links included.
    pub fn failures(&self) -> usize {
        self.failed + self.links_failed
    }
}

/// A hard link waiting for the second pass. Both paths are already rebased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredLink {
    pub source: PathBuf,
    pub target: PathBuf,
}

enum Outcome {
    Created(u64),
    Updated,
    Removed,
    Deferred,
    Skipped,
    Planned,
}

/// Per-record failure: either the object is abandoned, or the stream
/// itself broke.
enum ApplyError {
    Object(ObjectError),
    Stream(PackedError),
}

impl From<ObjectError> for ApplyError {
    fn from(e: ObjectError) -> Self {
        ApplyError::Object(e)
    }
}

impl From<CopyError> for ApplyError {
    fn from(e: CopyError) -> Self {
        match e {
            CopyError::Read(e) => ApplyError::Stream(stream_error(e)),
            CopyError::Write(e) => ApplyError::Stream(PackedError::Io(e)),
        }
    }
}

fn stream_error(e: io::Error) -> PackedError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => PackedError::Truncated("content"),
        _ => PackedError::Io(e),
    }
}

pub struct Materializer {
    options: MaterializeOptions,
    deferred: Vec<DeferredLink>,
    summary: MaterializeSummary,
}

impl Materializer {
    pub fn new(options: MaterializeOptions) -> Self {
        Self {
            options,
            deferred: Vec::new(),
            summary: MaterializeSummary::default(),
        }
    }

    /// Apply every record of `input`, then resolve the deferred hardlinks.
    ///
    /// When `cancel` fires the remaining records are left unread, but links
    /// collected so far are still created.
    pub fn run<R: BufRead>(mut self, input: R, cancel: &CancellationToken) -> Result<MaterializeSummary> {
        let mut reader = PackedReader::new(input);

        let failure = loop {
            if cancel.is_cancelled() {
                info!("Materialization interrupted after {} records", self.summary.records);
                self.summary.interrupted = true;
                break None;
            }

            let record = match reader.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break None,
                Err(e) => break Some(e),
            };
            self.summary.records += 1;

            match self.apply(record, reader.content()) {
                Ok(outcome) => self.count(outcome),
                Err(ApplyError::Object(e)) => {
                    warn!("{}", e);
                    self.summary.failed += 1;
                }
                Err(ApplyError::Stream(e)) => break Some(e),
            }
        };

        self.resolve_hardlinks();

        match failure {
            Some(e) => Err(SnapError::Stream(e)),
            None => Ok(self.summary),
        }
    }

    fn count(&mut self, outcome: Outcome) {
        let summary = &mut self.summary;
        match outcome {
            Outcome::Created(bytes) => {
                summary.created += 1;
                summary.bytes_written += bytes;
            }
            Outcome::Updated => summary.updated += 1,
            Outcome::Removed => summary.removed += 1,
            Outcome::Deferred => summary.links_deferred += 1,
            Outcome::Skipped => summary.skipped += 1,
            Outcome::Planned => summary.planned += 1,
        }
    }

    fn apply<R: Read>(&mut self, record: Record, content: &mut R) -> std::result::Result<Outcome, ApplyError> {
        let with_content = carries_content(&record);
        let Record { op, entry } = record;

        // Only a directory record may address the target root itself, to
        // update its mode. Anything else would replace or remove the root.
        let rebased = self.rebase(&entry.path).and_then(|path| {
            if path == self.options.root && !(op == Op::Add && entry.kind() == Kind::Directory) {
                Err(ObjectError::UnsafePath(entry.path.clone()))
            } else {
                Ok(path)
            }
        });
        let path = match rebased {
            Ok(path) => path,
            Err(e) => {
                if with_content {
                    drain(content, entry.size)?;
                }
                return Err(e.into());
            }
        };

        if self.options.dry_run {
            info!("{} {:?} {}", op_label(op), entry.kind(), path.display());
            if with_content {
                drain(content, entry.size)?;
            }
            return Ok(Outcome::Planned);
        }

        match (op, entry.kind()) {
            (Op::Remove, _) => Ok(remove_object(&path)?),
            (Op::Add, Kind::Directory) => Ok(make_dir(&path, entry.mode)?),
            (Op::Add, Kind::Symlink) => match &entry.link {
                Some(Link::Symbolic(target)) => Ok(make_symlink(&path, target)?),
                _ => Err(ObjectError::Unsupported(path).into()),
            },
            (Op::Add, Kind::Hardlink) => {
                let target = entry.link_target().map(|t| self.rebase(t));
                match target {
                    Some(Ok(target)) => {
                        debug!("Deferring link {} -> {}", path.display(), target.display());
                        self.deferred.push(DeferredLink { source: path, target });
                        Ok(Outcome::Deferred)
                    }
                    Some(Err(e)) => Err(e.into()),
                    None => Err(ObjectError::Unsupported(path).into()),
                }
            }
            (Op::Add, Kind::File) => self.make_file(&path, &entry, content),
            (Op::Add, Kind::Other) => {
                warn!("Skipping {}: unsupported object type {:o}", path.display(), entry.mode);
                Ok(Outcome::Skipped)
            }
        }
    }

    /// `root` joined with `path` made relative. Paths climbing out through
    /// `..` are refused.
    fn rebase(&self, path: &Path) -> std::result::Result<PathBuf, ObjectError> {
        let mut rebased = self.options.root.clone();
        for component in path.components() {
            match component {
                Component::Normal(part) => rebased.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(ObjectError::UnsafePath(path.to_path_buf()));
                }
            }
        }
        Ok(rebased)
    }

    fn make_file<R: Read>(&self, path: &Path, entry: &Entry, content: &mut R) -> std::result::Result<Outcome, ApplyError> {
        if exists(path) {
            if let Err(e) = remove_object(path) {
                drain(content, entry.size)?;
                return Err(e.into());
            }
        }

        let opened = {
            let _scope = WritableScope::around(path);
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(entry.permissions())
                .open(path)
        };
        let mut file = match opened {
            Ok(file) => file,
            Err(source) => {
                drain(content, entry.size)?;
                return Err(ObjectError::Create {
                    path: path.to_path_buf(),
                    source,
                }
                .into());
            }
        };

        // The umask may have stripped bits at open time.
        if let Err(e) = apply_permissions(path, entry.mode) {
            debug!("Could not set mode on {}: {}", path.display(), e);
        }

        match copy_exact(content, &mut file, entry.size, self.options.buffer_size) {
            Ok(written) => Ok(Outcome::Created(written)),
            Err(CopyError::Write(source)) => Err(ObjectError::Copy {
                path: path.to_path_buf(),
                source,
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_hardlinks(&mut self) {
        if self.deferred.is_empty() {
            return;
        }
        info!("Creating {} deferred hardlinks", self.deferred.len());

        for link in std::mem::take(&mut self.deferred) {
            match make_hardlink(&link) {
                Ok(()) => self.summary.links_created += 1,
                Err(e) => {
                    warn!("{}", e);
                    self.summary.links_failed += 1;
                }
            }
        }
    }
}

fn op_label(op: Op) -> &'static str {
    match op {
        Op::Add => "add",
        Op::Remove => "remove",
    }
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Delete whatever is at `path`, directories recursively. A missing path
/// counts as removed.
fn remove_object(path: &Path) -> std::result::Result<Outcome, ObjectError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{} already absent", path.display());
            return Ok(Outcome::Removed);
        }
        Err(source) => {
            return Err(ObjectError::Remove {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let _scope = WritableScope::around(path);
    let result = if metadata.is_dir() {
        let _inner = WritableScope::enter(path);
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|source| ObjectError::Remove {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Outcome::Removed)
}

fn make_dir(path: &Path, mode: u32) -> std::result::Result<Outcome, ObjectError> {
    let create_error = |source| ObjectError::Create {
        path: path.to_path_buf(),
        source,
    };

    if fs::symlink_metadata(path).map(|m| m.is_dir()).unwrap_or(false) {
        apply_permissions(path, mode).map_err(create_error)?;
        return Ok(Outcome::Updated);
    }

    let _scope = WritableScope::around(path);
    DirBuilder::new()
        .mode(mode & crate::entry::PERMISSION_MASK)
        .create(path)
        .map_err(create_error)?;
    apply_permissions(path, mode).map_err(create_error)?;
    Ok(Outcome::Created(0))
}

fn make_symlink(path: &Path, target: &Path) -> std::result::Result<Outcome, ObjectError> {
    if exists(path) {
        remove_object(path)?;
    }

    let _scope = WritableScope::around(path);
    symlink(target, path).map_err(|source| ObjectError::Link {
        kind: "symlink",
        source_path: path.to_path_buf(),
        target: target.to_path_buf(),
        source,
    })?;
    Ok(Outcome::Created(0))
}

fn make_hardlink(link: &DeferredLink) -> std::result::Result<(), ObjectError> {
    if exists(&link.source) {
        remove_object(&link.source)?;
    }

    let _scope = WritableScope::around(&link.source);
    fs::hard_link(&link.target, &link.source).map_err(|source| ObjectError::Link {
        kind: "hardlink",
        source_path: link.source.clone(),
        target: link.target.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::packed::PackedWriter;
    use std::io::Cursor;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use tempfile::TempDir;

    fn add(entry: Entry) -> Record {
        Record { op: Op::Add, entry }
    }

    fn remove(entry: Entry) -> Record {
        Record { op: Op::Remove, entry }
    }

    fn file(path: &str, content: &[u8]) -> (Record, Option<Vec<u8>>) {
        let entry = Entry::new(path, 0o100644).with_size(content.len() as u64);
        (add(entry), Some(content.to_vec()))
    }

    fn dir(path: &str, mode: u32) -> (Record, Option<Vec<u8>>) {
        (add(Entry::new(path, 0o040000 | mode)), None)
    }

    fn stream(records: Vec<(Record, Option<Vec<u8>>)>) -> Cursor<Vec<u8>> {
        let mut writer = PackedWriter::new(Vec::new());
        for (record, content) in records {
            writer.write_record(&record).unwrap();
            if let Some(content) = content {
                writer
                    .write_content(content.as_slice(), record.entry.size)
                    .unwrap();
            }
        }
        Cursor::new(writer.into_inner())
    }

    fn run(root: &Path, input: Cursor<Vec<u8>>) -> Result<MaterializeSummary> {
        Materializer::new(MaterializeOptions::new(root)).run(input, &CancellationToken::new())
    }

    #[test]
    fn test_add_then_remove_leaves_nothing() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let input = stream(vec![
            dir("/t", 0o755),
            file("/t/f", b"hello"),
            (remove(Entry::new("/t/f", 0o100644)), None),
        ]);

        let summary = run(temp_dir.path(), input)?;

        assert!(!temp_dir.path().join("t/f").exists());
        assert!(temp_dir.path().join("t").is_dir());
        assert_eq!(summary.records, 3);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.bytes_written, 5);
        assert_eq!(summary.failures(), 0);
        Ok(())
    }

    #[test]
    fn test_file_content_and_mode() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let mut options = MaterializeOptions::new(temp_dir.path());
        options.buffer_size = 3;

        let entry = Entry::new("/script.sh", 0o100750).with_size(11);
        let input = stream(vec![(add(entry), Some(b"echo hello\n".to_vec()))]);
        Materializer::new(options).run(input, &CancellationToken::new())?;

        let path = temp_dir.path().join("script.sh");
        assert_eq!(fs::read(&path)?, b"echo hello\n");
        assert_eq!(fs::metadata(&path)?.permissions().mode() & 0o7777, 0o750);
        Ok(())
    }

    #[test]
    fn test_hardlink_before_its_target() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let input = stream(vec![
            dir("/t", 0o755),
            (add(Entry::hardlink("/t/link", "/t/file", 0o100644)), None),
            file("/t/file", b"shared"),
        ]);

        let summary = run(temp_dir.path(), input)?;

        let link = fs::metadata(temp_dir.path().join("t/link"))?;
        let file = fs::metadata(temp_dir.path().join("t/file"))?;
        assert_eq!(link.ino(), file.ino());
        assert_eq!(summary.links_deferred, 1);
        assert_eq!(summary.links_created, 1);
        Ok(())
    }

    #[test]
    fn test_hardlink_replaces_existing_source() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("b"), b"stale")?;

        let input = stream(vec![
            file("/a", b"fresh"),
            (add(Entry::hardlink("/b", "/a", 0o100644)), None),
        ]);
        run(temp_dir.path(), input)?;

        assert_eq!(fs::read(temp_dir.path().join("b"))?, b"fresh");
        Ok(())
    }

    #[test]
    fn test_failed_link_does_not_stop_others() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let input = stream(vec![
            file("/present", b"x"),
            (add(Entry::hardlink("/l1", "/missing", 0o100644)), None),
            (add(Entry::hardlink("/l2", "/present", 0o100644)), None),
        ]);

        let summary = run(temp_dir.path(), input)?;
        assert_eq!(summary.links_failed, 1);
        assert_eq!(summary.links_created, 1);
        assert!(temp_dir.path().join("l2").exists());
        Ok(())
    }

    #[test]
    fn test_symlink_target_kept_literal() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("my link"), b"in the way")?;

        let input = stream(vec![(
            add(Entry::symlink("/my link", "/etc/some target", 0o777)),
            None,
        )]);
        run(temp_dir.path(), input)?;

        let target = fs::read_link(temp_dir.path().join("my link"))?;
        assert_eq!(target, PathBuf::from("/etc/some target"));
        Ok(())
    }

    #[test]
    fn test_existing_directory_gets_new_mode() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let existing = temp_dir.path().join("d");
        fs::create_dir(&existing)?;
        fs::write(existing.join("keep"), b"k")?;

        let summary = run(temp_dir.path(), stream(vec![dir("/d", 0o700)]))?;

        assert_eq!(summary.updated, 1);
        assert!(existing.join("keep").exists());
        assert_eq!(fs::metadata(&existing)?.permissions().mode() & 0o777, 0o700);
        Ok(())
    }

    #[test]
    fn test_read_only_directory_is_filled_and_restored() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let input = stream(vec![dir("/ro", 0o555), file("/ro/inside", b"data")]);

        let summary = run(temp_dir.path(), input)?;
        let ro = temp_dir.path().join("ro");

        assert_eq!(summary.failures(), 0);
        assert_eq!(fs::read(ro.join("inside"))?, b"data");
        assert_eq!(fs::metadata(&ro)?.permissions().mode() & 0o777, 0o555);

        fs::set_permissions(&ro, fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    #[test]
    fn test_failed_record_keeps_stream_aligned() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let input = stream(vec![
            file("/no/such/dir/f", b"lost content"),
            file("/ok", b"kept"),
        ]);

        let summary = run(temp_dir.path(), input)?;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(fs::read(temp_dir.path().join("ok"))?, b"kept");
        Ok(())
    }

    #[test]
    fn test_remove_missing_and_recursive() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        fs::create_dir_all(temp_dir.path().join("tree/sub"))?;
        fs::write(temp_dir.path().join("tree/sub/f"), b"x")?;

        let input = stream(vec![
            (remove(Entry::new("/ghost", 0o100644)), None),
            (remove(Entry::new("/tree", 0o040755)), None),
        ]);
        let summary = run(temp_dir.path(), input)?;

        assert_eq!(summary.removed, 2);
        assert!(!temp_dir.path().join("tree").exists());
        Ok(())
    }

    #[test]
    fn test_unsupported_and_unsafe_records() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("root");
        fs::create_dir(&root)?;

        let input = stream(vec![
            (add(Entry::new("/fifo", 0o010644)), None),
            file("/../escape", b"nope"),
            file("/fine", b"yes"),
        ]);
        let summary = run(&root, input)?;

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert!(!temp_dir.path().join("escape").exists());
        assert!(root.join("fine").exists());
        Ok(())
    }

    #[test]
    fn test_records_naming_the_root_spare_it() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path().join("root");
        fs::create_dir_all(root.join("etc"))?;
        fs::write(root.join("etc/important"), b"keep")?;

        let input = stream(vec![
            file("/", b"abc"),
            (remove(Entry::new("/", 0o040755)), None),
            (remove(Entry::new("", 0o100644)), None),
            dir("/", 0o750),
            file("/ok", b"fine"),
        ]);
        let summary = run(&root, input)?;

        assert_eq!(summary.failed, 3);
        assert_eq!(summary.updated, 1);
        assert_eq!(fs::read(root.join("etc/important"))?, b"keep");
        assert_eq!(fs::metadata(&root)?.permissions().mode() & 0o7777, 0o750);
        // Content of the refused file record was skipped, not misread.
        assert_eq!(fs::read(root.join("ok"))?, b"fine");
        Ok(())
    }

    #[test]
    fn test_dry_run_touches_nothing() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let mut options = MaterializeOptions::new(temp_dir.path());
        options.dry_run = true;

        let input = stream(vec![
            dir("/d", 0o755),
            file("/d/f", b"content"),
            (add(Entry::hardlink("/d/l", "/d/f", 0o100644)), None),
        ]);
        let summary = Materializer::new(options).run(input, &CancellationToken::new())?;

        assert_eq!(summary.planned, 3);
        assert_eq!(summary.links_deferred, 0);
        assert_eq!(fs::read_dir(temp_dir.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_truncated_content_is_fatal() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let mut bytes = stream(vec![file("/f", b"0123456789")]).into_inner();
        bytes.truncate(bytes.len() - 4);

        let result = run(temp_dir.path(), Cursor::new(bytes));
        assert!(matches!(
            result,
            Err(SnapError::Stream(PackedError::Truncated("content")))
        ));
        Ok(())
    }

    /// Cancels `token` once `offset` bytes of `inner` have been consumed.
    struct CancelAfter {
        inner: Cursor<Vec<u8>>,
        token: CancellationToken,
        offset: u64,
    }

    impl CancelAfter {
        fn check(&self) {
            if self.inner.position() >= self.offset {
                self.token.cancel();
            }
        }
    }

    impl Read for CancelAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let read = self.inner.read(buf)?;
            self.check();
            Ok(read)
        }
    }

    impl BufRead for CancelAfter {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            self.inner.fill_buf()
        }

        fn consume(&mut self, amount: usize) {
            self.inner.consume(amount);
            self.check();
        }
    }

    #[test]
    fn test_cancel_mid_stream_still_links() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = TempDir::new()?;
        let applied = || {
            vec![
                file("/f", b"x"),
                (add(Entry::hardlink("/l", "/f", 0o100644)), None),
            ]
        };
        let offset = stream(applied()).into_inner().len() as u64;
        let mut records = applied();
        records.push(file("/g", b"late"));

        let token = CancellationToken::new();
        let input = CancelAfter {
            inner: stream(records),
            token: token.clone(),
            offset,
        };
        let summary = Materializer::new(MaterializeOptions::new(temp_dir.path())).run(input, &token)?;

        assert!(summary.interrupted);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.links_deferred, 1);
        assert_eq!(summary.links_created, 1);
        assert_eq!(
            fs::metadata(temp_dir.path().join("l"))?.ino(),
            fs::metadata(temp_dir.path().join("f"))?.ino()
        );
        assert!(!temp_dir.path().join("g").exists());
        Ok(())
    }

    #[test]
    fn test_cancel_before_first_record() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = Materializer::new(MaterializeOptions::new(temp_dir.path()))
            .run(stream(vec![file("/f", b"x")]), &cancel)
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.records, 0);
        assert!(!temp_dir.path().join("f").exists());
        Ok(())
    }
}
