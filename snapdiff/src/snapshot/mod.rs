//! Ordered entry sets keyed by path, and the set difference the dump is
//! built on.

pub mod store;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;

use crate::entry::Entry;

pub use store::{DumpMode, LoadOutcome, SnapshotFile};

/// Entries keyed by raw path bytes. Iteration is in byte-wise lexicographic
/// path order, which keeps persisted snapshots stable and diffable.
///
/// Only the path takes part in comparisons; mode and metadata are payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotSet {
    entries: BTreeMap<OsString, Entry>,
}

impl SnapshotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns the entry previously stored under the
    /// same path.
    pub fn insert(&mut self, entry: Entry) -> Option<Entry> {
        self.entries
            .insert(entry.path.clone().into_os_string(), entry)
    }

    pub fn remove(&mut self, path: &Path) -> Option<Entry> {
        self.entries.remove(path.as_os_str())
    }

    pub fn get(&self, path: &Path) -> Option<&Entry> {
        self.entries.get(path.as_os_str())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path.as_os_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Entries of `self` whose path is absent from `other`, with their
    /// attributes as stored in `self`.
    ///
    /// Purely structural: an entry present in both sets is dropped even if
    /// its mode changed.
    pub fn subtract(&self, other: &SnapshotSet) -> SnapshotSet {
        self.entries
            .iter()
            .filter(|(key, _)| !other.entries.contains_key(*key))
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}

impl FromIterator<Entry> for SnapshotSet {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        let mut set = SnapshotSet::new();
        set.extend(iter);
        set
    }
}

impl Extend<Entry> for SnapshotSet {
    fn extend<I: IntoIterator<Item = Entry>>(&mut self, iter: I) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

impl IntoIterator for SnapshotSet {
    type Item = Entry;
    type IntoIter = std::collections::btree_map::IntoValues<OsString, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl<'a> IntoIterator for &'a SnapshotSet {
    type Item = &'a Entry;
    type IntoIter = std::collections::btree_map::Values<'a, OsString, Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
