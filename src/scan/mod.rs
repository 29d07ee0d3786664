//! Tree scanning.
//!
//! A scan produces a [`Snapshot`]: the current size and modification time of
//! every included regular file, keyed by tree-relative path. Snapshots are
//! ephemeral; the differ consumes them and only index records are persisted.

mod exclude;
mod walk;

use std::collections::BTreeMap;

use crate::index::FileMeta;

pub use exclude::{Exclude, IGNORE_FILE, IgnoreRules, NoExclusions};
pub use walk::{ScanEntry, Walk, scan_dir};

/// On-disk state of one tree at scan time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, FileMeta>,
}

impl Snapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, meta: FileMeta) {
        self.entries.insert(path.into(), meta);
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileMeta> {
        self.entries.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileMeta)> {
        self.entries.iter().map(|(p, m)| (p.as_str(), m))
    }

    /// Sum of sizes in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|m| m.size).sum()
    }
}

impl FromIterator<(String, FileMeta)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, FileMeta)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
