//! In-memory index for one tracked tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::fingerprint::Algorithm;
use crate::index::record::FileRecord;

/// Last-recorded state of every file in one tracked tree.
///
/// Records are keyed by tree-relative path and iterate in path order, which
/// keeps reports and the persisted file deterministic. Mutation happens only
/// through the reconciler, one committed change at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStore {
    root: PathBuf,
    algorithm: Algorithm,
    records: BTreeMap<String, FileRecord>,
}

impl IndexStore {
    /// Empty index for the tree at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, algorithm: Algorithm) -> Self {
        Self {
            root: root.into(),
            algorithm,
            records: BTreeMap::new(),
        }
    }

    /// Build an index from records. Later duplicates replace earlier ones.
    #[must_use]
    pub fn from_records(
        root: impl Into<PathBuf>,
        algorithm: Algorithm,
        records: impl IntoIterator<Item = FileRecord>,
    ) -> Self {
        let mut index = Self::new(root, algorithm);
        for record in records {
            index.insert(record);
        }
        index
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileRecord> {
        self.records.get(path)
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    /// Insert or replace the record for `record.path`.
    pub fn insert(&mut self, record: FileRecord) -> Option<FileRecord> {
        self.records.insert(record.path.clone(), record)
    }

    pub fn remove(&mut self, path: &str) -> Option<FileRecord> {
        self.records.remove(path)
    }

    /// Records in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    /// Sum of recorded sizes in bytes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.records.values().map(|r| r.size).sum()
    }
}
