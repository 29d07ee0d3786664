//! Change detection.
//!
//! [`Differ`] compares an index (the last recorded state of a tree) with a
//! fresh [`Snapshot`] and classifies every difference. Files whose size and
//! modification time match their record are trusted without reading them;
//! everything else is fingerprinted, in parallel. That metadata shortcut is a
//! cache heuristic: a same-size, same-mtime rewrite goes unnoticed unless the
//! differ runs in deep mode.

mod moves;

pub(crate) use moves::blockers;

use std::collections::HashMap;
use std::fmt;

use rayon::ThreadPool;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::index::{FileMeta, FileRecord, IndexStore};
use crate::progress::{Event, Progress, silent};
use crate::scan::Snapshot;
use crate::tree::{Tree, fingerprint_file};

/// One classified difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    Insert { record: FileRecord },
    Delete { record: FileRecord },
    Modify { old: FileRecord, new: FileRecord },
    Move { from: FileRecord, to: FileRecord },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Delete,
    Move,
    Insert,
    Modify,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Insert => "insert",
            Self::Modify => "modify",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Change {
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Insert { .. } => ChangeKind::Insert,
            Self::Delete { .. } => ChangeKind::Delete,
            Self::Modify { .. } => ChangeKind::Modify,
            Self::Move { .. } => ChangeKind::Move,
        }
    }

    /// The path the change ends at: the destination of a move, otherwise
    /// the only path involved.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Insert { record } | Self::Delete { record } => &record.path,
            Self::Modify { new, .. } => &new.path,
            Self::Move { to, .. } => &to.path,
        }
    }

    /// The record the path should hold afterwards; `None` for deletes.
    #[must_use]
    pub fn target(&self) -> Option<&FileRecord> {
        match self {
            Self::Insert { record } => Some(record),
            Self::Modify { new, .. } => Some(new),
            Self::Move { to, .. } => Some(to),
            Self::Delete { .. } => None,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { from, to } => write!(f, "move {} -> {}", from.path, to.path),
            other => write!(f, "{} {}", other.kind(), other.path()),
        }
    }
}

/// Ordered, immutable result of one diff.
///
/// Deletes come first, then moves, inserts and modifies. Deletes, inserts and
/// modifies are sorted by path; moves are ordered so each runs after any move
/// vacating its destination. Applied in this order, no step needs a path an
/// earlier step has not yet freed, except around a cycle of moves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    fn assemble(
        deletes: Vec<FileRecord>,
        inserts: Vec<FileRecord>,
        mut modifies: Vec<(FileRecord, FileRecord)>,
    ) -> Self {
        let paired = moves::pair_moves(deletes, inserts);
        modifies.sort_by(|a, b| a.1.path.cmp(&b.1.path));

        let mut changes = Vec::with_capacity(
            paired.deletes.len() + paired.moves.len() + paired.inserts.len() + modifies.len(),
        );
        changes.extend(paired.deletes.into_iter().map(|record| Change::Delete { record }));
        changes.extend(paired.moves.into_iter().map(|(from, to)| Change::Move { from, to }));
        changes.extend(paired.inserts.into_iter().map(|record| Change::Insert { record }));
        changes.extend(modifies.into_iter().map(|(old, new)| Change::Modify { old, new }));
        Self { changes }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.changes.iter().filter(|c| c.kind() == kind).count()
    }
}

impl IntoIterator for ChangeSet {
    type Item = Change;
    type IntoIter = std::vec::IntoIter<Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// A file that could not be fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unreadable {
    pub path: String,
    pub message: String,
}

/// Everything one diff found.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub changes: ChangeSet,
    /// Records whose metadata drifted while the content stayed the same.
    pub refreshed: Vec<FileRecord>,
    /// Paths left out of `changes` because they could not be read.
    pub unreadable: Vec<Unreadable>,
    pub hashed_files: usize,
    pub hashed_bytes: u64,
}

impl Diff {
    /// Apply `refreshed` to `index`.
    pub fn refresh(&self, index: &mut IndexStore) {
        for record in &self.refreshed {
            index.insert(record.clone());
        }
    }
}

/// Compares an index with the current state of its tree.
pub struct Differ<'a> {
    tree: &'a dyn Tree,
    fingerprinter: Fingerprinter,
    deep: bool,
    pool: Option<&'a ThreadPool>,
    progress: Progress<'a>,
}

impl<'a> Differ<'a> {
    #[must_use]
    pub fn new(tree: &'a dyn Tree, fingerprinter: Fingerprinter) -> Self {
        Self {
            tree,
            fingerprinter,
            deep: false,
            pool: None,
            progress: &silent,
        }
    }

    /// Rehash every indexed file, even when its metadata matches.
    #[must_use]
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    /// Hash on `pool` instead of the global rayon pool.
    #[must_use]
    pub fn pool(mut self, pool: Option<&'a ThreadPool>) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn progress(mut self, progress: Progress<'a>) -> Self {
        self.progress = progress;
        self
    }

    /// Classify every difference between `index` and `snapshot`.
    #[must_use]
    pub fn diff(&self, index: &IndexStore, snapshot: &Snapshot) -> Diff {
        let mut fresh: Vec<(&str, FileMeta)> = Vec::new();
        let mut drifted: Vec<(&FileRecord, FileMeta)> = Vec::new();
        for (path, meta) in snapshot.iter() {
            match index.get(path) {
                None => fresh.push((path, *meta)),
                Some(old) if self.deep || old.meta() != *meta => drifted.push((old, *meta)),
                Some(_) => {}
            }
        }
        let deletes: Vec<FileRecord> = index
            .iter()
            .filter(|r| !snapshot.contains(&r.path))
            .cloned()
            .collect();

        let wanted: Vec<&str> = fresh
            .iter()
            .map(|(p, _)| *p)
            .chain(drifted.iter().map(|(r, _)| r.path.as_str()))
            .collect();
        if !wanted.is_empty() {
            let bytes = fresh.iter().map(|(_, m)| m.size).sum::<u64>()
                + drifted.iter().map(|(_, m)| m.size).sum::<u64>();
            (self.progress)(&Event::Hashing {
                tree: &self.tree.describe(),
                files: wanted.len(),
                bytes,
            });
        }
        let mut digests: HashMap<&str, Result<(Fingerprint, u64)>> =
            self.hash_all(&wanted).into_iter().collect();

        let mut diff = Diff::default();
        for (_, bytes) in digests.values().filter_map(|r| r.as_ref().ok()) {
            diff.hashed_files += 1;
            diff.hashed_bytes += bytes;
        }

        let mut inserts = Vec::with_capacity(fresh.len());
        for (path, meta) in fresh {
            match digests.remove(path) {
                Some(Ok((fp, _))) => inserts.push(FileRecord::new(path, meta, fp)),
                Some(Err(e)) => diff.unreadable.push(unreadable(path, &e)),
                None => {}
            }
        }

        let mut modifies = Vec::new();
        for (old, meta) in drifted {
            match digests.remove(old.path.as_str()) {
                Some(Ok((fp, _))) => {
                    let new = FileRecord::new(old.path.clone(), meta, fp);
                    if new.fingerprint != old.fingerprint {
                        modifies.push((old.clone(), new));
                    } else if new.meta() != old.meta() {
                        debug!(path = %new.path, "Metadata drifted, content unchanged");
                        diff.refreshed.push(new);
                    }
                }
                Some(Err(e)) => diff.unreadable.push(unreadable(&old.path, &e)),
                None => {}
            }
        }
        diff.unreadable.sort_by(|a, b| a.path.cmp(&b.path));

        diff.changes = ChangeSet::assemble(deletes, inserts, modifies);
        debug!(
            tree = %self.tree.describe(),
            changes = diff.changes.len(),
            refreshed = diff.refreshed.len(),
            unreadable = diff.unreadable.len(),
            hashed = diff.hashed_files,
            "Diff complete"
        );
        diff
    }

    fn hash_all<'p>(&self, paths: &[&'p str]) -> Vec<(&'p str, Result<(Fingerprint, u64)>)> {
        let job = || {
            paths
                .par_iter()
                .map(|&path| (path, self.hash(path)))
                .collect::<Vec<_>>()
        };
        match self.pool {
            Some(pool) => pool.install(job),
            None => job(),
        }
    }

    fn hash(&self, path: &str) -> Result<(Fingerprint, u64)> {
        let (fp, bytes) = fingerprint_file(self.tree, &self.fingerprinter, path)?;
        (self.progress)(&Event::Hashed { path, bytes });
        Ok((fp, bytes))
    }
}

fn unreadable(path: &str, error: &crate::error::Error) -> Unreadable {
    warn!(path, error = %error, "Cannot fingerprint file");
    Unreadable {
        path: path.to_string(),
        message: error.to_string(),
    }
}

/// Compare two indexes by fingerprint alone. Metadata is ignored, so an index
/// of a faithful copy compares equal to the index of its source.
#[must_use]
pub fn diff_indexes(old: &IndexStore, new: &IndexStore) -> ChangeSet {
    let mut inserts = Vec::new();
    let mut modifies = Vec::new();
    for record in new.iter() {
        match old.get(&record.path) {
            None => inserts.push(record.clone()),
            Some(prev) if prev.fingerprint != record.fingerprint => {
                modifies.push((prev.clone(), record.clone()));
            }
            Some(_) => {}
        }
    }
    let deletes = old
        .iter()
        .filter(|r| !new.contains(&r.path))
        .cloned()
        .collect();
    ChangeSet::assemble(deletes, inserts, modifies)
}
