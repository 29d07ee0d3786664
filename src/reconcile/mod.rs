//! Check and sync.
//!
//! Both modes are functions of their inputs: trees and indexes go in, a
//! report and the updated indexes come out. Persisting the indexes is left to
//! the caller, so the engine itself never writes an index file.

mod check;
mod report;
mod sync;

use std::sync::atomic::AtomicBool;

use rayon::ThreadPool;
use tracing::info;

use crate::diff::{Change, Differ};
use crate::error::{Error, Result};
use crate::fingerprint::{Algorithm, DEFAULT_CHUNK_SIZE, Fingerprinter};
use crate::index::IndexStore;
use crate::progress::{Event, Progress, silent};
use crate::scan::Snapshot;
use crate::tree::Tree;

pub use report::{
    Anomaly, CheckReport, Conflict, ConflictReason, Damage, Failure, IntegrityViolation, Outcome,
    Repair, SyncReport, ViolationKind,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions {
    /// Rewrite the index to the observed state instead of only reporting.
    pub accept: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Plan and preflight only.
    pub dry_run: bool,
    /// Rewrite missing or diverged cold files from hot when the hot copy
    /// still holds the content the cold index expects.
    pub repair: bool,
}

/// Asked before each change touches the cold tree. `false` leaves the change
/// undone.
pub type Confirm<'a> = &'a dyn Fn(&Change) -> bool;

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub report: CheckReport,
    pub index: IndexStore,
    /// Whether `index` differs from the one passed in.
    pub index_changed: bool,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub report: SyncReport,
    pub hot_index: IndexStore,
    pub cold_index: IndexStore,
}

/// Runs check and sync with shared hashing settings.
pub struct Reconciler<'a> {
    chunk_size: usize,
    deep: bool,
    pool: Option<&'a ThreadPool>,
    progress: Progress<'a>,
    cancel: Option<&'a AtomicBool>,
    confirm: Option<Confirm<'a>>,
}

impl Default for Reconciler<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Reconciler<'a> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            deep: false,
            pool: None,
            progress: &silent,
            cancel: None,
            confirm: None,
        }
    }

    #[must_use]
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Always rehash instead of trusting unchanged metadata.
    #[must_use]
    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    #[must_use]
    pub fn pool(mut self, pool: &'a ThreadPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn progress(mut self, progress: Progress<'a>) -> Self {
        self.progress = progress;
        self
    }

    /// Stop between changes once `cancel` is set. A change turned down by
    /// [`confirm`](Self::confirm) while `cancel` is set counts as skipped,
    /// not declined.
    #[must_use]
    pub fn cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Ask `confirm` before applying each change. Dry runs never ask.
    #[must_use]
    pub fn confirm(mut self, confirm: Confirm<'a>) -> Self {
        self.confirm = Some(confirm);
        self
    }

    /// Fingerprint every file of `tree` into a fresh index.
    ///
    /// # Errors
    ///
    /// Fails if the tree cannot be scanned or any file cannot be read; an
    /// index with holes would report those files as new on the next run.
    pub fn build_index(
        &self,
        tree: &dyn Tree,
        root: impl Into<std::path::PathBuf>,
        algorithm: Algorithm,
    ) -> Result<IndexStore> {
        let mut index = IndexStore::new(root, algorithm);
        let snapshot = self.scan(tree)?;
        let diff = self.differ(tree, algorithm).diff(&index, &snapshot);
        if let Some(bad) = diff.unreadable.first() {
            return Err(Error::io_at(
                tree.locate(&bad.path),
                std::io::Error::other(bad.message.clone()),
            ));
        }
        for change in &diff.changes {
            record_change(&mut index, change);
        }
        info!(
            tree = %tree.describe(),
            files = index.len(),
            bytes = index.total_size(),
            "Index built"
        );
        Ok(index)
    }

    fn fingerprinter(&self, algorithm: Algorithm) -> Fingerprinter {
        Fingerprinter::new(algorithm, self.chunk_size)
    }

    fn differ<'t>(&'t self, tree: &'t dyn Tree, algorithm: Algorithm) -> Differ<'t> {
        Differ::new(tree, self.fingerprinter(algorithm))
            .deep(self.deep)
            .pool(self.pool)
            .progress(self.progress)
    }

    fn scan(&self, tree: &dyn Tree) -> Result<Snapshot> {
        let snapshot = tree.scan()?;
        let name = tree.describe();
        info!(tree = %name, files = snapshot.len(), bytes = snapshot.total_size(), "Scanned");
        (self.progress)(&Event::Scanned {
            tree: &name,
            files: snapshot.len(),
            bytes: snapshot.total_size(),
        });
        Ok(snapshot)
    }
}

/// Make `index` reflect `change` having happened.
fn record_change(index: &mut IndexStore, change: &Change) {
    match change {
        Change::Insert { record } => {
            index.insert(record.clone());
        }
        Change::Delete { record } => {
            index.remove(&record.path);
        }
        Change::Modify { new, .. } => {
            index.insert(new.clone());
        }
        Change::Move { from, to } => {
            index.remove(&from.path);
            index.insert(to.clone());
        }
    }
}
