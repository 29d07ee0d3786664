//! Sync mode: mirror hot-side changes onto the cold tree.
//!
//! The hot tree is diffed against the hot index; each resulting change is
//! preflighted against the cold tree and its index, then applied. Both
//! indexes are updated right after each file operation completes, so a run
//! that stops part-way leaves indexes that describe exactly what is on disk.
//!
//! A move whose destination is still held by a move that has not run yet (a
//! cycle such as `a/x -> q` with `q/r -> a`) parks its file under a free
//! staging name and finishes after the other moves. The parked file is
//! recorded in both indexes, so an interrupted run picks it up as a move.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::diff::{Change, blockers};
use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::index::{FileRecord, IndexStore};
use crate::progress::{Event, Progress};
use crate::reconcile::report::{Conflict, ConflictReason, Damage, Failure, Repair, SyncReport};
use crate::reconcile::{Confirm, Reconciler, SyncOptions, SyncOutcome, record_change};
use crate::tree::{Tree, fingerprint_file};

/// Prefix of the root-level name a parked move source waits under.
const STAGING_PREFIX: &str = ".dintact-move-";

/// What the cold tree holds at one path, relative to its index.
enum ColdState {
    /// Not indexed, not present.
    Absent,
    /// Indexed and matching; carries the current record.
    Intact(FileRecord),
    /// Indexed but gone.
    Missing,
    /// Indexed but the content changed.
    Diverged {
        expected: Fingerprint,
        observed: Fingerprint,
    },
    /// Present but not indexed.
    Unindexed(FileRecord),
    /// Not indexed, and a directory.
    Directory,
}

enum Verdict {
    Proceed,
    /// The cold tree already holds the target state; carries the cold record
    /// to store, if the target path holds a file.
    AlreadyApplied(Option<FileRecord>),
    Conflict(ConflictReason),
}

/// How one change ended.
enum Resolution {
    /// Carries the repair it amounted to, if it rewrote a damaged cold file.
    Applied(Option<Repair>),
    AlreadyApplied,
    Conflict(ConflictReason),
    Failed(Error),
    Declined,
    Skipped,
}

/// A move parked under a staging name.
struct Staged {
    change: Change,
    parked: Change,
}

impl Reconciler<'_> {
    /// Mirror changes of `hot` since `hot_index` onto `cold`.
    ///
    /// A change whose cold side has diverged from `cold_index` is skipped as
    /// a conflict, unless `options.repair` is set and the hot side can supply
    /// the content; a change that fails part-way is reported. Neither stops
    /// the remaining changes.
    ///
    /// # Errors
    ///
    /// Fails before touching anything if a tree cannot be scanned or the two
    /// indexes use different fingerprint algorithms.
    pub fn sync(
        &self,
        hot: &dyn Tree,
        cold: &dyn Tree,
        hot_index: IndexStore,
        cold_index: IndexStore,
        options: SyncOptions,
    ) -> Result<SyncOutcome> {
        let (mut hot_index, mut cold_index) = align_algorithms(hot_index, cold_index)?;
        let fingerprinter = self.fingerprinter(hot_index.algorithm());

        let damaged = if options.repair {
            self.survey(cold, &mut cold_index)?
        } else {
            Vec::new()
        };

        let snapshot = self.scan(hot)?;
        let diff = self
            .differ(hot, hot_index.algorithm())
            .diff(&hot_index, &snapshot);
        diff.refresh(&mut hot_index);

        let mut report = SyncReport::new(hot.describe(), cold.describe(), options.dry_run);
        report.hashed_files = diff.hashed_files;
        report.hashed_bytes = diff.hashed_bytes;
        report.refreshed = diff.refreshed.len();
        report.unreadable = diff.unreadable;
        info!(
            hot = %report.hot,
            cold = %report.cold,
            changes = diff.changes.len(),
            damaged = damaged.len(),
            dry_run = options.dry_run,
            "Syncing"
        );

        let mut touched = BTreeSet::new();
        let mut pending = BTreeSet::new();
        for change in &diff.changes {
            touched.insert(change.path().to_string());
            if let Change::Move { from, .. } = change {
                touched.insert(from.path.clone());
                pending.insert(from.path.clone());
            }
        }

        let mut run = Mirror {
            hot,
            cold,
            fingerprinter,
            deep: self.deep,
            dry_run: options.dry_run,
            repair: options.repair,
            progress: self.progress,
            confirm: self.confirm,
            cancel: self.cancel,
            hot_index,
            cold_index,
            pending,
            staged: Vec::new(),
            staging_seq: 0,
        };

        let mut changes = diff.changes.into_iter().peekable();
        while let Some(change) = changes.next() {
            if run.cancelled() {
                warn!(remaining = changes.len() + 1 + run.staged.len(), "Sync cancelled");
                report.skipped.push(change);
                report.skipped.extend(changes.by_ref());
                break;
            }
            run.handle(change, &mut report);
            if !matches!(changes.peek(), Some(Change::Move { .. })) {
                run.complete_staged(&mut report);
            }
        }
        report.skipped.extend(run.staged.drain(..).map(|s| s.change));

        if !damaged.is_empty() && !run.cancelled() {
            run.restore(damaged, &touched, &mut report);
        }

        info!(
            applied = report.applied.len(),
            already_applied = report.already_applied.len(),
            repaired = report.repaired.len(),
            conflicts = report.conflicts.len(),
            failures = report.failures.len(),
            declined = report.declined.len(),
            skipped = report.skipped.len(),
            outcome = %report.outcome(),
            "Sync complete"
        );
        Ok(SyncOutcome {
            report,
            hot_index: run.hot_index,
            cold_index: run.cold_index,
        })
    }

    /// Find cold files that no longer match `cold_index`, refreshing records
    /// whose metadata drifted over unchanged content.
    fn survey(
        &self,
        cold: &dyn Tree,
        cold_index: &mut IndexStore,
    ) -> Result<Vec<(FileRecord, Damage)>> {
        let snapshot = self.scan(cold)?;
        let diff = self
            .differ(cold, cold_index.algorithm())
            .diff(cold_index, &snapshot);
        diff.refresh(cold_index);

        let mut damaged = Vec::new();
        for change in diff.changes {
            match change {
                Change::Modify { old, new } => damaged.push((
                    old,
                    Damage::Diverged {
                        observed: new.fingerprint,
                    },
                )),
                // A relocated cold file leaves its indexed path empty; the
                // copy it left elsewhere is not touched.
                Change::Delete { record } | Change::Move { from: record, .. } => {
                    damaged.push((record, Damage::Missing));
                }
                Change::Insert { .. } => {}
            }
        }
        for bad in diff.unreadable {
            if let Some(record) = cold_index.get(&bad.path) {
                damaged.push((
                    record.clone(),
                    Damage::Unreadable {
                        message: bad.message,
                    },
                ));
            }
        }
        debug!(tree = %cold.describe(), damaged = damaged.len(), "Cold survey complete");
        Ok(damaged)
    }
}

/// An empty index takes the other side's algorithm; two populated indexes
/// must already agree.
fn align_algorithms(hot: IndexStore, cold: IndexStore) -> Result<(IndexStore, IndexStore)> {
    if hot.algorithm() == cold.algorithm() {
        Ok((hot, cold))
    } else if hot.is_empty() {
        let hot = IndexStore::new(hot.root().to_path_buf(), cold.algorithm());
        Ok((hot, cold))
    } else if cold.is_empty() {
        let cold = IndexStore::new(cold.root().to_path_buf(), hot.algorithm());
        Ok((hot, cold))
    } else {
        Err(Error::AlgorithmMismatch {
            hot: hot.algorithm().to_string(),
            cold: cold.algorithm().to_string(),
        })
    }
}

struct Mirror<'r> {
    hot: &'r dyn Tree,
    cold: &'r dyn Tree,
    fingerprinter: Fingerprinter,
    deep: bool,
    dry_run: bool,
    repair: bool,
    progress: Progress<'r>,
    confirm: Option<Confirm<'r>>,
    cancel: Option<&'r AtomicBool>,
    hot_index: IndexStore,
    cold_index: IndexStore,
    /// Sources of moves not handled yet.
    pending: BTreeSet<String>,
    staged: Vec<Staged>,
    staging_seq: usize,
}

impl Mirror<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }

    fn handle(&mut self, change: Change, report: &mut SyncReport) {
        if let Change::Move { from, to } = &change {
            self.pending.remove(&from.path);
            if !blockers(&self.pending, &to.path).is_empty() {
                let (from, to) = (from.clone(), to.clone());
                self.stage(change, from, to, report);
                return;
            }
        }
        let resolution = self.resolve(&change, true);
        self.record(change, resolution, report);
    }

    fn resolve(&mut self, change: &Change, ask: bool) -> Resolution {
        let verdict = match self.preflight(change) {
            Ok(verdict) => verdict,
            Err(e) => return Resolution::Failed(e),
        };

        let repairing = match verdict {
            Verdict::Conflict(reason) if self.repair && reason.is_corruption() => Some(reason),
            Verdict::Conflict(reason) => return Resolution::Conflict(reason),
            Verdict::AlreadyApplied(held) => {
                if !self.dry_run {
                    self.settle(change, held);
                }
                return Resolution::AlreadyApplied;
            }
            Verdict::Proceed => None,
        };
        let repair = repairing.as_ref().and_then(|reason| {
            Some(Repair {
                path: reason.path().to_string(),
                damage: reason.damage()?,
                restored: change.target()?.fingerprint.clone(),
            })
        });

        if self.dry_run {
            return Resolution::Applied(repair);
        }
        if ask && !self.confirmed(change) {
            return self.declined();
        }
        let applied = if repairing.is_some() {
            self.apply_repair(change)
        } else {
            self.apply(change)
        };
        match applied {
            Ok(()) => Resolution::Applied(repair),
            Err(e) => Resolution::Failed(e),
        }
    }

    fn record(&self, change: Change, resolution: Resolution, report: &mut SyncReport) {
        match resolution {
            Resolution::Applied(repair) => {
                if self.dry_run {
                    debug!(change = %change, "Would apply");
                } else {
                    debug!(change = %change, "Applied");
                    (self.progress)(&Event::Applied { change: &change });
                }
                if let Some(repair) = repair {
                    info!(path = %repair.path, change = %change, "Damaged cold file replaced");
                    if !self.dry_run {
                        (self.progress)(&Event::Repaired { path: &repair.path });
                    }
                    report.repaired.push(repair);
                }
                report.applied.push(change);
            }
            Resolution::AlreadyApplied => {
                debug!(change = %change, "Cold tree already up to date");
                (self.progress)(&Event::AlreadyApplied { change: &change });
                report.already_applied.push(change);
            }
            Resolution::Conflict(reason) => {
                warn!(change = %change, reason = %reason, "Conflict, change skipped");
                (self.progress)(&Event::Conflict {
                    change: &change,
                    reason: &reason,
                });
                report.conflicts.push(Conflict { change, reason });
            }
            Resolution::Failed(e) => self.fail(change, &e, report),
            Resolution::Declined => {
                info!(change = %change, "Declined");
                report.declined.push(change);
            }
            Resolution::Skipped => report.skipped.push(change),
        }
    }

    fn confirmed(&self, change: &Change) -> bool {
        self.confirm.is_none_or(|ask| ask(change))
    }

    /// A change turned down at the prompt; turning one down to stop the run
    /// skips it instead.
    fn declined(&self) -> Resolution {
        if self.cancelled() {
            Resolution::Skipped
        } else {
            Resolution::Declined
        }
    }

    fn fail(&self, change: Change, error: &Error, report: &mut SyncReport) {
        let message = error.to_string();
        warn!(change = %change, error = %message, "Change failed");
        (self.progress)(&Event::Failed {
            change: &change,
            message: &message,
        });
        report.failures.push(Failure { change, message });
    }

    fn stage(&mut self, change: Change, from: FileRecord, to: FileRecord, report: &mut SyncReport) {
        match self.inspect(&from.path) {
            Ok(ColdState::Intact(held) | ColdState::Unindexed(held))
                if held.fingerprint == to.fingerprint => {}
            // The regular preflight names whatever is wrong with the source.
            Ok(_) => {
                let resolution = self.resolve(&change, true);
                self.record(change, resolution, report);
                return;
            }
            Err(e) => {
                self.fail(change, &e, report);
                return;
            }
        }
        if self.dry_run {
            self.record(change, Resolution::Applied(None), report);
            return;
        }
        if !self.confirmed(&change) {
            let resolution = self.declined();
            self.record(change, resolution, report);
            return;
        }

        let parked = self
            .free_staging()
            .and_then(|staging| Ok((self.cold.rename(&from.path, &staging)?, staging)));
        match parked {
            Ok((meta, staging)) => {
                debug!(from = %from.path, to = %to.path, staging = %staging, "Destination still held, parking move");
                self.cold_index.remove(&from.path);
                self.cold_index
                    .insert(FileRecord::new(staging.clone(), meta, to.fingerprint.clone()));
                self.hot_index.remove(&from.path);
                let parked = FileRecord::new(staging, from.meta(), from.fingerprint);
                self.hot_index.insert(parked.clone());
                self.staged.push(Staged {
                    change,
                    parked: Change::Move { from: parked, to },
                });
            }
            Err(e) => self.fail(change, &e, report),
        }
    }

    /// Finish parked moves; the original change is what gets reported.
    fn complete_staged(&mut self, report: &mut SyncReport) {
        for Staged { change, parked } in std::mem::take(&mut self.staged) {
            if self.cancelled() {
                report.skipped.push(change);
                continue;
            }
            let resolution = self.resolve(&parked, false);
            self.record(change, resolution, report);
        }
    }

    /// A staging name neither tree nor index uses.
    fn free_staging(&mut self) -> Result<String> {
        loop {
            let candidate = format!("{STAGING_PREFIX}{}", self.staging_seq);
            self.staging_seq += 1;
            let taken = self.cold_index.contains(&candidate)
                || self.hot_index.contains(&candidate)
                || self.cold.stat(&candidate)?.is_some()
                || self.cold.is_dir(&candidate)?
                || self.hot.stat(&candidate)?.is_some()
                || self.hot.is_dir(&candidate)?;
            if !taken {
                return Ok(candidate);
            }
        }
    }

    /// Rewrite damaged cold files whose hot copy still holds the indexed
    /// content. Paths a hot change already handled are left alone.
    fn restore(
        &mut self,
        damaged: Vec<(FileRecord, Damage)>,
        touched: &BTreeSet<String>,
        report: &mut SyncReport,
    ) {
        for (expected, damage) in damaged {
            if touched.contains(&expected.path) {
                continue;
            }
            let Some(source) = self.hot_index.get(&expected.path).cloned() else {
                debug!(path = %expected.path, "No hot copy, cannot repair");
                continue;
            };
            if source.fingerprint != expected.fingerprint {
                debug!(path = %expected.path, "Hot copy holds other content, cannot repair");
                continue;
            }

            let change = match damage {
                Damage::Missing => Change::Insert {
                    record: source.clone(),
                },
                Damage::Diverged { .. } | Damage::Unreadable { .. } => Change::Modify {
                    old: expected.clone(),
                    new: source.clone(),
                },
            };
            if !self.dry_run {
                if self.cancelled() {
                    break;
                }
                if !self.confirmed(&change) {
                    let resolution = self.declined();
                    self.record(change, resolution, report);
                    continue;
                }
                if let Err(e) = self.copy(&source) {
                    self.fail(change, &e, report);
                    continue;
                }
                (self.progress)(&Event::Repaired {
                    path: &expected.path,
                });
            }
            info!(path = %expected.path, dry_run = self.dry_run, "Cold file restored from hot");
            report.repaired.push(Repair {
                path: expected.path,
                damage,
                restored: source.fingerprint,
            });
        }
    }

    fn hash_cold(&self, path: &str) -> Result<Fingerprint> {
        fingerprint_file(self.cold, &self.fingerprinter, path).map(|(fp, _)| fp)
    }

    fn inspect(&self, path: &str) -> Result<ColdState> {
        let expected = self.cold_index.get(path);
        let meta = self.cold.stat(path)?;
        Ok(match (expected, meta) {
            (None, None) if self.cold.is_dir(path)? => ColdState::Directory,
            (None, None) => ColdState::Absent,
            (Some(_), None) => ColdState::Missing,
            (Some(record), Some(meta)) if !self.deep && record.meta() == meta => {
                ColdState::Intact(record.clone())
            }
            (Some(record), Some(meta)) => {
                let observed = self.hash_cold(path)?;
                if observed == record.fingerprint {
                    ColdState::Intact(FileRecord::new(path, meta, observed))
                } else {
                    ColdState::Diverged {
                        expected: record.fingerprint.clone(),
                        observed,
                    }
                }
            }
            (None, Some(meta)) => {
                ColdState::Unindexed(FileRecord::new(path, meta, self.hash_cold(path)?))
            }
        })
    }

    fn preflight(&self, change: &Change) -> Result<Verdict> {
        match change {
            Change::Insert { record: target } | Change::Modify { new: target, .. } => {
                self.preflight_write(target)
            }
            Change::Delete { record } => Ok(match self.inspect(&record.path)? {
                ColdState::Absent | ColdState::Missing | ColdState::Directory => {
                    Verdict::AlreadyApplied(None)
                }
                ColdState::Intact(_) => Verdict::Proceed,
                ColdState::Unindexed(held) if held.fingerprint == record.fingerprint => {
                    Verdict::Proceed
                }
                ColdState::Unindexed(held) => Verdict::Conflict(ConflictReason::Unexpected {
                    path: held.path,
                    observed: held.fingerprint,
                }),
                ColdState::Diverged { expected, observed } => {
                    Verdict::Conflict(ConflictReason::Diverged {
                        path: record.path.clone(),
                        expected,
                        observed,
                    })
                }
            }),
            Change::Move { from, to } => self.preflight_move(from, to),
        }
    }

    fn preflight_write(&self, target: &FileRecord) -> Result<Verdict> {
        let path = target.path.clone();
        Ok(match self.inspect(&target.path)? {
            ColdState::Absent => Verdict::Proceed,
            ColdState::Intact(held) | ColdState::Unindexed(held)
                if held.fingerprint == target.fingerprint =>
            {
                Verdict::AlreadyApplied(Some(held))
            }
            ColdState::Intact(_) => Verdict::Proceed,
            ColdState::Unindexed(held) => Verdict::Conflict(ConflictReason::Unexpected {
                path,
                observed: held.fingerprint,
            }),
            ColdState::Directory => Verdict::Conflict(ConflictReason::Occupied { path }),
            ColdState::Missing => Verdict::Conflict(ConflictReason::Missing { path }),
            ColdState::Diverged { expected, observed } => {
                Verdict::Conflict(ConflictReason::Diverged {
                    path,
                    expected,
                    observed,
                })
            }
        })
    }

    /// Whether `to` is a directory only because `from` sits inside it.
    fn vacated_by(&self, from: &FileRecord, to: &FileRecord) -> bool {
        let prefix = format!("{}/", to.path);
        from.path.starts_with(&prefix)
            && !self
                .cold_index
                .iter()
                .any(|r| r.path != from.path && r.path.starts_with(&prefix))
    }

    fn preflight_move(&self, from: &FileRecord, to: &FileRecord) -> Result<Verdict> {
        let source = self.inspect(&from.path)?;
        let dest = match self.inspect(&to.path)? {
            ColdState::Directory if self.vacated_by(from, to) => ColdState::Absent,
            dest => dest,
        };
        Ok(match (source, dest) {
            (ColdState::Intact(held) | ColdState::Unindexed(held), ColdState::Absent)
                if held.fingerprint == to.fingerprint =>
            {
                Verdict::Proceed
            }
            // Interrupted after the rename, before the indexes were saved.
            (
                ColdState::Absent | ColdState::Missing | ColdState::Directory,
                ColdState::Intact(held) | ColdState::Unindexed(held),
            ) if held.fingerprint == to.fingerprint => Verdict::AlreadyApplied(Some(held)),
            (_, ColdState::Intact(held) | ColdState::Unindexed(held)) => {
                Verdict::Conflict(ConflictReason::Unexpected {
                    path: to.path.clone(),
                    observed: held.fingerprint,
                })
            }
            (_, ColdState::Directory) => Verdict::Conflict(ConflictReason::Occupied {
                path: to.path.clone(),
            }),
            (_, ColdState::Missing) => Verdict::Conflict(ConflictReason::Missing {
                path: to.path.clone(),
            }),
            (_, ColdState::Diverged { expected, observed }) => {
                Verdict::Conflict(ConflictReason::Diverged {
                    path: to.path.clone(),
                    expected,
                    observed,
                })
            }
            (ColdState::Intact(held), ColdState::Absent) => {
                Verdict::Conflict(ConflictReason::Diverged {
                    path: from.path.clone(),
                    expected: to.fingerprint.clone(),
                    observed: held.fingerprint,
                })
            }
            (ColdState::Unindexed(held), ColdState::Absent) => {
                Verdict::Conflict(ConflictReason::Unexpected {
                    path: from.path.clone(),
                    observed: held.fingerprint,
                })
            }
            (ColdState::Diverged { expected, observed }, ColdState::Absent) => {
                Verdict::Conflict(ConflictReason::Diverged {
                    path: from.path.clone(),
                    expected,
                    observed,
                })
            }
            (
                ColdState::Absent | ColdState::Missing | ColdState::Directory,
                ColdState::Absent,
            ) => Verdict::Conflict(ConflictReason::Missing {
                path: from.path.clone(),
            }),
        })
    }

    fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::Insert { record: target } | Change::Modify { new: target, .. } => {
                self.copy(target)
            }
            Change::Delete { record } => {
                self.cold.remove(&record.path)?;
                self.cold_index.remove(&record.path);
                self.hot_index.remove(&record.path);
                Ok(())
            }
            Change::Move { from, to } => {
                let meta = self.cold.rename(&from.path, &to.path)?;
                self.cold_index.remove(&from.path);
                self.cold_index
                    .insert(FileRecord::new(to.path.clone(), meta, to.fingerprint.clone()));
                record_change(&mut self.hot_index, change);
                Ok(())
            }
        }
    }

    /// Apply a change over damaged cold content. A move cannot trust its
    /// cold source, so the destination is copied from hot and the source
    /// dropped.
    fn apply_repair(&mut self, change: &Change) -> Result<()> {
        let Change::Move { from, to } = change else {
            return self.apply(change);
        };
        self.copy(to)?;
        if self.cold_index.remove(&from.path).is_some() && self.cold.stat(&from.path)?.is_some() {
            self.cold.remove(&from.path)?;
        }
        self.hot_index.remove(&from.path);
        Ok(())
    }

    /// Stream `target` from hot to cold, hashing on the way.
    fn copy(&mut self, target: &FileRecord) -> Result<()> {
        let hot = self.hot;
        let source = hot.open(&target.path)?;
        let mut reader = self.fingerprinter.hashing_reader(source);
        let meta = self
            .cold
            .write(&target.path, &mut reader, Some(target.modified))?;
        let (written, _) = reader.finish();

        // The cold index describes what was written even if it is not what
        // the diff saw, so the next run starts from the truth.
        self.cold_index
            .insert(FileRecord::new(target.path.clone(), meta, written.clone()));
        if written != target.fingerprint {
            return Err(Error::Other(format!(
                "{} changed while copying (expected {}, copied {})",
                target.path,
                target.fingerprint.short(),
                written.short()
            )));
        }
        self.hot_index.insert(target.clone());
        Ok(())
    }

    /// Record a change the cold tree already reflects.
    fn settle(&mut self, change: &Change, held: Option<FileRecord>) {
        match change {
            Change::Delete { record } => {
                self.cold_index.remove(&record.path);
            }
            Change::Move { from, .. } => {
                self.cold_index.remove(&from.path);
            }
            Change::Insert { .. } | Change::Modify { .. } => {}
        }
        if let Some(held) = held {
            self.cold_index.insert(held);
        }
        record_change(&mut self.hot_index, change);
    }
}
