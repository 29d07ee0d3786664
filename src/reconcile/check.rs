//! Check mode: verify a cold tree against its own index.
//!
//! Nothing but sync writes into a cold tree, so every unexplained difference
//! is a finding. Modified, missing and relocated files are integrity
//! violations; an unknown new file is only an anomaly. The tree is only ever
//! read.

use tracing::{info, warn};

use crate::diff::Change;
use crate::error::Result;
use crate::index::IndexStore;
use crate::reconcile::report::{Anomaly, CheckReport, IntegrityViolation, ViolationKind};
use crate::reconcile::{CheckOptions, CheckOutcome, Reconciler, record_change};
use crate::tree::Tree;

impl Reconciler<'_> {
    /// Verify `cold` against `index`.
    ///
    /// Metadata-only drift is refreshed in the returned index. With
    /// `accept`, every finding except unreadable files is also written into
    /// it, making the observed state the new baseline.
    ///
    /// # Errors
    ///
    /// Fails only if the tree cannot be scanned; per-file read errors become
    /// violations.
    pub fn check(
        &self,
        cold: &dyn Tree,
        mut index: IndexStore,
        options: CheckOptions,
    ) -> Result<CheckOutcome> {
        let snapshot = self.scan(cold)?;
        let diff = self.differ(cold, index.algorithm()).diff(&index, &snapshot);

        let mut violations = Vec::new();
        let mut anomalies = Vec::new();
        for change in &diff.changes {
            match change {
                Change::Modify { old, new } => violations.push(IntegrityViolation {
                    path: old.path.clone(),
                    kind: ViolationKind::Modified,
                    expected: Some(old.fingerprint.clone()),
                    observed: Some(new.fingerprint.clone()),
                }),
                Change::Delete { record } => violations.push(IntegrityViolation {
                    path: record.path.clone(),
                    kind: ViolationKind::Missing,
                    expected: Some(record.fingerprint.clone()),
                    observed: None,
                }),
                Change::Move { from, to } => violations.push(IntegrityViolation {
                    path: from.path.clone(),
                    kind: ViolationKind::Relocated {
                        to: to.path.clone(),
                    },
                    expected: Some(from.fingerprint.clone()),
                    observed: Some(to.fingerprint.clone()),
                }),
                Change::Insert { record } => anomalies.push(Anomaly {
                    path: record.path.clone(),
                    size: record.size,
                    fingerprint: record.fingerprint.clone(),
                }),
            }
        }
        for bad in &diff.unreadable {
            violations.push(IntegrityViolation {
                path: bad.path.clone(),
                kind: ViolationKind::Unreadable {
                    message: bad.message.clone(),
                },
                expected: index.get(&bad.path).map(|r| r.fingerprint.clone()),
                observed: None,
            });
        }
        violations.sort_by(|a, b| a.path.cmp(&b.path));

        for v in &violations {
            warn!(
                path = %v.path,
                kind = ?v.kind,
                expected = v.expected.as_ref().map(|f| f.short()),
                observed = v.observed.as_ref().map(|f| f.short()),
                "Integrity violation"
            );
        }
        for a in &anomalies {
            warn!(path = %a.path, size = a.size, "Unexpected file in cold tree");
        }

        diff.refresh(&mut index);
        let mut index_changed = !diff.refreshed.is_empty();
        if options.accept && !diff.changes.is_empty() {
            for change in &diff.changes {
                record_change(&mut index, change);
            }
            index_changed = true;
            info!(changes = diff.changes.len(), "Accepted observed state into index");
        }

        let report = CheckReport {
            tree: cold.describe(),
            files: snapshot.len(),
            bytes: snapshot.total_size(),
            hashed_files: diff.hashed_files,
            hashed_bytes: diff.hashed_bytes,
            deep: self.deep,
            violations,
            anomalies,
            refreshed: diff.refreshed.len(),
            accepted: options.accept,
        };
        info!(
            tree = %report.tree,
            files = report.files,
            violations = report.violations.len(),
            anomalies = report.anomalies.len(),
            outcome = %report.outcome(),
            "Check complete"
        );
        Ok(CheckOutcome {
            report,
            index,
            index_changed,
        })
    }
}
