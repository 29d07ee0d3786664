//! Run reports and outcomes.

use std::fmt;

use serde::Serialize;

use crate::diff::{Change, Unreadable};
use crate::fingerprint::Fingerprint;

/// Overall result of a run, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Nothing to do, nothing wrong.
    Clean,
    /// Changes were applied, planned, or accepted.
    Changed,
    /// Something was left undone: anomalies, unreadable files, failed or
    /// skipped changes.
    Attention,
    /// The cold tree no longer matches its index.
    Violation,
}

impl Outcome {
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Changed => 10,
            Self::Attention => 11,
            Self::Violation => 12,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Changed => "changed",
            Self::Attention => "attention",
            Self::Violation => "violation",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// Content differs from the record.
    Modified,
    /// Indexed file is gone.
    Missing,
    /// Indexed content now lives at another path.
    Relocated { to: String },
    /// File could not be read.
    Unreadable { message: String },
}

/// A cold file that no longer matches its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityViolation {
    pub path: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
    pub expected: Option<Fingerprint>,
    pub observed: Option<Fingerprint>,
}

/// A file in the cold tree that its index does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub path: String,
    pub size: u64,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub tree: String,
    pub files: usize,
    pub bytes: u64,
    pub hashed_files: usize,
    pub hashed_bytes: u64,
    pub deep: bool,
    pub violations: Vec<IntegrityViolation>,
    pub anomalies: Vec<Anomaly>,
    /// Records whose metadata was refreshed.
    pub refreshed: usize,
    /// Whether the observed state was written into the index.
    pub accepted: bool,
}

impl CheckReport {
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        let unresolved = self
            .violations
            .iter()
            .any(|v| !self.accepted || matches!(v.kind, ViolationKind::Unreadable { .. }));
        if unresolved {
            Outcome::Violation
        } else if self.accepted && (!self.violations.is_empty() || !self.anomalies.is_empty()) {
            Outcome::Changed
        } else if !self.anomalies.is_empty() {
            Outcome::Attention
        } else {
            Outcome::Clean
        }
    }
}

/// Why a change was not mirrored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConflictReason {
    /// An indexed cold file is gone.
    Missing { path: String },
    /// A cold file's content no longer matches what the change expects.
    Diverged {
        path: String,
        expected: Fingerprint,
        observed: Fingerprint,
    },
    /// A file the cold index does not know occupies the path.
    Unexpected { path: String, observed: Fingerprint },
    /// A directory stands where the change needs a file.
    Occupied { path: String },
}

impl ConflictReason {
    /// Missing or diverged cold files are corruption; an unexpected file or
    /// directory is merely in the way.
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Missing { .. } | Self::Diverged { .. })
    }

    /// The cold path the conflict is about.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Missing { path }
            | Self::Diverged { path, .. }
            | Self::Unexpected { path, .. }
            | Self::Occupied { path } => path,
        }
    }

    /// The damage a repair would fix, for corruption.
    #[must_use]
    pub fn damage(&self) -> Option<Damage> {
        match self {
            Self::Missing { .. } => Some(Damage::Missing),
            Self::Diverged { observed, .. } => Some(Damage::Diverged {
                observed: observed.clone(),
            }),
            Self::Unexpected { .. } | Self::Occupied { .. } => None,
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { path } => write!(f, "cold file {path} is missing"),
            Self::Diverged {
                path,
                expected,
                observed,
            } => write!(
                f,
                "cold file {path} diverged (expected {}, found {})",
                expected.short(),
                observed.short()
            ),
            Self::Unexpected { path, observed } => write!(
                f,
                "unindexed file {path} already in cold tree ({})",
                observed.short()
            ),
            Self::Occupied { path } => write!(f, "cold path {path} is a directory"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub change: Change,
    pub reason: ConflictReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub change: Change,
    pub message: String,
}

/// What was wrong with a cold file that sync rewrote from hot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "damage", rename_all = "snake_case")]
pub enum Damage {
    Missing,
    Diverged { observed: Fingerprint },
    Unreadable { message: String },
}

/// A damaged cold file restored from the hot tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repair {
    pub path: String,
    #[serde(flatten)]
    pub damage: Damage,
    /// The fingerprint the path holds again.
    pub restored: Fingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub hot: String,
    pub cold: String,
    pub dry_run: bool,
    pub hashed_files: usize,
    pub hashed_bytes: u64,
    /// Changes mirrored onto the cold tree, or planned in a dry run.
    pub applied: Vec<Change>,
    /// Changes the cold tree already reflected.
    pub already_applied: Vec<Change>,
    pub conflicts: Vec<Conflict>,
    pub failures: Vec<Failure>,
    /// Changes not attempted because the run was cancelled.
    pub skipped: Vec<Change>,
    /// Changes turned down at the confirmation prompt.
    pub declined: Vec<Change>,
    /// Damaged cold files rewritten from hot, or planned in a dry run.
    pub repaired: Vec<Repair>,
    /// Hot files that could not be fingerprinted.
    pub unreadable: Vec<Unreadable>,
    pub refreshed: usize,
}

impl SyncReport {
    pub(crate) fn new(hot: String, cold: String, dry_run: bool) -> Self {
        Self {
            hot,
            cold,
            dry_run,
            hashed_files: 0,
            hashed_bytes: 0,
            applied: Vec::new(),
            already_applied: Vec::new(),
            conflicts: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            declined: Vec::new(),
            repaired: Vec::new(),
            unreadable: Vec::new(),
            refreshed: 0,
        }
    }

    #[must_use]
    pub fn outcome(&self) -> Outcome {
        if self.conflicts.iter().any(|c| c.reason.is_corruption()) {
            Outcome::Violation
        } else if !self.conflicts.is_empty()
            || !self.failures.is_empty()
            || !self.skipped.is_empty()
            || !self.declined.is_empty()
            || !self.unreadable.is_empty()
        {
            Outcome::Attention
        } else if !self.applied.is_empty()
            || !self.already_applied.is_empty()
            || !self.repaired.is_empty()
        {
            Outcome::Changed
        } else {
            Outcome::Clean
        }
    }
}
