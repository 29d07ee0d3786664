//! Progress events.
//!
//! The engine reports what it is doing through a callback and leaves
//! rendering to the caller. Events borrow from the engine, so a callback that
//! wants to keep one must copy what it needs.

use crate::diff::Change;
use crate::reconcile::ConflictReason;

/// One unit of progress.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// A tree scan finished.
    Scanned { tree: &'a str, files: usize, bytes: u64 },
    /// Fingerprinting of `files` files totalling `bytes` is about to start.
    Hashing { tree: &'a str, files: usize, bytes: u64 },
    /// A file was fingerprinted.
    Hashed { path: &'a str, bytes: u64 },
    /// A change was mirrored onto the cold tree.
    Applied { change: &'a Change },
    /// The cold tree already held the change's target state.
    AlreadyApplied { change: &'a Change },
    /// A change was skipped because the cold tree diverged.
    Conflict {
        change: &'a Change,
        reason: &'a ConflictReason,
    },
    /// Applying a change failed.
    Failed { change: &'a Change, message: &'a str },
    /// A damaged cold file was rewritten from its hot copy.
    Repaired { path: &'a str },
}

/// Progress callback. Called from worker threads while hashing.
pub type Progress<'a> = &'a (dyn Fn(&Event<'_>) + Sync);

/// A callback that ignores everything.
pub fn silent(_event: &Event<'_>) {}
