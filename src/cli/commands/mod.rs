//! Command implementations.

pub mod check;
pub mod compare;
pub mod completions;
pub mod init;
pub mod sync;
pub mod version;

use std::path::{Path, PathBuf};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::cli::ScanArgs;
use crate::config::{Overrides, Resolved, Settings};
use crate::error::{Error, Result};
use crate::fingerprint::Algorithm;
use crate::index::{self, IndexStore};
use crate::scan::IgnoreRules;
use crate::tree::FsTree;

/// What every command needs besides its own arguments.
#[derive(Debug)]
pub struct Context {
    pub settings: Settings,
    pub json: bool,
    pub quiet: bool,
}

impl Context {
    /// Resolve settings against the flags of one command.
    ///
    /// # Errors
    ///
    /// Returns `Config` for invalid settings.
    pub fn resolve(
        &self,
        scan: &ScanArgs,
        algorithm: Option<Algorithm>,
        deep: bool,
    ) -> Result<Resolved> {
        self.settings.resolve(&Overrides {
            algorithm,
            jobs: scan.jobs,
            deep,
            exclude: scan.exclude.clone(),
        })
    }

    /// Whether human-readable output should be printed.
    #[must_use]
    pub const fn human(&self) -> bool {
        !self.json && !self.quiet
    }
}

/// Where the index of the tree at `root` lives.
#[must_use]
pub fn index_path(root: &Path, resolved: &Resolved) -> PathBuf {
    root.join(&resolved.index_file)
}

/// Open the tree at `root` with the configured exclusions.
///
/// # Errors
///
/// Returns `TreeNotFound` if `root` is not a directory, or an error if an
/// exclude pattern is invalid.
pub fn open_tree(root: &Path, resolved: &Resolved) -> Result<FsTree> {
    let tree = FsTree::new(root, &resolved.index_file)?;
    let rules = IgnoreRules::for_tree(root, &resolved.exclude)?;
    Ok(tree.with_exclusions(Box::new(rules)))
}

/// Load an index that must already exist.
///
/// # Errors
///
/// Returns `IndexNotFound` if there is no index file, or the load error.
pub fn load_existing(root: &Path, resolved: &Resolved) -> Result<IndexStore> {
    let path = index_path(root, resolved);
    if !path.is_file() {
        return Err(Error::IndexNotFound { path });
    }
    index::load(&path, root, resolved.algorithm)
}

/// Hashing pool sized by `--jobs`.
///
/// # Errors
///
/// Returns an error if the worker threads cannot be spawned.
pub fn hash_pool(jobs: usize) -> Result<ThreadPool> {
    debug!(jobs, "Starting hash pool");
    ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|i| format!("dintact-hash-{i}"))
        .build()
        .map_err(|e| Error::Other(format!("Failed to start hash pool: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> Context {
        Context {
            settings: Settings::default(),
            json: false,
            quiet: false,
        }
    }

    #[test]
    fn test_load_existing_requires_index() {
        let dir = TempDir::new().unwrap();
        let resolved = context().resolve(&ScanArgs::default(), None, false).unwrap();
        let err = load_existing(dir.path(), &resolved).unwrap_err();
        assert!(matches!(err, Error::IndexNotFound { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_open_tree_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let resolved = context().resolve(&ScanArgs::default(), None, false).unwrap();
        let err = open_tree(&dir.path().join("absent"), &resolved).unwrap_err();
        assert!(matches!(err, Error::TreeNotFound { .. }));
    }

    #[test]
    fn test_human_output_rules() {
        let mut ctx = context();
        assert!(ctx.human());
        ctx.json = true;
        assert!(!ctx.human());
        ctx.json = false;
        ctx.quiet = true;
        assert!(!ctx.human());
    }
}
