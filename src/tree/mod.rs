//! Tracked trees.
//!
//! The reconciler never touches the filesystem directly; it goes through a
//! [`Tree`], which keeps check and sync testable against [`MemoryTree`] and
//! confines path joining and temp-file handling to [`FsTree`].

mod fs;
mod memory;

use std::io::Read;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, Fingerprinter};
use crate::index::{FileMeta, Timestamp};
use crate::scan::Snapshot;

pub use fs::{FsTree, PARTIAL_SUFFIX};
pub use memory::MemoryTree;

/// A directory tree addressed by tree-relative `/`-separated paths.
pub trait Tree: Sync {
    /// Human-readable location, for logs and reports.
    fn describe(&self) -> String;

    /// Absolute location of `path`, for error messages.
    fn locate(&self, path: &str) -> PathBuf;

    /// Scan every included regular file.
    ///
    /// # Errors
    ///
    /// Fails if any directory cannot be read.
    fn scan(&self) -> Result<Snapshot>;

    /// Metadata of a regular file, `None` if absent.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors other than not-found.
    fn stat(&self, path: &str) -> Result<Option<FileMeta>>;

    /// Whether `path` is a directory.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors other than not-found.
    fn is_dir(&self, path: &str) -> Result<bool>;

    /// Open a file for reading.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send + '_>>;

    /// Replace `path` with everything `content` yields, creating parent
    /// directories. The previous file, if any, stays intact until the new
    /// content is complete. `modified` sets the modification time.
    ///
    /// # Errors
    ///
    /// Fails if reading `content` or writing the file fails.
    fn write(
        &self,
        path: &str,
        content: &mut dyn Read,
        modified: Option<Timestamp>,
    ) -> Result<FileMeta>;

    /// Delete a file and any parent directories it leaves empty.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be removed.
    fn remove(&self, path: &str) -> Result<()>;

    /// Move a file within the tree, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails if neither a rename nor a copy+remove succeeds.
    fn rename(&self, from: &str, to: &str) -> Result<FileMeta>;
}

/// Fingerprint one file of `tree`. Returns the digest and bytes read.
///
/// # Errors
///
/// Fails if the file cannot be opened or a read fails part-way.
pub fn fingerprint_file(
    tree: &dyn Tree,
    fingerprinter: &Fingerprinter,
    path: &str,
) -> Result<(Fingerprint, u64)> {
    let reader = tree.open(path)?;
    fingerprinter
        .digest(reader)
        .map_err(|e| Error::io_at(tree.locate(path), e))
}
