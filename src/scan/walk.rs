//! Filesystem walker.
//!
//! Yields every regular file under a root as a lazy sequence of
//! `(path, meta)` pairs. Symbolic links are never followed and never
//! reported: a link can form a cycle or make one file appear twice, and the
//! archive is expected to hold plain files. Fingerprints are not computed
//! here; the differ asks for them only when metadata cannot prove a file
//! unchanged.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::index::{FileMeta, rel_path_string, timestamp_from};
use crate::scan::Snapshot;
use crate::scan::exclude::Exclude;

/// One scanned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub path: String,
    pub meta: FileMeta,
}

/// Lazy walk over the regular files of one tree.
pub struct Walk<'a> {
    root: PathBuf,
    inner: walkdir::IntoIter,
    exclude: &'a dyn Exclude,
    reserved: &'a [String],
}

impl<'a> Walk<'a> {
    /// Start a walk at `root`.
    ///
    /// `reserved` lists tree-relative paths that belong to dintact itself
    /// (the index file and its temporary sibling) and are never reported.
    pub fn new(root: &Path, exclude: &'a dyn Exclude, reserved: &'a [String]) -> Self {
        let inner = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Self {
            root: root.to_path_buf(),
            inner,
            exclude,
            reserved,
        }
    }

    fn relative(&self, path: &Path) -> Result<String> {
        path.strip_prefix(&self.root)
            .ok()
            .and_then(rel_path_string)
            .ok_or_else(|| Error::InvalidPath(path.display().to_string()))
    }
}

impl Iterator for Walk<'_> {
    type Item = Result<ScanEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map_or_else(|| self.root.clone(), Path::to_path_buf);
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("filesystem loop"));
                    return Some(Err(Error::io_at(path, source)));
                }
            };

            let file_type = entry.file_type();
            if file_type.is_symlink() {
                trace!(path = %entry.path().display(), "Skipping symlink");
                continue;
            }

            let rel = match self.relative(entry.path()) {
                Ok(rel) => rel,
                Err(e) => return Some(Err(e)),
            };

            if file_type.is_dir() {
                if self.exclude.is_excluded(&rel, true) {
                    debug!(path = %rel, "Excluded directory");
                    self.inner.skip_current_dir();
                }
                continue;
            }
            if !file_type.is_file() {
                trace!(path = %rel, "Skipping special file");
                continue;
            }
            if self.reserved.iter().any(|r| *r == rel) || self.exclude.is_excluded(&rel, false) {
                trace!(path = %rel, "Excluded file");
                continue;
            }

            let meta = entry
                .metadata()
                .map_err(|e| {
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("metadata unavailable"));
                    Error::io_at(entry.path(), source)
                })
                .and_then(|md| {
                    let modified = md.modified().map_err(|e| Error::io_at(entry.path(), e))?;
                    Ok(FileMeta {
                        size: md.len(),
                        modified: timestamp_from(modified),
                    })
                });

            return Some(meta.map(|meta| ScanEntry { path: rel, meta }));
        }
    }
}

/// Walk `root` to completion and collect a snapshot.
///
/// # Errors
///
/// Returns the first error met: an unreadable directory, a file whose
/// metadata vanished, or a non-UTF-8 name.
pub fn scan_dir(root: &Path, exclude: &dyn Exclude, reserved: &[String]) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    for entry in Walk::new(root, exclude, reserved) {
        let entry = entry?;
        snapshot.insert(entry.path, entry.meta);
    }
    debug!(root = %root.display(), files = snapshot.len(), "Scan complete");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::exclude::{IgnoreRules, NoExclusions};
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::create_dir_all(root.join("cache")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("top.txt"), b"top").unwrap();
        fs::write(root.join("a/one.bin"), b"1").unwrap();
        fs::write(root.join("a/b/two.bin"), b"22").unwrap();
        fs::write(root.join("cache/junk"), b"junk").unwrap();
        fs::write(root.join("index.txt"), b"# index").unwrap();
        dir
    }

    #[test]
    fn test_walk_is_sorted_and_relative() {
        let dir = tree();
        let paths: Vec<String> = Walk::new(dir.path(), &NoExclusions, &[])
            .map(|e| e.unwrap().path)
            .collect();
        assert_eq!(
            paths,
            ["a/b/two.bin", "a/one.bin", "cache/junk", "index.txt", "top.txt"]
        );
    }

    #[test]
    fn test_scan_records_size_and_skips_reserved() {
        let dir = tree();
        let rules = IgnoreRules::from_patterns(dir.path(), &["cache/".to_string()]).unwrap();
        let reserved = vec!["index.txt".to_string()];

        let snapshot = scan_dir(dir.path(), &rules, &reserved).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get("a/b/two.bin").unwrap().size, 2);
        assert!(!snapshot.contains("cache/junk"));
        assert!(!snapshot.contains("index.txt"));
    }

    #[test]
    fn test_missing_root_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = scan_dir(&dir.path().join("gone"), &NoExclusions, &[]);
        assert!(matches!(result, Err(Error::IoAt { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_skipped() {
        let dir = tree();
        std::os::unix::fs::symlink(dir.path().join("a"), dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("top.txt"), dir.path().join("alias.txt"))
            .unwrap();

        let snapshot = scan_dir(dir.path(), &NoExclusions, &[]).unwrap();
        assert!(!snapshot.contains("alias.txt"));
        assert!(snapshot.iter().all(|(p, _)| !p.starts_with("loop")));
    }
}
