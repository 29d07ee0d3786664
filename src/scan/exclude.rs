//! Exclusion predicate.
//!
//! The scanner asks one question per path: is it excluded? Anything that can
//! answer it is an [`Exclude`]. [`IgnoreRules`] answers with gitignore-style
//! globs from the settings file and an optional `.dintactignore` at the tree
//! root.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};

use crate::error::{Error, Result};

/// Per-tree ignore file read by [`IgnoreRules::for_tree`].
pub const IGNORE_FILE: &str = ".dintactignore";

/// Decides whether a tree-relative path is skipped.
pub trait Exclude: Sync {
    /// `path` is relative to the tree root and uses `/`.
    fn is_excluded(&self, path: &str, is_dir: bool) -> bool;
}

impl<F> Exclude for F
where
    F: Fn(&str, bool) -> bool + Sync,
{
    fn is_excluded(&self, path: &str, is_dir: bool) -> bool {
        self(path, is_dir)
    }
}

/// Excludes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExclusions;

impl Exclude for NoExclusions {
    fn is_excluded(&self, _path: &str, _is_dir: bool) -> bool {
        false
    }
}

/// Gitignore-style exclusion rules.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    matcher: Gitignore,
}

impl IgnoreRules {
    /// Rules from explicit patterns only.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a malformed glob.
    pub fn from_patterns(root: &Path, patterns: &[String]) -> Result<Self> {
        Self::build(GitignoreBuilder::new(root), patterns)
    }

    /// Rules from `patterns` plus the tree's own `.dintactignore`, if any.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a pattern or the ignore file is malformed.
    pub fn for_tree(root: &Path, patterns: &[String]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        let ignore_file = root.join(IGNORE_FILE);
        if ignore_file.is_file() {
            if let Some(e) = builder.add(&ignore_file) {
                return Err(Error::InvalidArgument(format!(
                    "{}: {e}",
                    ignore_file.display()
                )));
            }
        }
        Self::build(builder, patterns)
    }

    fn build(mut builder: GitignoreBuilder, patterns: &[String]) -> Result<Self> {
        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| Error::InvalidArgument(format!("exclude pattern '{pattern}': {e}")))?;
        }
        let matcher = builder
            .build()
            .map_err(|e| Error::InvalidArgument(format!("exclude patterns: {e}")))?;
        Ok(Self { matcher })
    }
}

impl Exclude for IgnoreRules {
    fn is_excluded(&self, path: &str, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_patterns_match_files_and_dirs() {
        let rules = IgnoreRules::from_patterns(
            Path::new("/archive"),
            &["*.tmp".to_string(), "cache/".to_string(), "!keep.tmp".to_string()],
        )
        .unwrap();

        assert!(rules.is_excluded("x.tmp", false));
        assert!(rules.is_excluded("deep/dir/x.tmp", false));
        assert!(!rules.is_excluded("keep.tmp", false));
        assert!(rules.is_excluded("cache", true));
        assert!(rules.is_excluded("cache/blob.bin", false));
        assert!(!rules.is_excluded("photos/a.jpg", false));
    }

    #[test]
    fn test_ignore_file_is_read() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(IGNORE_FILE), "# junk\nThumbs.db\n").unwrap();

        let rules = IgnoreRules::for_tree(dir.path(), &[]).unwrap();
        assert!(rules.is_excluded("pics/Thumbs.db", false));
        assert!(!rules.is_excluded("pics/a.png", false));
    }

    #[test]
    fn test_closure_predicate() {
        let only_hidden = |path: &str, _is_dir: bool| path.starts_with('.');
        assert!(only_hidden.is_excluded(".git", true));
        assert!(!only_hidden.is_excluded("src", true));
        assert!(!NoExclusions.is_excluded("anything", false));
    }
}
