//! Filesystem-backed tree.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::index::{FileMeta, Timestamp, temp_path, timestamp_from, validate_rel_path};
use crate::scan::{Exclude, NoExclusions, Snapshot, scan_dir};
use crate::tree::Tree;

/// Suffix of files being written. A crash can leave one behind; scans skip
/// them and the next write of the same path replaces it.
pub const PARTIAL_SUFFIX: &str = ".dintact-partial";

/// Whether `path` has the `.<name>.dintact-partial` shape of a file this tree
/// writes. Anything else ending in the suffix belongs to the user.
fn is_partial(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(PARTIAL_SUFFIX))
        .is_some_and(|target| !target.is_empty())
}

/// A tree rooted at a directory on disk.
pub struct FsTree {
    root: PathBuf,
    reserved: Vec<String>,
    exclude: Box<dyn Exclude>,
}

impl std::fmt::Debug for FsTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsTree")
            .field("root", &self.root)
            .field("reserved", &self.reserved)
            .finish_non_exhaustive()
    }
}

impl FsTree {
    /// Open the tree at `root`. `index_file` (and its temporary sibling) are
    /// reserved and never scanned.
    ///
    /// # Errors
    ///
    /// Returns `TreeNotFound` if `root` is not a directory.
    pub fn new(root: impl Into<PathBuf>, index_file: &str) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::TreeNotFound { path: root });
        }
        let temp = temp_path(Path::new(index_file));
        let reserved = vec![index_file.to_string(), temp.to_string_lossy().into_owned()];
        Ok(Self {
            root,
            reserved,
            exclude: Box::new(NoExclusions),
        })
    }

    /// Use `exclude` to skip paths during scans.
    #[must_use]
    pub fn with_exclusions(mut self, exclude: Box<dyn Exclude>) -> Self {
        self.exclude = exclude;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn abs(&self, path: &str) -> Result<PathBuf> {
        validate_rel_path(path).map_err(Error::InvalidPath)?;
        Ok(self.root.join(path))
    }

    fn partial_path(target: &Path) -> PathBuf {
        let mut name = std::ffi::OsString::from(".");
        name.push(target.file_name().unwrap_or_default());
        name.push(PARTIAL_SUFFIX);
        target.with_file_name(name)
    }

    fn meta_of(path: &Path) -> Result<FileMeta> {
        let md = fs::metadata(path).map_err(|e| Error::io_at(path, e))?;
        let modified = md.modified().map_err(|e| Error::io_at(path, e))?;
        Ok(FileMeta {
            size: md.len(),
            modified: timestamp_from(modified),
        })
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
        }
        Ok(())
    }

    /// Remove now-empty directories from `path`'s parent up to the root.
    fn prune_empty_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(d).is_err() {
                break;
            }
            debug!(dir = %d.display(), "Removed empty directory");
            dir = d.parent();
        }
    }

    /// A root-level name for a file stepping aside during a rename that
    /// nothing occupies yet.
    fn free_staging(&self, from: &str) -> PathBuf {
        let base = format!(".{}", from.replace('/', "_"));
        let mut candidate = self.root.join(format!("{base}{PARTIAL_SUFFIX}"));
        let mut n = 1;
        while fs::symlink_metadata(&candidate).is_ok() {
            candidate = self.root.join(format!("{base}.{n}{PARTIAL_SUFFIX}"));
            n += 1;
        }
        candidate
    }

    fn move_file(src: &Path, dst: &Path) -> Result<()> {
        if let Err(e) = fs::rename(src, dst) {
            warn!(from = %src.display(), to = %dst.display(), error = %e, "Rename failed, copying instead");
            fs::copy(src, dst).map_err(|e| Error::io_at(dst, e))?;
            fs::remove_file(src).map_err(|e| Error::io_at(src, e))?;
        }
        Ok(())
    }
}

impl Tree for FsTree {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    fn locate(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn scan(&self) -> Result<Snapshot> {
        let snapshot = scan_dir(&self.root, self.exclude.as_ref(), &self.reserved)?;
        Ok(snapshot
            .iter()
            .filter(|(p, _)| {
                let partial = is_partial(p);
                if partial {
                    warn!(path = %p, "Ignoring partial write from an earlier run");
                }
                !partial
            })
            .map(|(p, m)| (p.to_string(), *m))
            .collect())
    }

    fn stat(&self, path: &str) -> Result<Option<FileMeta>> {
        let abs = self.abs(path)?;
        match fs::symlink_metadata(&abs) {
            Ok(md) if md.is_file() => Ok(Some(FileMeta {
                size: md.len(),
                modified: timestamp_from(md.modified().map_err(|e| Error::io_at(&abs, e))?),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io_at(abs, e)),
        }
    }

    fn is_dir(&self, path: &str) -> Result<bool> {
        let abs = self.abs(path)?;
        match fs::symlink_metadata(&abs) {
            Ok(md) => Ok(md.is_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io_at(abs, e)),
        }
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send + '_>> {
        let abs = self.abs(path)?;
        let file = File::open(&abs).map_err(|e| Error::io_at(&abs, e))?;
        Ok(Box::new(file))
    }

    fn write(
        &self,
        path: &str,
        content: &mut dyn Read,
        modified: Option<Timestamp>,
    ) -> Result<FileMeta> {
        let abs = self.abs(path)?;
        Self::ensure_parent(&abs)?;
        let partial = Self::partial_path(&abs);

        let written = (|| -> io::Result<()> {
            let mut file = File::create(&partial)?;
            io::copy(content, &mut file)?;
            if let Some(ts) = modified {
                file.set_modified(SystemTime::from(ts))?;
            }
            file.sync_all()
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(Error::io_at(&abs, e));
        }

        fs::rename(&partial, &abs).map_err(|e| {
            let _ = fs::remove_file(&partial);
            Error::io_at(&abs, e)
        })?;
        Self::meta_of(&abs)
    }

    fn remove(&self, path: &str) -> Result<()> {
        let abs = self.abs(path)?;
        fs::remove_file(&abs).map_err(|e| Error::io_at(&abs, e))?;
        self.prune_empty_parents(&abs);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<FileMeta> {
        let src = self.abs(from)?;
        let dst = self.abs(to)?;

        // A file moving into or out of a directory named like itself has to
        // step aside first.
        let nested = to.starts_with(&format!("{from}/")) || from.starts_with(&format!("{to}/"));
        if nested {
            let staging = self.free_staging(from);
            Self::move_file(&src, &staging)?;
            self.prune_empty_parents(&src);
            let placed = Self::ensure_parent(&dst).and_then(|()| Self::move_file(&staging, &dst));
            if let Err(e) = placed {
                let restored =
                    Self::ensure_parent(&src).and_then(|()| Self::move_file(&staging, &src));
                if restored.is_err() {
                    warn!(staging = %staging.display(), "Cannot put file back after failed rename");
                }
                return Err(e);
            }
        } else {
            Self::ensure_parent(&dst)?;
            Self::move_file(&src, &dst)?;
            self.prune_empty_parents(&src);
        }
        Self::meta_of(&dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::parse_timestamp;
    use crate::scan::IgnoreRules;
    use tempfile::TempDir;

    fn read(tree: &FsTree, path: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        tree.open(path).unwrap().read_to_end(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_missing_root_is_tree_not_found() {
        let dir = TempDir::new().unwrap();
        let result = FsTree::new(dir.path().join("nope"), "index.txt");
        assert!(matches!(result, Err(Error::TreeNotFound { .. })));
    }

    #[test]
    fn test_write_creates_parents_and_sets_mtime() {
        let dir = TempDir::new().unwrap();
        let tree = FsTree::new(dir.path(), "index.txt").unwrap();
        let ts = parse_timestamp("2021-06-01T10:00:00Z").unwrap();

        let meta = tree.write("a/b/c.txt", &mut &b"hello"[..], Some(ts)).unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.modified, ts);
        assert_eq!(read(&tree, "a/b/c.txt"), b"hello");
        assert_eq!(tree.stat("a/b/c.txt").unwrap(), Some(meta));
    }

    #[test]
    fn test_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let tree = FsTree::new(dir.path(), "index.txt").unwrap();
        tree.write("f", &mut &b"old content"[..], None).unwrap();
        tree.write("f", &mut &b"new"[..], None).unwrap();
        assert_eq!(read(&tree, "f"), b"new");
        assert_eq!(tree.scan().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_prunes_empty_dirs() {
        let dir = TempDir::new().unwrap();
        let tree = FsTree::new(dir.path(), "index.txt").unwrap();
        tree.write("x/y/z.bin", &mut &b"z"[..], None).unwrap();
        tree.write("x/keep.bin", &mut &b"k"[..], None).unwrap();

        tree.remove("x/y/z.bin").unwrap();
        assert!(!dir.path().join("x/y").exists());
        assert!(dir.path().join("x/keep.bin").exists());
        assert_eq!(tree.stat("x/y/z.bin").unwrap(), None);
    }

    #[test]
    fn test_rename_into_own_name_as_directory() {
        let dir = TempDir::new().unwrap();
        let tree = FsTree::new(dir.path(), "index.txt").unwrap();
        tree.write("a", &mut &b"payload"[..], None).unwrap();

        tree.rename("a", "a/inner").unwrap();
        assert_eq!(read(&tree, "a/inner"), b"payload");

        tree.rename("a/inner", "a").unwrap();
        assert_eq!(read(&tree, "a"), b"payload");
        assert!(dir.path().join("a").is_file());
    }

    #[test]
    fn test_scan_skips_index_partials_and_exclusions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("index.txt"), b"#").unwrap();
        fs::write(root.join("index.txt.tmp"), b"#").unwrap();
        fs::write(root.join(format!(".f{PARTIAL_SUFFIX}")), b"half").unwrap();
        fs::write(root.join("f"), b"full").unwrap();
        fs::write(root.join("skip.log"), b"log").unwrap();

        let rules = IgnoreRules::from_patterns(root, &["*.log".to_string()]).unwrap();
        let tree = FsTree::new(root, "index.txt").unwrap().with_exclusions(Box::new(rules));
        let snapshot = tree.scan().unwrap();
        let paths: Vec<_> = snapshot.iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(paths, ["f"]);
    }

    #[test]
    fn test_user_files_with_the_partial_suffix_are_scanned() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join(format!("notes{PARTIAL_SUFFIX}")), b"mine").unwrap();
        fs::write(root.join(format!(".notes{PARTIAL_SUFFIX}")), b"half").unwrap();
        fs::write(root.join(PARTIAL_SUFFIX), b"also mine").unwrap();

        let tree = FsTree::new(root, "index.txt").unwrap();
        let snapshot = tree.scan().unwrap();
        let mut paths: Vec<_> = snapshot.iter().map(|(p, _)| p.to_string()).collect();
        paths.sort();
        assert_eq!(paths, [PARTIAL_SUFFIX.to_string(), format!("notes{PARTIAL_SUFFIX}")]);
    }

    #[test]
    fn test_nested_rename_steps_around_an_occupied_staging_name() {
        let dir = TempDir::new().unwrap();
        let tree = FsTree::new(dir.path(), "index.txt").unwrap();
        let squatter = dir.path().join(format!(".a{PARTIAL_SUFFIX}"));
        fs::write(&squatter, b"left over").unwrap();
        tree.write("a", &mut &b"payload"[..], None).unwrap();

        tree.rename("a", "a/inner").unwrap();
        assert_eq!(read(&tree, "a/inner"), b"payload");
        assert_eq!(fs::read(&squatter).unwrap(), b"left over");
    }

    #[test]
    fn test_failed_nested_rename_puts_the_file_back() {
        let dir = TempDir::new().unwrap();
        let tree = FsTree::new(dir.path(), "index.txt").unwrap();
        tree.write("d/a", &mut &b"payload"[..], None).unwrap();
        tree.write("d/stray", &mut &b"other"[..], None).unwrap();

        assert!(tree.rename("d/a", "d").is_err());
        assert_eq!(read(&tree, "d/a"), b"payload");
        assert_eq!(read(&tree, "d/stray"), b"other");
        assert_eq!(tree.scan().unwrap().len(), 2);
    }

    #[test]
    fn test_is_dir_tells_directories_from_files() {
        let dir = TempDir::new().unwrap();
        let tree = FsTree::new(dir.path(), "index.txt").unwrap();
        tree.write("q/r", &mut &b"r"[..], None).unwrap();
        assert!(tree.is_dir("q").unwrap());
        assert!(!tree.is_dir("q/r").unwrap());
        assert!(!tree.is_dir("nothing").unwrap());
        assert_eq!(tree.stat("q").unwrap(), None);
    }

    #[test]
    fn test_write_onto_a_directory_fails_and_keeps_it() {
        let dir = TempDir::new().unwrap();
        let tree = FsTree::new(dir.path(), "index.txt").unwrap();
        tree.write("q/r", &mut &b"r"[..], None).unwrap();

        assert!(tree.write("q", &mut &b"file"[..], None).is_err());
        assert_eq!(read(&tree, "q/r"), b"r");
        assert!(!dir.path().join(format!(".q{PARTIAL_SUFFIX}")).exists());
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let tree = FsTree::new(dir.path(), "index.txt").unwrap();
        assert!(matches!(tree.open("../etc/passwd"), Err(Error::InvalidPath(_))));
    }
}
