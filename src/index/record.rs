//! File records and tree-relative paths.

use std::path::{Component, Path};
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::fingerprint::Fingerprint;

/// Modification time as recorded in an index.
pub type Timestamp = DateTime<Utc>;

/// Convert a filesystem time to a [`Timestamp`].
#[must_use]
pub fn timestamp_from(time: SystemTime) -> Timestamp {
    DateTime::<Utc>::from(time)
}

/// Canonical text form used in the index file (RFC 3339, nanoseconds, `Z`).
#[must_use]
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse the canonical text form.
///
/// # Errors
///
/// Returns the parser message for anything that is not RFC 3339.
pub fn parse_timestamp(s: &str) -> Result<Timestamp, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{s}': {e}"))
}

/// Size and modification time of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileMeta {
    pub size: u64,
    pub modified: Timestamp,
}

/// One indexed file.
///
/// `path` is relative to the tree root and always uses `/`, so an index stays
/// valid when the archive is mounted somewhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    pub modified: Timestamp,
    pub fingerprint: Fingerprint,
}

impl FileRecord {
    #[must_use]
    pub fn new(path: impl Into<String>, meta: FileMeta, fingerprint: Fingerprint) -> Self {
        Self {
            path: path.into(),
            size: meta.size,
            modified: meta.modified,
            fingerprint,
        }
    }

    #[must_use]
    pub fn meta(&self) -> FileMeta {
        FileMeta {
            size: self.size,
            modified: self.modified,
        }
    }

    /// Same record under a different path.
    #[must_use]
    pub fn renamed(&self, path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..self.clone()
        }
    }
}

/// Check that `path` is a normalized tree-relative path.
///
/// # Errors
///
/// Returns a message describing the first problem found.
pub fn validate_rel_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("empty path".to_string());
    }
    if path.starts_with('/') {
        return Err(format!("absolute path '{path}'"));
    }
    for part in path.split('/') {
        match part {
            "" => return Err(format!("empty component in '{path}'")),
            "." | ".." => return Err(format!("relative component in '{path}'")),
            _ => {}
        }
    }
    Ok(())
}

/// Render a relative filesystem path in index form.
///
/// Returns `None` for non-UTF-8 names or anything other than plain
/// components.
#[must_use]
pub fn rel_path_string(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_str()?),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_timestamp_round_trip_keeps_nanos() {
        let ts = parse_timestamp("2024-03-01T12:30:45.123456789Z").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01T12:30:45.123456789Z");
    }

    #[test]
    fn test_timestamp_normalizes_offset() {
        let ts = parse_timestamp("2024-03-01T14:30:45+02:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01T12:30:45.000000000Z");
    }

    #[test]
    fn test_validate_rel_path() {
        assert!(validate_rel_path("photos/2019/a.jpg").is_ok());
        assert!(validate_rel_path("with space.txt").is_ok());
        assert!(validate_rel_path("/etc/passwd").is_err());
        assert!(validate_rel_path("a//b").is_err());
        assert!(validate_rel_path("a/../b").is_err());
        assert!(validate_rel_path("").is_err());
    }

    #[test]
    fn test_rel_path_string_uses_forward_slashes() {
        let p: PathBuf = ["docs", "tax", "2020.pdf"].iter().collect();
        assert_eq!(rel_path_string(&p).as_deref(), Some("docs/tax/2020.pdf"));
        assert_eq!(rel_path_string(Path::new("")), None);
        assert_eq!(rel_path_string(Path::new("../x")), None);
    }
}
