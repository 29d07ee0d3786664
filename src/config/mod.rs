//! Configuration management.
//!
//! Settings live in an optional JSON file. Each value resolves with this
//! priority:
//! 1. command-line flag (clap folds `DINTACT_JOBS` and `DINTACT_DEEP` into
//!    the flags, so the environment ranks here too)
//! 2. settings file: `--config`, `$DINTACT_CONFIG`, or
//!    `<config dir>/dintact/config.json`
//! 3. built-in default

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fingerprint::{Algorithm, DEFAULT_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::index::{DEFAULT_INDEX_FILE, validate_rel_path};

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "DINTACT_CONFIG";

/// Contents of the settings file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Algorithm for new indexes. Existing indexes keep their own.
    pub algorithm: Option<Algorithm>,
    pub chunk_size: Option<usize>,
    pub jobs: Option<usize>,
    pub deep: Option<bool>,
    pub index_file: Option<String>,
    pub exclude: Vec<String>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub algorithm: Option<Algorithm>,
    pub jobs: Option<usize>,
    pub deep: bool,
    pub exclude: Vec<String>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    pub algorithm: Algorithm,
    pub chunk_size: usize,
    pub jobs: usize,
    pub deep: bool,
    pub index_file: String,
    pub exclude: Vec<String>,
}

/// Default settings file location.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.config_dir().join("dintact").join("config.json"))
}

/// Load settings.
///
/// An explicit path (flag or `$DINTACT_CONFIG`) must exist; the default
/// location is optional.
///
/// # Errors
///
/// Returns `Config` if the file cannot be read or parsed.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(Error::Config(format!(
                "Settings file not found: {}",
                path.display()
            )));
        }
        return read_settings(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => read_settings(&path),
        _ => Ok(Settings::default()),
    }
}

/// Read and parse one settings file.
///
/// # Errors
///
/// Returns `Config` if the file cannot be read or is not valid settings JSON.
pub fn read_settings(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read {}: {e}", path.display()))
    })?;
    let settings: Settings = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse {}: {e}", path.display()))
    })?;
    debug!(path = %path.display(), "Loaded settings");
    Ok(settings)
}

impl Settings {
    /// Merge with command-line values and fill in defaults.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an out-of-range chunk size or an index file name
    /// that is not a plain relative path.
    pub fn resolve(&self, overrides: &Overrides) -> Result<Resolved> {
        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        if chunk_size < MIN_CHUNK_SIZE {
            return Err(Error::Config(format!(
                "chunk_size must be at least {MIN_CHUNK_SIZE} bytes, got {chunk_size}"
            )));
        }

        let index_file = self
            .index_file
            .clone()
            .unwrap_or_else(|| DEFAULT_INDEX_FILE.to_string());
        validate_rel_path(&index_file)
            .map_err(|e| Error::Config(format!("index_file '{index_file}': {e}")))?;

        let jobs = match overrides.jobs.or(self.jobs) {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
        };

        let mut exclude = self.exclude.clone();
        exclude.extend(overrides.exclude.iter().cloned());

        Ok(Resolved {
            algorithm: overrides.algorithm.or(self.algorithm).unwrap_or_default(),
            chunk_size,
            jobs,
            deep: overrides.deep || self.deep.unwrap_or(false),
            index_file,
            exclude,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let resolved = Settings::default().resolve(&Overrides::default()).unwrap();
        assert_eq!(resolved.algorithm, Algorithm::Xxh128);
        assert_eq!(resolved.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(resolved.index_file, "index.txt");
        assert!(resolved.jobs >= 1);
        assert!(!resolved.deep);
    }

    #[test]
    fn test_flags_beat_file() {
        let settings = Settings {
            algorithm: Some(Algorithm::Sha256),
            jobs: Some(2),
            deep: Some(false),
            exclude: vec!["*.tmp".into()],
            ..Settings::default()
        };
        let overrides = Overrides {
            algorithm: Some(Algorithm::Xxh128),
            jobs: Some(7),
            deep: true,
            exclude: vec!["cache/".into()],
        };
        let resolved = settings.resolve(&overrides).unwrap();
        assert_eq!(resolved.algorithm, Algorithm::Xxh128);
        assert_eq!(resolved.jobs, 7);
        assert!(resolved.deep);
        assert_eq!(resolved.exclude, ["*.tmp", "cache/"]);

        let from_file = settings.resolve(&Overrides::default()).unwrap();
        assert_eq!(from_file.algorithm, Algorithm::Sha256);
        assert_eq!(from_file.jobs, 2);
    }

    #[test]
    fn test_rejects_bad_values() {
        let tiny = Settings {
            chunk_size: Some(16),
            ..Settings::default()
        };
        assert!(matches!(tiny.resolve(&Overrides::default()), Err(Error::Config(_))));

        let escaping = Settings {
            index_file: Some("../index.txt".into()),
            ..Settings::default()
        };
        assert!(matches!(escaping.resolve(&Overrides::default()), Err(Error::Config(_))));
    }

    #[test]
    fn test_read_settings_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"algorithm": "sha256", "jobs": 3, "exclude": ["Thumbs.db"]}"#,
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.algorithm, Some(Algorithm::Sha256));
        assert_eq!(settings.jobs, Some(3));
        assert_eq!(settings.exclude, ["Thumbs.db"]);
    }

    #[test]
    fn test_unknown_fields_and_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"algoritm": "sha256"}"#).unwrap();
        assert!(matches!(load_settings(Some(&path)), Err(Error::Config(_))));

        let missing = dir.path().join("nope.json");
        assert!(matches!(load_settings(Some(&missing)), Err(Error::Config(_))));
    }
}
