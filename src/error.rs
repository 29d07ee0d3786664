//! Error types for dintact.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=index, 3=not_found, 4=validation, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers
//!
//! Findings such as integrity violations and sync conflicts are not errors;
//! they travel in the reconcile reports and map to exit codes through
//! [`crate::reconcile::Outcome`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dintact operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Index (exit 2)
    IndexCorrupt,
    AlreadyInitialized,
    AlgorithmMismatch,

    // Not Found (exit 3)
    TreeNotFound,
    IndexNotFound,

    // Validation (exit 4)
    InvalidArgument,
    InvalidPath,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::IndexCorrupt => "INDEX_CORRUPT",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::AlgorithmMismatch => "ALGORITHM_MISMATCH",
            Self::TreeNotFound => "TREE_NOT_FOUND",
            Self::IndexNotFound => "INDEX_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidPath => "INVALID_PATH",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    ///
    /// Run outcomes (clean, changes applied, violations) use 0 and 10-12,
    /// so the two ranges never overlap.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::IndexCorrupt | Self::AlreadyInitialized | Self::AlgorithmMismatch => 2,
            Self::TreeNotFound | Self::IndexNotFound => 3,
            Self::InvalidArgument | Self::InvalidPath => 4,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether rerunning the same command may succeed.
    ///
    /// True for transient I/O. A corrupt index or a bad argument fails the
    /// same way every time.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::IoError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in dintact operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt index {} (line {line}): {message}", path.display())]
    IndexCorrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Index already exists at {}", path.display())]
    AlreadyInitialized { path: PathBuf },

    #[error("Index algorithm mismatch: hot uses {hot}, cold uses {cold}")]
    AlgorithmMismatch { hot: String, cold: String },

    #[error("Tree not found: {}", path.display())]
    TreeNotFound { path: PathBuf },

    #[error("No index at {}", path.display())]
    IndexNotFound { path: PathBuf },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoAt {
            path: path.into(),
            source,
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Io(_) | Self::IoAt { .. } => ErrorCode::IoError,
            Self::IndexCorrupt { .. } => ErrorCode::IndexCorrupt,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::AlgorithmMismatch { .. } => ErrorCode::AlgorithmMismatch,
            Self::TreeNotFound { .. } => ErrorCode::TreeNotFound,
            Self::IndexNotFound { .. } => ErrorCode::IndexNotFound,
            Self::InvalidPath(_) => ErrorCode::InvalidPath,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::IndexCorrupt { path, .. } => Some(format!(
                "The index at {} could not be parsed. Nothing was modified. \
                 Restore it from a known-good copy, or rebuild it with \
                 `dintact init --force` once the tree is verified by other means.",
                path.display()
            )),

            Self::AlreadyInitialized { path } => Some(format!(
                "An index already exists at {}. Use `--force` to rebuild it.",
                path.display()
            )),

            Self::AlgorithmMismatch { .. } => Some(
                "Both trees must be indexed with the same algorithm. \
                 Rebuild one index with `dintact init --force --algorithm <name>`."
                    .to_string(),
            ),

            Self::TreeNotFound { path } => Some(format!(
                "'{}' is not a directory. Check the mount point of the archive.",
                path.display()
            )),

            Self::IndexNotFound { .. } => Some(
                "Run `dintact init <tree>` to fingerprint the tree first.".to_string(),
            ),

            Self::Config(_) => Some(
                "Check the settings file (see `--config` or $DINTACT_CONFIG).".to_string(),
            ),

            Self::Io(_)
            | Self::IoAt { .. }
            | Self::InvalidPath(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        let corrupt = Error::IndexCorrupt {
            path: PathBuf::from("/cold/index.txt"),
            line: 3,
            message: "bad size".into(),
        };
        assert_eq!(corrupt.exit_code(), 2);
        assert_eq!(Error::Io(std::io::Error::other("x")).exit_code(), 8);
        assert_eq!(Error::Other("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::TreeNotFound {
            path: PathBuf::from("/mnt/cold"),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "TREE_NOT_FOUND");
        assert_eq!(json["error"]["exit_code"], 3);
        assert!(json["error"]["hint"].as_str().unwrap().contains("/mnt/cold"));
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorCode::IoError.is_retryable());
        assert!(!ErrorCode::IndexCorrupt.is_retryable());
    }
}
