//! Error types for the xagg catalog.
//!
//! Errors fall into three groups: fatal conditions that terminate a run
//! (`LockHeld`, `SafetyThreshold`), infrastructure failures that propagate
//! through `?` (database, IO, JSON), and per-item failures that callers record
//! against a single catalog entry instead of returning.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the xagg library.
#[derive(Debug, Error)]
pub enum XaggError {
    // Run-terminating conditions
    #[error("Run lock is held at {path}: xagg is running or a previous run failed")]
    LockHeld { path: PathBuf },

    #[error(
        "A large number of paths are missing ({scanned} scanned, at least {expected_min} expected) - check disks"
    )]
    SafetyThreshold { scanned: usize, expected_min: usize },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // CMOR table lookups
    #[error("No table entry for {era}.{table}.{variable}: {message}")]
    Lookup {
        era: String,
        table: String,
        variable: String,
        message: String,
    },

    // External indexing tool
    #[error("Failed to run {tool}: {message}")]
    Tool { tool: String, message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid timestamp {value:?}: {message}")]
    InvalidTimestamp { value: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for xagg operations.
pub type Result<T> = std::result::Result<T, XaggError>;

impl From<std::io::Error> for XaggError {
    fn from(err: std::io::Error) -> Self {
        XaggError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for XaggError {
    fn from(err: serde_json::Error) -> Self {
        XaggError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for XaggError {
    fn from(err: rusqlite::Error) -> Self {
        XaggError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl XaggError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        XaggError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// True for the conditions that must abort a whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            XaggError::LockHeld { .. } | XaggError::SafetyThreshold { .. }
        )
    }

    /// Process exit code used by the command-line front end.
    pub fn exit_code(&self) -> i32 {
        match self {
            XaggError::LockHeld { .. } => 2,
            XaggError::SafetyThreshold { .. } => 3,
            XaggError::Config { .. } => 4,
            _ => 1,
        }
    }
}
