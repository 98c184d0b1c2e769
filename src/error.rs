//! Error types for the series linker.
//!
//! Only run-fatal conditions live here. Per-file and per-operation problems
//! (ambiguous episodes, collisions, destination conflicts) are collected into
//! the run reports instead, see [`crate::models::report`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the series linker.
#[derive(Error, Debug)]
pub enum Error {
    // File system errors
    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Show folder not found under source root: {0}")]
    ShowFolderNotFound(String),

    // Classifier errors
    #[error("Classification service unavailable: {0}")]
    ClassificationUnavailable(String),

    #[error("Classification service violated the response contract: {0}")]
    ClassifierProtocol(String),

    // Mapping store errors
    #[error("Mapping store is unreadable or corrupt ({path}): {reason}")]
    MappingStoreCorrupt { path: PathBuf, reason: String },

    // Apply errors
    #[error("Another apply is already in progress: {0}")]
    ApplyInProgress(String),

    #[error("Operation cancelled")]
    Cancelled,

    // Config errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // TOML errors
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Whether this error must stop the run before anything is applied.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Error::MappingStoreCorrupt { .. } | Error::ClassifierProtocol(_)
        )
    }
}
