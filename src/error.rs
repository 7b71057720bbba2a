//! Error taxonomy for a sync run.
//!
//! Only [`RunError`] aborts a run. [`SyncError`] is scoped to a single
//! document and ends up in the report; index corruption is logged and
//! recovered from by resyncing everything.

use std::path::PathBuf;
use thiserror::Error;

/// The corpus could not be enumerated. The run aborts with the index untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("vault root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("failed to walk vault: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("{0}")]
    Source(String),
}

/// A remote operation failed for one document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Network failure, timeout, HTTP 429 or 5xx. Retried.
    #[error("transient remote error: {0}")]
    Transient(String),

    /// Authentication, validation or schema failure. Never retried.
    #[error("permanent remote error: {0}")]
    Permanent(String),
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }

    /// Classify an HTTP status returned by the remote store.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, body);
        if status.as_u16() == 429 || status.is_server_error() {
            SyncError::Transient(message)
        } else {
            SyncError::Permanent(message)
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => SyncError::from_status(status, &err.to_string()),
            None if err.is_decode() => SyncError::Permanent(err.to_string()),
            None => SyncError::Transient(err.to_string()),
        }
    }
}

/// A fatal error that aborts the whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("another sync is already running (lock held at {0})")]
    Locked(PathBuf),

    #[error("failed to load vault: {0}")]
    Load(#[from] LoadError),

    #[error(
        "vault returned no documents but the index tracks {0}; refusing to delete them \
         (set sync.allow_empty_corpus = true if the vault is really empty)"
    )]
    EmptyCorpus(usize),

    #[error("failed to write index {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote store setup failed: {0}")]
    Remote(#[from] SyncError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
