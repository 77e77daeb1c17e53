use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single fetch job.
///
/// Shared job futures hand the same outcome to every waiter, so this type is
/// `Clone` and stores rendered messages instead of source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Resource not found: {url}")]
    NotFound { url: String },

    #[error("Transfer of {url} failed: {message}")]
    Transfer { url: String, message: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Conflicting checksums requested for {path:?}: {existing:?} vs {requested:?}")]
    ChecksumConflict {
        path: PathBuf,
        existing: Option<String>,
        requested: Option<String>,
    },

    #[error("Giving up on {url} after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("IO error at {path:?}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Fetch job for {path:?} aborted: {message}")]
    Aborted { path: PathBuf, message: String },
}

impl FetchError {
    pub fn io(path: impl Into<PathBuf>, source: impl std::fmt::Display) -> Self {
        FetchError::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transfer { .. } | FetchError::ChecksumMismatch { .. } => true,
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }
}
