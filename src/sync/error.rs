use thiserror::Error;

use crate::api::ApiError;
use crate::state::StateError;
use crate::store::StoreError;

/// Typed download errors enabling retry classification.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP error {status} downloading {path}")]
    HttpStatus { status: u16, path: String },

    #[error("HTTP error downloading {path}: {source}")]
    Http {
        source: reqwest::Error,
        path: String,
    },

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("No download URL for {0}")]
    MissingUrl(String),

    #[error("Size mismatch for {path}: expected {expected} bytes, wrote {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },
}

impl DownloadError {
    /// Whether this error is transient and worth retrying. A size mismatch
    /// counts as transient: it means a truncated transfer, and the partial
    /// file is already deleted before the next attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloadError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            DownloadError::Http { .. } => true,
            DownloadError::SizeMismatch { .. } => true,
            DownloadError::Disk(_) | DownloadError::MissingUrl(_) => false,
        }
    }
}

/// Errors from the sync pipeline proper.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Sync cancelled")]
    Cancelled,
}
