use thiserror::Error;

/// Errors from the LMS API client.
///
/// Decode failures carry the request URL so malformed-payload reports can be
/// traced to a specific endpoint instead of surfacing as a silent `None`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error requesting {url}: {source}")]
    Http {
        source: reqwest::Error,
        url: String,
    },

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        source: serde_json::Error,
        url: String,
    },

    #[error("No authenticated session (missing access token or user id)")]
    MissingSession,

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ApiError {
    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            ApiError::Http { .. } => true,
            ApiError::Decode { .. } | ApiError::MissingSession | ApiError::NotFound(_) => false,
        }
    }
}
