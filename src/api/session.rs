use std::path::{Path, PathBuf};

use super::error::ApiError;

/// Authenticated context for one user on one LMS host.
///
/// Passed explicitly into every component constructor; there is no global
/// "current session" singleton. The session also anchors the on-disk layout:
/// everything a user downloads lives under `{host}-{user_id}/Offline/`.
#[derive(Debug, Clone)]
pub struct Session {
    base_url: String,
    access_token: String,
    user_id: String,
    host: String,
}

impl Session {
    /// Build a session from a base URL, bearer token and user id.
    ///
    /// The base URL is normalized (trailing slash stripped) and the host
    /// component is extracted for the storage-root key.
    pub fn new(base_url: &str, access_token: &str, user_id: &str) -> Result<Self, ApiError> {
        if access_token.is_empty() || user_id.is_empty() {
            return Err(ApiError::MissingSession);
        }
        let parsed = url::Url::parse(base_url).map_err(|_| ApiError::MissingSession)?;
        let host = parsed
            .host_str()
            .ok_or(ApiError::MissingSession)?
            .to_string();
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            user_id: user_id.to_string(),
            host,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Absolute URL for an API path relative to the session's host.
    /// Paths that are already absolute (pagination links) pass through.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    /// Per-user offline storage root: `{storage_dir}/{host}-{userID}/Offline`.
    pub fn offline_root(&self, storage_dir: &Path) -> PathBuf {
        storage_dir
            .join(format!("{}-{}", self.host, self.user_id))
            .join("Offline")
    }
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user_id, self.host)
    }
}
