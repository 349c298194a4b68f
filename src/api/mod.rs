//! Typed client for the LMS REST/JSON:API backend.
//!
//! All requests carry the session's bearer token. List endpoints paginate
//! via either a `Link: rel="next"` header or JSON:API `meta.pagination.next`;
//! [`Api::get_all`] follows whichever form the server uses.

pub mod error;
pub mod pagination;
pub mod session;
pub mod types;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::ApiError;
pub use session::Session;
pub use types::FileItem;

/// One decoded page of a list endpoint plus the next-page pointer.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub items: Vec<Value>,
    pub next: Option<String>,
}

/// Minimal async page source used by the reactive store.
///
/// The concrete implementation is [`Api`]; tests substitute counting fakes
/// to assert network-call behavior without a server.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, ApiError>;
}

pub struct Api {
    client: reqwest::Client,
    session: Session,
}

impl Api {
    pub fn new(session: Session) -> Self {
        Self {
            client: reqwest::Client::new(),
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn get_raw(&self, url: &str) -> Result<reqwest::Response, ApiError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(self.session.access_token())
            .send()
            .await
            .map_err(|e| ApiError::Http {
                source: e,
                url: url.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// GET a single resource and decode it.
    pub async fn get_one<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.session.url_for(path);
        let response = self.get_raw(&url).await?;
        let body = response.bytes().await.map_err(|e| ApiError::Http {
            source: e,
            url: url.clone(),
        })?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode { source: e, url })
    }

    /// GET one page of a list endpoint.
    pub async fn get_page(&self, path: &str) -> Result<FetchedPage, ApiError> {
        let url = self.session.url_for(path);
        let response = self.get_raw(&url).await?;
        let link = response
            .headers()
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| ApiError::Http {
            source: e,
            url: url.clone(),
        })?;
        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| ApiError::Decode { source: e, url: url.clone() })?;
        let next = pagination::next_page(link.as_deref(), &value);
        let items = list_items(value, &url)?;
        Ok(FetchedPage { items, next })
    }

}

#[async_trait]
impl PageFetcher for Api {
    async fn fetch_page(&self, url: &str) -> Result<FetchedPage, ApiError> {
        self.get_page(url).await
    }
}

/// Extract list items from a page body: a top-level JSON array, a JSON:API
/// envelope with the array under `data`, or a single-object resource
/// (pages, quizzes) treated as a one-item page.
fn list_items(value: Value, url: &str) -> Result<Vec<Value>, ApiError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Ok(vec![other]),
            None => Ok(vec![Value::Object(map)]),
        },
        _ => Err(decode_error("expected a JSON array or object body", url)),
    }
}

fn decode_error(message: &str, url: &str) -> ApiError {
    // Synthesize a serde error so all shape problems flow through one variant.
    ApiError::Decode {
        source: serde::de::Error::custom(message),
        url: url.to_string(),
    }
}
