//! Reactive store: the generic fetch + cache + decode layer.
//!
//! A [`UseCase`] value describes one network request: its path, cache key,
//! TTL, and per-entity identity. [`Store::get_entities`] serves it from the
//! local cache when fresh, otherwise fetches (following pagination when
//! asked), persists the decoded rows, and returns them. Concurrent calls
//! sharing a cache key are collapsed into a single in-flight request.

pub mod use_cases;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::api::{ApiError, PageFetcher};
use crate::state::{StateDb, StateError};

/// Cache freshness window applied when a use case does not override it.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Description of one network request plus its local cache behavior.
pub trait UseCase: Send + Sync {
    type Entity: Serialize + DeserializeOwned + Send + 'static;

    /// Key under which decoded entities are persisted. Requests sharing a
    /// cache key are deduplicated while in flight.
    ///
    /// The persisted rows reflect whichever pagination mode last wrote
    /// them, so all `get_entities` calls for one cache key must agree on
    /// `load_all_pages`; otherwise a fresh single-page write could be
    /// served to a load-all reader as if it were the full list.
    fn cache_key(&self) -> String;

    /// Request path (or absolute URL) for the first page.
    fn path(&self) -> String;

    fn ttl(&self) -> Duration {
        DEFAULT_TTL
    }

    /// Stable identity of one entity, for write-wins row storage.
    fn entity_id(entity: &Self::Entity) -> String;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Api(Arc<ApiError>),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Failed to decode entity for cache key {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Vec<Value>>, Arc<ApiError>>>>;

pub struct Store {
    fetcher: Arc<dyn PageFetcher>,
    db: Arc<dyn StateDb>,
    in_flight: Arc<Mutex<HashMap<String, SharedFetch>>>,
}

impl Store {
    pub fn new(fetcher: Arc<dyn PageFetcher>, db: Arc<dyn StateDb>) -> Self {
        Self {
            fetcher,
            db,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch the entities a use case describes.
    ///
    /// With `ignore_cache == false`, a non-expired local copy is returned
    /// without touching the network. With `ignore_cache == true` the request
    /// always goes out and overwrites the local rows. With
    /// `load_all_pages == true` every next-page pointer is followed and the
    /// accumulated list is returned once, in page order.
    pub async fn get_entities<U: UseCase>(
        &self,
        use_case: &U,
        ignore_cache: bool,
        load_all_pages: bool,
    ) -> Result<Vec<U::Entity>, StoreError> {
        let key = use_case.cache_key();

        if !ignore_cache {
            if let Some((refreshed_at, rows)) = self.db.cache_read(&key).await? {
                let age = (Utc::now() - refreshed_at)
                    .to_std()
                    .unwrap_or(Duration::MAX);
                if age < use_case.ttl() {
                    tracing::debug!(cache_key = %key, rows = rows.len(), "cache hit");
                    return rows
                        .iter()
                        .map(|payload| {
                            serde_json::from_str(payload).map_err(|e| StoreError::Decode {
                                key: key.clone(),
                                source: e,
                            })
                        })
                        .collect();
                }
                tracing::debug!(cache_key = %key, "cache expired");
            }
        }

        let values = self
            .join_or_spawn::<U>(use_case, load_all_pages)
            .await
            .map_err(StoreError::Api)?;

        values
            .iter()
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| StoreError::Decode {
                    key: key.clone(),
                    source: e,
                })
            })
            .collect()
    }

    /// Join an in-flight request for this key, or start one. The in-flight
    /// key folds in the pagination mode so a single-page call never receives
    /// a truncated result meant for a load-all caller (or vice versa).
    fn join_or_spawn<U: UseCase>(&self, use_case: &U, load_all_pages: bool) -> SharedFetch {
        let flight_key = format!(
            "{}#{}",
            use_case.cache_key(),
            if load_all_pages { "all" } else { "one" }
        );

        let mut in_flight = self.in_flight.lock().expect("in-flight map poisoned");
        if let Some(existing) = in_flight.get(&flight_key) {
            tracing::debug!(key = %flight_key, "joining in-flight request");
            return existing.clone();
        }

        let fetcher = self.fetcher.clone();
        let db = self.db.clone();
        let map = self.in_flight.clone();
        let cache_key = use_case.cache_key();
        let first_url = use_case.path();
        let removal_key = flight_key.clone();

        let fut: SharedFetch = async move {
            let result =
                fetch_and_persist::<U>(fetcher, db, &cache_key, &first_url, load_all_pages).await;
            map.lock().expect("in-flight map poisoned").remove(&removal_key);
            result.map(Arc::new).map_err(Arc::new)
        }
        .boxed()
        .shared();

        in_flight.insert(flight_key, fut.clone());
        fut
    }
}

/// Fetch one or all pages, decode every entity, persist the rows under the
/// cache key, and return the raw page items in page order.
async fn fetch_and_persist<U: UseCase>(
    fetcher: Arc<dyn PageFetcher>,
    db: Arc<dyn StateDb>,
    cache_key: &str,
    first_url: &str,
    load_all_pages: bool,
) -> Result<Vec<Value>, ApiError> {
    let mut items = Vec::new();
    let mut next = Some(first_url.to_string());
    while let Some(url) = next {
        let page = fetcher.fetch_page(&url).await?;
        items.extend(page.items);
        next = if load_all_pages { page.next } else { None };
    }

    let mut rows = Vec::with_capacity(items.len());
    for item in &items {
        let entity: U::Entity =
            serde_json::from_value(item.clone()).map_err(|e| ApiError::Decode {
                source: e,
                url: first_url.to_string(),
            })?;
        let payload = serde_json::to_string(&entity).map_err(|e| ApiError::Decode {
            source: e,
            url: first_url.to_string(),
        })?;
        rows.push((U::entity_id(&entity), payload));
    }

    // A cache-write failure degrades offline availability but the caller
    // still gets fresh data; report it rather than failing the fetch.
    if let Err(e) = db.cache_write(cache_key, &rows).await {
        tracing::warn!(cache_key = %cache_key, "failed to persist cache rows: {}", e);
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FetchedPage;
    use async_trait::async_trait;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Widget {
        id: i64,
        name: String,
    }

    struct WidgetsUseCase;

    impl UseCase for WidgetsUseCase {
        type Entity = Widget;

        fn cache_key(&self) -> String {
            "widgets".into()
        }

        fn path(&self) -> String {
            "api/v1/widgets".into()
        }

        fn entity_id(entity: &Widget) -> String {
            entity.id.to_string()
        }
    }

    /// Fake fetcher serving two fixed pages, counting calls, optionally
    /// pausing so tests can overlap requests deterministically.
    struct FakeFetcher {
        calls: AtomicU32,
        delay_ms: u64,
    }

    impl FakeFetcher {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay_ms,
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch_page(&self, url: &str) -> Result<FetchedPage, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if url.contains("page=2") {
                Ok(FetchedPage {
                    items: vec![json!({"id": 2, "name": "b"})],
                    next: None,
                })
            } else {
                Ok(FetchedPage {
                    items: vec![json!({"id": 1, "name": "a"})],
                    next: Some("api/v1/widgets?page=2".into()),
                })
            }
        }
    }

    fn store(fetcher: Arc<FakeFetcher>) -> Store {
        let db = Arc::new(crate::state::SqliteStateDb::open_in_memory().unwrap());
        Store::new(fetcher, db)
    }

    #[tokio::test]
    async fn load_all_pages_concatenates_in_page_order() {
        let fetcher = FakeFetcher::new(0);
        let store = store(fetcher.clone());
        let widgets = store
            .get_entities(&WidgetsUseCase, true, true)
            .await
            .unwrap();
        assert_eq!(widgets.len(), 2);
        assert_eq!(widgets[0].id, 1);
        assert_eq!(widgets[1].id, 2);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn single_page_does_not_follow_next() {
        let fetcher = FakeFetcher::new(0);
        let store = store(fetcher.clone());
        let widgets = store
            .get_entities(&WidgetsUseCase, true, false)
            .await
            .unwrap();
        assert_eq!(widgets.len(), 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn fresh_cache_serves_without_network() {
        let fetcher = FakeFetcher::new(0);
        let store = store(fetcher.clone());

        store.get_entities(&WidgetsUseCase, true, true).await.unwrap();
        assert_eq!(fetcher.calls(), 2);

        let cached = store
            .get_entities(&WidgetsUseCase, false, true)
            .await
            .unwrap();
        assert_eq!(cached.len(), 2);
        assert_eq!(fetcher.calls(), 2, "cache hit must not touch the network");
    }

    #[tokio::test]
    async fn ignore_cache_always_fetches_and_overwrites() {
        let fetcher = FakeFetcher::new(0);
        let store = store(fetcher.clone());

        store.get_entities(&WidgetsUseCase, true, true).await.unwrap();
        store.get_entities(&WidgetsUseCase, true, true).await.unwrap();
        assert_eq!(fetcher.calls(), 4);
    }

    #[tokio::test]
    async fn concurrent_same_key_calls_share_one_request() {
        let fetcher = FakeFetcher::new(50);
        let store = Arc::new(store(fetcher.clone()));

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.get_entities(&WidgetsUseCase, true, true).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.get_entities(&WidgetsUseCase, true, true).await })
        };

        let (ra, rb) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(ra.len(), 2);
        assert_eq!(rb.len(), 2);
        // Two pages fetched exactly once despite two callers.
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn after_flight_completes_a_new_request_is_issued() {
        let fetcher = FakeFetcher::new(0);
        let store = store(fetcher.clone());
        store.get_entities(&WidgetsUseCase, true, false).await.unwrap();
        store.get_entities(&WidgetsUseCase, true, false).await.unwrap();
        assert_eq!(fetcher.calls(), 2, "dedup applies only while in flight");
    }

    struct ZeroTtl;

    impl UseCase for ZeroTtl {
        type Entity = Widget;

        fn cache_key(&self) -> String {
            "widgets".into()
        }

        fn path(&self) -> String {
            "api/v1/widgets".into()
        }

        fn ttl(&self) -> Duration {
            Duration::ZERO
        }

        fn entity_id(entity: &Widget) -> String {
            entity.id.to_string()
        }
    }

    #[tokio::test]
    async fn expired_cache_refetches() {
        let fetcher = FakeFetcher::new(0);
        let store = store(fetcher.clone());
        store.get_entities(&ZeroTtl, true, true).await.unwrap();
        store.get_entities(&ZeroTtl, false, true).await.unwrap();
        assert_eq!(fetcher.calls(), 4, "zero TTL expires immediately");
    }

    struct BadShape;

    impl UseCase for BadShape {
        type Entity = u32;

        fn cache_key(&self) -> String {
            "bad".into()
        }

        fn path(&self) -> String {
            "api/v1/widgets".into()
        }

        fn entity_id(entity: &u32) -> String {
            entity.to_string()
        }
    }

    #[tokio::test]
    async fn shape_mismatch_is_a_decode_error() {
        let fetcher = FakeFetcher::new(0);
        let store = store(fetcher.clone());
        let err = store.get_entities(&BadShape, true, false).await.unwrap_err();
        assert!(matches!(err, StoreError::Api(_)));
    }
}
