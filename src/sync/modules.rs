use std::sync::Arc;

use tokio::fs;
use tokio_util::sync::CancellationToken;

use super::error::SyncError;
use super::files::FilesInteractor;
use super::paths;
use super::progress::ProgressTracker;
use super::{CategoryReport, ItemFailure};
use crate::api::types::ContentRef;
use crate::api::{Api, FileItem};
use crate::store::{use_cases, Store};

/// Syncs course modules: the module and item lists are the course outline
/// and must land completely or the stage fails; the content behind each
/// item (pages, files, quizzes) is enriched best effort.
pub struct ModulesInteractor {
    store: Arc<Store>,
    api: Arc<Api>,
    files: Arc<FilesInteractor>,
}

impl ModulesInteractor {
    pub fn new(store: Arc<Store>, api: Arc<Api>, files: Arc<FilesInteractor>) -> Self {
        Self { store, api, files }
    }

    pub async fn sync_course_modules(
        &self,
        course_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CategoryReport, SyncError> {
        let modules = self
            .store
            .get_entities(
                &use_cases::GetModules {
                    course_id: course_id.to_string(),
                },
                true,
                true,
            )
            .await?;

        let mut report = CategoryReport::default();
        for module in modules {
            if cancel.is_cancelled() {
                break;
            }
            // An incomplete item sequence would leave a module that renders
            // with holes, so this list is as terminal as the module list.
            let items = self
                .store
                .get_entities(
                    &use_cases::GetModuleItems {
                        course_id: course_id.to_string(),
                        module_id: module.id.to_string(),
                    },
                    true,
                    true,
                )
                .await?;

            for item in items {
                if cancel.is_cancelled() {
                    break;
                }
                let Some(content) = item.content_ref() else {
                    report.skipped += 1;
                    continue;
                };
                let item_id = item.id.to_string();
                match self.enrich(course_id, &content).await {
                    Ok(true) => report.synced += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        tracing::warn!(
                            course = %course_id,
                            module = module.id,
                            item = %item_id,
                            "module item enrichment failed: {}",
                            e
                        );
                        report.failed.push(ItemFailure {
                            id: item_id,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
        Ok(report)
    }

    /// Pull one item's associated content into local storage. Returns
    /// whether anything was fetched.
    async fn enrich(&self, course_id: &str, content: &ContentRef) -> Result<bool, SyncError> {
        match content {
            ContentRef::Page { slug } => {
                self.sync_page(course_id, slug).await?;
                Ok(true)
            }
            ContentRef::File { id } => {
                let file: FileItem = self
                    .api
                    .get_one(&format!(
                        "api/v1/courses/{}/files/{}",
                        course_id, id
                    ))
                    .await?;
                let progress = ProgressTracker::new();
                self.files.sync_file(course_id, &file, &progress).await?;
                Ok(true)
            }
            ContentRef::Quiz { id } => {
                self.store
                    .get_entities(
                        &use_cases::GetQuiz {
                            course_id: course_id.to_string(),
                            quiz_id: id.to_string(),
                        },
                        true,
                        false,
                    )
                    .await?;
                Ok(true)
            }
            ContentRef::Discussion { id } => {
                // No offline renderer for discussion threads.
                tracing::debug!(course = %course_id, discussion = id, "skipping discussion item");
                Ok(false)
            }
        }
    }

    /// Fetch a wiki page and render its body to the offline HTML layout,
    /// where the hosted-video pass later finds embedded players.
    pub async fn sync_page(&self, course_id: &str, slug: &str) -> Result<(), SyncError> {
        let pages = self
            .store
            .get_entities(
                &use_cases::GetPage {
                    course_id: course_id.to_string(),
                    slug: slug.to_string(),
                },
                true,
                false,
            )
            .await?;

        for page in pages {
            let path = paths::course_page_path(
                self.files.offline_root(),
                course_id,
                &page.url,
            );
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(super::error::DownloadError::Disk)?;
            }
            let body = page.body.unwrap_or_default();
            fs::write(&path, body.as_bytes())
                .await
                .map_err(super::error::DownloadError::Disk)?;
            tracing::debug!(course = %course_id, page = %page.url, "wrote page body");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, FetchedPage, PageFetcher, Session};
    use crate::retry::RetryConfig;
    use crate::state::{SqliteStateDb, StateDb};
    use async_trait::async_trait;
    use serde_json::json;

    /// Serves a one-module course with a page item and a sub-header.
    struct FakeCourse;

    #[async_trait]
    impl PageFetcher for FakeCourse {
        async fn fetch_page(&self, url: &str) -> Result<FetchedPage, ApiError> {
            let items = if url.contains("/modules/1/items") {
                vec![
                    json!({"id": 10, "title": "Intro", "type": "Page", "page_url": "intro"}),
                    json!({"id": 11, "title": "Header", "type": "SubHeader"}),
                ]
            } else if url.contains("/modules") {
                vec![json!({"id": 1, "name": "Week 1"})]
            } else if url.contains("/pages/intro") {
                vec![json!({"url": "intro", "title": "Intro", "body": "<p>welcome</p>"})]
            } else {
                return Err(ApiError::NotFound(url.to_string()));
            };
            Ok(FetchedPage { items, next: None })
        }
    }

    fn interactor(root: std::path::PathBuf) -> ModulesInteractor {
        let db: Arc<dyn StateDb> = Arc::new(SqliteStateDb::open_in_memory().unwrap());
        let store = Arc::new(Store::new(Arc::new(FakeCourse), db.clone()));
        let session = Session::new("http://127.0.0.1:1", "t", "u1").unwrap();
        let api = Arc::new(Api::new(session));
        let files = Arc::new(FilesInteractor::new(
            reqwest::Client::new(),
            "t".into(),
            db,
            root,
            1,
            RetryConfig::default(),
            false,
        ));
        ModulesInteractor::new(store, api, files)
    }

    #[tokio::test]
    async fn page_items_are_rendered_and_headers_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let it = interactor(tmp.path().to_path_buf());
        let cancel = CancellationToken::new();

        let report = it.sync_course_modules("c1", &cancel).await.unwrap();
        assert_eq!(report.synced, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.failed.is_empty());

        let html = paths::course_page_path(tmp.path(), "c1", "intro");
        assert_eq!(std::fs::read_to_string(html).unwrap(), "<p>welcome</p>");
    }

    #[tokio::test]
    async fn cancellation_stops_the_walk() {
        let tmp = tempfile::tempdir().unwrap();
        let it = interactor(tmp.path().to_path_buf());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = it.sync_course_modules("c1", &cancel).await.unwrap();
        assert_eq!(report.synced + report.skipped, 0);
    }
}
