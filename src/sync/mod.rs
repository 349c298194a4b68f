//! Offline content downloader: per-content-type interactors composed by an
//! orchestrator that runs them per selected course and aggregates one
//! report. Category list-fetch failures are terminal for that category
//! only; item failures stay on the item.

pub mod download;
pub mod error;
pub mod files;
pub mod modules;
pub mod paths;
pub mod people;
pub mod progress;
pub mod studio;

use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::api::{Api, FileItem};
use crate::retry::RetryConfig;
use crate::selection::TabKind;
use crate::state::{StateDb, SyncRunStats};
use crate::store::{use_cases, Store};

pub use error::{DownloadError, SyncError};
pub use files::FilesInteractor;
pub use modules::ModulesInteractor;
pub use people::PeopleInteractor;
pub use progress::ProgressTracker;
pub use studio::StudioSyncInteractor;

/// One failed item within a category.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub id: String,
    pub error: String,
}

/// Per-category tally for one course.
#[derive(Debug, Clone, Default)]
pub struct CategoryReport {
    pub synced: u64,
    pub skipped: u64,
    pub failed: Vec<ItemFailure>,
}

/// Outcome of one course's sync. `None` means the category was not
/// selected; `Err` means its list stage failed outright.
#[derive(Debug)]
pub struct CourseSyncOutcome {
    pub course_id: String,
    pub files: Option<Result<CategoryReport, SyncError>>,
    pub modules: Option<Result<CategoryReport, SyncError>>,
    pub people: Option<Result<CategoryReport, SyncError>>,
    /// Artifacts removed by the cleanup passes.
    pub cleaned: u64,
}

/// Whole-run outcome across courses plus the account-wide video pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub courses: Vec<CourseSyncOutcome>,
    pub studio: Option<Result<CategoryReport, SyncError>>,
    pub interrupted: bool,
}

impl SyncReport {
    pub fn stats(&self) -> SyncRunStats {
        let mut stats = SyncRunStats {
            interrupted: self.interrupted,
            ..Default::default()
        };
        for course in &self.courses {
            if let Some(Ok(report)) = &course.files {
                stats.files_downloaded += report.synced;
                stats.files_skipped += report.skipped;
                stats.files_failed += report.failed.len() as u64;
            }
            if let Some(Err(_)) = &course.files {
                stats.files_failed += 1;
            }
        }
        stats
    }

    /// Whether anything at all went wrong.
    pub fn has_failures(&self) -> bool {
        let category_failed = |c: &Option<Result<CategoryReport, SyncError>>| match c {
            Some(Ok(report)) => !report.failed.is_empty(),
            Some(Err(_)) => true,
            None => false,
        };
        self.courses.iter().any(|course| {
            category_failed(&course.files)
                || category_failed(&course.modules)
                || category_failed(&course.people)
        }) || category_failed(&self.studio)
    }
}

/// Knobs shared by every interactor in one run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub concurrency: usize,
    pub retry: RetryConfig,
    pub dry_run: bool,
    pub no_progress_bar: bool,
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar`
/// or stdout is not a TTY (piped output, cron jobs).
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

/// Runs the saved selection: per course, the selected categories fan out
/// concurrently and join; the hosted-video pass runs once at the end over
/// everything the course passes wrote.
pub struct SyncOrchestrator {
    store: Arc<Store>,
    db: Arc<dyn StateDb>,
    files: Arc<FilesInteractor>,
    modules: ModulesInteractor,
    people: PeopleInteractor,
    studio: StudioSyncInteractor,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        api: Arc<Api>,
        store: Arc<Store>,
        db: Arc<dyn StateDb>,
        offline_root: PathBuf,
        config: SyncConfig,
    ) -> Self {
        let client = api.client().clone();
        let files = Arc::new(FilesInteractor::new(
            client.clone(),
            api.session().access_token().to_string(),
            db.clone(),
            offline_root.clone(),
            config.concurrency,
            config.retry,
            config.dry_run,
        ));
        let modules = ModulesInteractor::new(store.clone(), api.clone(), files.clone());
        let people = PeopleInteractor::new(store.clone());
        let studio =
            StudioSyncInteractor::over_http(api, client, db.clone(), offline_root, config.retry);
        Self {
            store,
            db,
            files,
            modules,
            people,
            studio,
            config,
        }
    }

    /// Test seam: replace the hosted-video interactor.
    #[cfg(test)]
    fn with_studio(mut self, studio: StudioSyncInteractor) -> Self {
        self.studio = studio;
        self
    }

    /// Sync every course with a saved selection.
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        let run_id = self.db.start_sync_run().await?;
        let mut report = SyncReport::default();

        let course_ids = self.db.get_selected_courses().await?;
        tracing::info!(courses = course_ids.len(), "starting sync");

        for course_id in course_ids {
            if cancel.is_cancelled() {
                break;
            }
            match self.sync_course(&course_id, cancel).await {
                Ok(outcome) => report.courses.push(outcome),
                Err(e) => {
                    // A run abandoned mid-course must not stay open in the
                    // database; close it as interrupted before surfacing.
                    report.interrupted = true;
                    if let Err(close_err) =
                        self.db.complete_sync_run(run_id, &report.stats()).await
                    {
                        tracing::warn!("failed to close aborted sync run: {}", close_err);
                    }
                    return Err(e);
                }
            }
        }

        if !cancel.is_cancelled() && !self.config.dry_run {
            report.studio = Some(self.studio.run(cancel).await);
        }

        report.interrupted = cancel.is_cancelled();
        self.db.complete_sync_run(run_id, &report.stats()).await?;
        Ok(report)
    }

    /// Sync one course's selected categories concurrently.
    async fn sync_course(
        &self,
        course_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CourseSyncOutcome, SyncError> {
        let selection = self.db.get_selection(course_id).await?;
        let tabs: HashSet<TabKind> = selection
            .iter()
            .filter_map(|n| n.strip_prefix("tab:"))
            .filter_map(TabKind::parse)
            .collect();
        let selected_files: HashSet<String> = selection
            .iter()
            .filter_map(|n| n.strip_prefix("file:"))
            .map(str::to_string)
            .collect();

        // Deselected artifacts go first so an interrupted earlier run's
        // cleanup debt is settled before new bytes land.
        let mut cleaned = self.files.cleanup_deselected(course_id).await?;

        let want_files = tabs.contains(&TabKind::Files) || !selected_files.is_empty();
        let files_fut = async {
            if !want_files {
                return (None, 0);
            }
            match self.sync_course_files(course_id, &selected_files, cancel).await {
                Ok((report, removed)) => (Some(Ok(report)), removed),
                Err(e) => (Some(Err(e)), 0),
            }
        };
        let modules_fut = async {
            if !tabs.contains(&TabKind::Modules) {
                return None;
            }
            Some(self.modules.sync_course_modules(course_id, cancel).await)
        };
        let people_fut = async {
            if !tabs.contains(&TabKind::People) {
                return None;
            }
            Some(self.people.sync_course_people(course_id).await)
        };

        let ((files, removed), modules, people) =
            tokio::join!(files_fut, modules_fut, people_fut);
        cleaned += removed;

        Ok(CourseSyncOutcome {
            course_id: course_id.to_string(),
            files,
            modules,
            people,
            cleaned,
        })
    }

    /// List the course's files fresh, download the selected subset, and
    /// drop local copies whose ids are no longer selected and available.
    async fn sync_course_files(
        &self,
        course_id: &str,
        selected: &HashSet<String>,
        cancel: &CancellationToken,
    ) -> Result<(CategoryReport, u64), SyncError> {
        let listed = self
            .store
            .get_entities(
                &use_cases::GetCourseFiles {
                    course_id: course_id.to_string(),
                },
                true,
                true,
            )
            .await?;

        let to_sync: Vec<FileItem> = listed
            .into_iter()
            .filter(|f| selected.contains(&f.id.to_string()))
            .collect();
        let keep: HashSet<String> = to_sync.iter().map(|f| f.id.to_string()).collect();

        let bar = create_progress_bar(self.config.no_progress_bar, to_sync.len() as u64);
        bar.set_message(format!("course {course_id}"));
        let report = self
            .files
            .sync_course_files(course_id, &to_sync, cancel, Some(&bar))
            .await?;
        bar.finish_and_clear();

        let removed = if self.config.dry_run || cancel.is_cancelled() {
            0
        } else {
            self.files.remove_unavailable_files(course_id, &keep).await?
        };
        Ok((report, removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, FetchedPage, PageFetcher, Session};
    use crate::state::{FileStatus, SqliteStateDb};
    use crate::sync::studio::{IframeScanner, InPlaceIframeRewriter, StudioIframe};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::path::Path;

    /// Serves the file list of a one-course account.
    struct FakeBackend;

    #[async_trait]
    impl PageFetcher for FakeBackend {
        async fn fetch_page(&self, url: &str) -> Result<FetchedPage, ApiError> {
            if url.contains("/files") {
                Ok(FetchedPage {
                    items: vec![json!({
                        "id": 1,
                        "display_name": "syllabus.pdf",
                        "size": 4,
                        "updated_at": "2024-09-01T10:00:00Z"
                    })],
                    next: None,
                })
            } else if url.contains("/users") {
                Ok(FetchedPage {
                    items: vec![json!({"id": 5, "name": "Ada"})],
                    next: None,
                })
            } else {
                Err(ApiError::NotFound(url.to_string()))
            }
        }
    }

    struct NoIframes;

    #[async_trait]
    impl IframeScanner for NoIframes {
        async fn scan(&self, _root: &Path) -> Result<Vec<StudioIframe>, SyncError> {
            Ok(Vec::new())
        }
    }

    fn orchestrator(root: PathBuf, db: Arc<dyn StateDb>) -> SyncOrchestrator {
        let session = Session::new("http://127.0.0.1:1", "t", "u1").unwrap();
        let api = Arc::new(Api::new(session));
        let store = Arc::new(Store::new(Arc::new(FakeBackend), db.clone()));
        let config = SyncConfig {
            concurrency: 2,
            retry: RetryConfig::default(),
            dry_run: false,
            no_progress_bar: true,
        };
        let studio = StudioSyncInteractor::new(
            Box::new(NoIframes),
            Box::new(studio_fakes::FailAuth),
            Box::new(studio_fakes::FailFetch),
            Box::new(studio_fakes::FailDownload),
            Box::new(InPlaceIframeRewriter),
            db.clone(),
            root.clone(),
        );
        SyncOrchestrator::new(api, store, db, root, config).with_studio(studio)
    }

    mod studio_fakes {
        use super::super::studio::*;
        use crate::api::ApiError;
        use crate::sync::error::DownloadError;
        use async_trait::async_trait;
        use std::path::{Path, PathBuf};

        pub struct FailAuth;

        #[async_trait]
        impl StudioAuthExchange for FailAuth {
            async fn launch(&self) -> Result<StudioSession, ApiError> {
                Err(ApiError::MissingSession)
            }
        }

        pub struct FailFetch;

        #[async_trait]
        impl StudioMediaFetcher for FailFetch {
            async fn fetch_media(
                &self,
                _session: &StudioSession,
                media_id: &str,
            ) -> Result<StudioMedia, ApiError> {
                Err(ApiError::NotFound(media_id.to_string()))
            }
        }

        pub struct FailDownload;

        #[async_trait]
        impl StudioVideoDownloader for FailDownload {
            async fn download(
                &self,
                _session: &StudioSession,
                media: &StudioMedia,
                _dir: &Path,
            ) -> Result<PathBuf, DownloadError> {
                Err(DownloadError::MissingUrl(media.id.clone()))
            }
        }
    }

    #[tokio::test]
    async fn current_selection_is_a_no_op_resync() {
        let tmp = tempfile::tempdir().unwrap();
        let db: Arc<dyn StateDb> = Arc::new(SqliteStateDb::open_in_memory().unwrap());

        // Saved selection: Files tab and file 1 of course c1.
        db.replace_selection("c1", &["tab:files".into(), "file:1".into()])
            .await
            .unwrap();
        // File 1's durable copy matches the server's updated_at.
        let dest = paths::course_file_path(tmp.path(), "c1", "1", "syllabus.pdf");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"data").unwrap();
        db.mark_file_downloaded(
            "c1",
            "1",
            &dest,
            4,
            Some(Utc.with_ymd_and_hms(2024, 9, 1, 10, 0, 0).unwrap()),
        )
        .await
        .unwrap();

        let orch = orchestrator(tmp.path().to_path_buf(), db.clone());
        let report = orch.sync(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.courses.len(), 1);
        let files = report.courses[0].files.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(files.skipped, 1, "no transfer for an up-to-date file");
        assert_eq!(files.synced, 0);
        assert!(report.courses[0].modules.is_none(), "modules not selected");
        assert!(!report.has_failures());
        assert!(dest.exists());

        let summary = db.get_summary().await.unwrap();
        assert!(summary.last_run_completed_at.is_some());
    }

    #[tokio::test]
    async fn people_tab_selection_runs_the_roster_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let db: Arc<dyn StateDb> = Arc::new(SqliteStateDb::open_in_memory().unwrap());
        db.replace_selection("c1", &["tab:people".into()])
            .await
            .unwrap();

        let orch = orchestrator(tmp.path().to_path_buf(), db);
        let report = orch.sync(&CancellationToken::new()).await.unwrap();
        let people = report.courses[0].people.as_ref().unwrap().as_ref().unwrap();
        assert_eq!(people.synced, 1);
        assert!(report.courses[0].files.is_none());
    }

    #[tokio::test]
    async fn pending_cleanup_is_settled_before_downloads() {
        let tmp = tempfile::tempdir().unwrap();
        let db: Arc<dyn StateDb> = Arc::new(SqliteStateDb::open_in_memory().unwrap());

        let stale = paths::course_file_path(tmp.path(), "c1", "9", "old.pdf");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, b"old").unwrap();
        db.mark_file_downloaded("c1", "9", &stale, 3, None)
            .await
            .unwrap();
        db.replace_selection("c1", &["tab:people".into()])
            .await
            .unwrap();
        db.replace_pending_cleanup("c1", &["9".into()]).await.unwrap();

        let orch = orchestrator(tmp.path().to_path_buf(), db.clone());
        let report = orch.sync(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.courses[0].cleaned, 1);
        assert!(!stale.exists());
        assert!(db.get_file_record("c1", "9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_course_pass_still_closes_the_sync_run() {
        let tmp = tempfile::tempdir().unwrap();
        let db: Arc<dyn StateDb> = Arc::new(SqliteStateDb::open_in_memory().unwrap());
        db.replace_selection("c1", &["tab:people".into()])
            .await
            .unwrap();
        db.replace_pending_cleanup("c1", &["9".into()]).await.unwrap();

        // A regular file where the artifact directory should be makes the
        // cleanup pass fail with a disk error.
        let artifact_dir = paths::course_file_dir(tmp.path(), "c1", "9");
        std::fs::create_dir_all(artifact_dir.parent().unwrap()).unwrap();
        std::fs::write(&artifact_dir, b"not a directory").unwrap();

        let orch = orchestrator(tmp.path().to_path_buf(), db.clone());
        let err = orch.sync(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SyncError::Download(_)));

        let summary = db.get_summary().await.unwrap();
        assert!(
            summary.last_run_completed_at.is_some(),
            "aborted run must not stay open"
        );
    }

    #[tokio::test]
    async fn cancelled_token_marks_run_interrupted() {
        let tmp = tempfile::tempdir().unwrap();
        let db: Arc<dyn StateDb> = Arc::new(SqliteStateDb::open_in_memory().unwrap());
        db.replace_selection("c1", &["tab:files".into(), "file:1".into()])
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let orch = orchestrator(tmp.path().to_path_buf(), db.clone());
        let report = orch.sync(&cancel).await.unwrap();
        assert!(report.interrupted);
        assert!(report.courses.is_empty(), "no course scheduled after cancel");
        // The file was never touched.
        assert!(db.get_file_record("c1", "1").await.unwrap().map(|r| r.status)
            != Some(FileStatus::Downloaded));
    }
}
