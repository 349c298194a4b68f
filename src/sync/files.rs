use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use indicatif::ProgressBar;
use reqwest::Client;
use tokio::fs;
use tokio_util::sync::CancellationToken;

use super::download::download_file;
use super::error::{DownloadError, SyncError};
use super::paths;
use super::progress::ProgressTracker;
use super::{CategoryReport, ItemFailure};
use crate::api::FileItem;
use crate::retry::RetryConfig;
use crate::state::{FileStatus, StateDb};

/// Outcome of syncing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSyncResult {
    Downloaded,
    /// Local copy already matches the server's `updated_at`.
    Skipped,
}

/// Downloads the selected files of a course into the offline layout and
/// keeps the per-file state records in step with the artifacts on disk.
pub struct FilesInteractor {
    client: Client,
    access_token: String,
    db: Arc<dyn StateDb>,
    offline_root: PathBuf,
    concurrency: usize,
    retry: RetryConfig,
    dry_run: bool,
}

impl FilesInteractor {
    pub fn new(
        client: Client,
        access_token: String,
        db: Arc<dyn StateDb>,
        offline_root: PathBuf,
        concurrency: usize,
        retry: RetryConfig,
        dry_run: bool,
    ) -> Self {
        Self {
            client,
            access_token,
            db,
            offline_root,
            concurrency: concurrency.max(1),
            retry,
            dry_run,
        }
    }

    pub fn offline_root(&self) -> &std::path::Path {
        &self.offline_root
    }

    /// Sync a batch of files concurrently. One file failing never stops the
    /// others; transport and download failures land in the report while
    /// state-database failures abort the course.
    pub async fn sync_course_files(
        &self,
        course_id: &str,
        files: &[FileItem],
        cancel: &CancellationToken,
        bar: Option<&ProgressBar>,
    ) -> Result<CategoryReport, SyncError> {
        let outcomes: Vec<(String, Result<FileSyncResult, SyncError>)> =
            futures_util::stream::iter(files.iter().map(|file| {
                let file_id = file.id.to_string();
                async move {
                    if cancel.is_cancelled() {
                        return (file_id, Err(SyncError::Cancelled));
                    }
                    let progress = ProgressTracker::new();
                    let result = self.sync_file(course_id, file, &progress).await;
                    (file_id, result)
                }
            }))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = CategoryReport::default();
        for (file_id, outcome) in outcomes {
            if let Some(bar) = bar {
                bar.inc(1);
            }
            match outcome {
                Ok(FileSyncResult::Downloaded) => report.synced += 1,
                Ok(FileSyncResult::Skipped) => report.skipped += 1,
                Err(SyncError::Cancelled) => {}
                Err(SyncError::State(e)) => return Err(SyncError::State(e)),
                Err(e) => {
                    tracing::warn!(course = %course_id, file = %file_id, "file sync failed: {}", e);
                    report.failed.push(ItemFailure {
                        id: file_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Sync a single file: record it as seen, skip when the durable copy is
    /// current, otherwise stream it down and mark the record accordingly.
    pub async fn sync_file(
        &self,
        course_id: &str,
        file: &FileItem,
        progress: &ProgressTracker,
    ) -> Result<FileSyncResult, SyncError> {
        let file_id = file.id.to_string();
        self.db
            .upsert_file_seen(course_id, &file_id, &file.display_name, file.size)
            .await?;

        let existing = self.db.get_file_record(course_id, &file_id).await?;
        if let Some(record) = &existing {
            if record.status == FileStatus::Downloaded && record.updated_at == file.updated_at {
                if let Some(path) = &record.local_path {
                    if fs::try_exists(path).await.unwrap_or(false) {
                        tracing::debug!(course = %course_id, file = %file_id, "up to date, skipping");
                        progress.finish();
                        return Ok(FileSyncResult::Skipped);
                    }
                }
            }
        }

        if self.dry_run {
            tracing::info!(
                "[DRY RUN] Would download {} ({} bytes)",
                file.display_name,
                file.size
            );
            progress.finish();
            return Ok(FileSyncResult::Skipped);
        }

        let url = match &file.url {
            Some(url) => url.clone(),
            None => {
                let err = DownloadError::MissingUrl(file_id.clone());
                self.db
                    .mark_file_failed(course_id, &file_id, &err.to_string())
                    .await?;
                return Err(err.into());
            }
        };

        let dest = paths::course_file_path(
            &self.offline_root,
            course_id,
            &file_id,
            &file.display_name,
        );

        // A rename on the server leaves the previous artifact under a
        // different filename in the same per-file directory.
        if let Some(record) = &existing {
            if let Some(old_path) = &record.local_path {
                if *old_path != dest {
                    let _ = fs::remove_file(old_path).await;
                }
            }
        }

        match download_file(
            &self.client,
            &url,
            Some(&self.access_token),
            &dest,
            Some(file.size),
            progress,
            &self.retry,
        )
        .await
        {
            Ok(()) => {
                self.db
                    .mark_file_downloaded(course_id, &file_id, &dest, file.size, file.updated_at)
                    .await?;
                tracing::info!(course = %course_id, file = %file.display_name, "downloaded");
                Ok(FileSyncResult::Downloaded)
            }
            Err(e) => {
                self.db
                    .mark_file_failed(course_id, &file_id, &e.to_string())
                    .await?;
                Err(e.into())
            }
        }
    }

    /// Remove artifacts and records for files the server no longer lists.
    /// `available` is the set of file ids currently visible in the course.
    pub async fn remove_unavailable_files(
        &self,
        course_id: &str,
        available: &HashSet<String>,
    ) -> Result<u64, SyncError> {
        let mut removed = 0;
        for record in self.db.get_course_file_records(course_id).await? {
            if available.contains(&record.file_id) {
                continue;
            }
            self.remove_artifact(course_id, &record.file_id).await?;
            self.db
                .delete_file_record(course_id, &record.file_id)
                .await?;
            tracing::info!(course = %course_id, file = %record.file_id, "removed unavailable file");
            removed += 1;
        }
        Ok(removed)
    }

    /// Consume the durable cleanup list written at selection time. Each
    /// entry is cleared only after its artifact is gone, so an interrupted
    /// pass resumes where it stopped.
    pub async fn cleanup_deselected(&self, course_id: &str) -> Result<u64, SyncError> {
        let mut removed = 0;
        for file_id in self.db.get_pending_cleanup(course_id).await? {
            self.remove_artifact(course_id, &file_id).await?;
            self.db.delete_file_record(course_id, &file_id).await?;
            self.db.clear_pending_cleanup(course_id, &file_id).await?;
            tracing::info!(course = %course_id, file = %file_id, "removed deselected file");
            removed += 1;
        }
        Ok(removed)
    }

    async fn remove_artifact(&self, course_id: &str, file_id: &str) -> Result<(), SyncError> {
        let dir = paths::course_file_dir(&self.offline_root, course_id, file_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DownloadError::Disk(e).into()),
        }
    }
}
