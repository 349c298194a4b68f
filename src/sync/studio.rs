//! Hosted-video ("Studio") offline pipeline.
//!
//! Six stages, each behind its own trait so a failure is attributable to a
//! specific collaborator: (1) scan downloaded HTML for embedded player
//! iframes, (2) exchange the LMS session for a scoped media-host token,
//! (3) fetch metadata per referenced media id, (4) delete previously
//! downloaded videos no longer referenced anywhere, (5) download video,
//! poster and caption files, (6) rewrite the referencing HTML in place to
//! point at the local copy. Stages 3 and 5 are best effort per item; the
//! others are terminal for the whole pass.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tokio::fs;
use tokio_util::sync::CancellationToken;

use super::download::download_file;
use super::error::{DownloadError, SyncError};
use super::paths;
use super::progress::ProgressTracker;
use super::{CategoryReport, ItemFailure};
use crate::api::{Api, ApiError};
use crate::retry::RetryConfig;
use crate::state::{StateDb, StudioVideoRecord};

/// One embedded player discovered in downloaded HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudioIframe {
    /// Media launch id extracted from the embed URL.
    pub media_id: String,
    /// The iframe's `src` attribute value, verbatim.
    pub src: String,
    /// Local HTML file containing the iframe.
    pub html_path: PathBuf,
}

/// Short-lived scoped session for the media host.
#[derive(Debug, Clone)]
pub struct StudioSession {
    pub base_url: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptionTrack {
    pub srclang: String,
    pub url: String,
}

/// Metadata for one hosted video.
#[derive(Debug, Clone)]
pub struct StudioMedia {
    pub id: String,
    pub download_url: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub poster_url: Option<String>,
    pub captions: Vec<CaptionTrack>,
}

#[async_trait]
pub trait IframeScanner: Send + Sync {
    async fn scan(&self, root: &Path) -> Result<Vec<StudioIframe>, SyncError>;
}

#[async_trait]
pub trait StudioAuthExchange: Send + Sync {
    async fn launch(&self) -> Result<StudioSession, ApiError>;
}

#[async_trait]
pub trait StudioMediaFetcher: Send + Sync {
    async fn fetch_media(
        &self,
        session: &StudioSession,
        media_id: &str,
    ) -> Result<StudioMedia, ApiError>;
}

#[async_trait]
pub trait StudioVideoDownloader: Send + Sync {
    /// Download the video binary plus sidecar assets into `dir`; returns
    /// the local video path.
    async fn download(
        &self,
        session: &StudioSession,
        media: &StudioMedia,
        dir: &Path,
    ) -> Result<PathBuf, DownloadError>;
}

#[async_trait]
pub trait IframeRewriter: Send + Sync {
    async fn rewrite(&self, iframe: &StudioIframe, local_video: &Path) -> Result<(), SyncError>;
}

/// Stage 1: regex scan over every `.html` file under the offline root.
///
/// Embed URLs carry the media id as a `custom_arc_media_id` launch
/// parameter, either bare or percent-encoded inside a nested launch URL.
pub struct RegexIframeScanner {
    pattern: Regex,
}

impl RegexIframeScanner {
    pub fn new() -> Self {
        let pattern = Regex::new(
            r#"<iframe[^>]+src="([^"]*custom_arc_media_id(?:%3D|=)([A-Za-z0-9_-]+)[^"]*)""#,
        )
        .expect("hard-coded pattern compiles");
        Self { pattern }
    }

    fn scan_html(&self, html: &str, html_path: &Path) -> Vec<StudioIframe> {
        self.pattern
            .captures_iter(html)
            .map(|cap| StudioIframe {
                media_id: cap[2].to_string(),
                src: cap[1].to_string(),
                html_path: html_path.to_path_buf(),
            })
            .collect()
    }
}

impl Default for RegexIframeScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IframeScanner for RegexIframeScanner {
    async fn scan(&self, root: &Path) -> Result<Vec<StudioIframe>, SyncError> {
        let mut found = Vec::new();
        let mut dirs = vec![root.to_path_buf()];
        while let Some(dir) = dirs.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(DownloadError::Disk(e).into()),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(DownloadError::Disk)?
            {
                let path = entry.path();
                if path.is_dir() {
                    dirs.push(path);
                } else if path.extension().is_some_and(|ext| ext == "html") {
                    let html = fs::read_to_string(&path)
                        .await
                        .map_err(DownloadError::Disk)?;
                    found.extend(self.scan_html(&html, &path));
                }
            }
        }
        tracing::debug!(iframes = found.len(), "scanned offline HTML");
        Ok(found)
    }
}

#[derive(Debug, Deserialize)]
struct StudioTokenResponse {
    base_url: String,
    access_token: String,
}

/// Stage 2: token exchange against the LMS, which brokers access to the
/// media host on the user's behalf.
pub struct HttpStudioAuth {
    api: Arc<Api>,
}

impl HttpStudioAuth {
    pub fn new(api: Arc<Api>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StudioAuthExchange for HttpStudioAuth {
    async fn launch(&self) -> Result<StudioSession, ApiError> {
        let token: StudioTokenResponse = self.api.get_one("api/v1/studio/session").await?;
        Ok(StudioSession {
            base_url: token.base_url,
            access_token: token.access_token,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    id: serde_json::Value,
    download_url: String,
    mime_type: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    poster_url: Option<String>,
    #[serde(default)]
    captions: Vec<CaptionTrack>,
}

/// Stage 3: per-media metadata from the media host's public API.
pub struct HttpStudioMediaFetcher {
    client: Client,
}

impl HttpStudioMediaFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StudioMediaFetcher for HttpStudioMediaFetcher {
    async fn fetch_media(
        &self,
        session: &StudioSession,
        media_id: &str,
    ) -> Result<StudioMedia, ApiError> {
        let url = format!(
            "{}/api/public/v1/media/{}",
            session.base_url.trim_end_matches('/'),
            media_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&session.access_token)
            .send()
            .await
            .map_err(|e| ApiError::Http {
                source: e,
                url: url.clone(),
            })?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url));
        }
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        let body = response.bytes().await.map_err(|e| ApiError::Http {
            source: e,
            url: url.clone(),
        })?;
        let media: MediaResponse = serde_json::from_slice(&body)
            .map_err(|e| ApiError::Decode { source: e, url })?;
        Ok(StudioMedia {
            // The host reports numeric ids; the launch parameter is a string.
            id: media
                .id
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| media.id.to_string()),
            download_url: media.download_url,
            mime_type: media.mime_type,
            size_bytes: media.size,
            poster_url: media.poster_url,
            captions: media.captions,
        })
    }
}

/// Stage 5: streams the video into the per-launch-id directory; the poster
/// and caption sidecars are best effort and logged when they fail.
pub struct HttpStudioVideoDownloader {
    client: Client,
    retry: RetryConfig,
}

impl HttpStudioVideoDownloader {
    pub fn new(client: Client, retry: RetryConfig) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl StudioVideoDownloader for HttpStudioVideoDownloader {
    async fn download(
        &self,
        session: &StudioSession,
        media: &StudioMedia,
        dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let token = Some(session.access_token.as_str());
        let video_path = dir.join(format!("media.{}", paths::video_extension(&media.mime_type)));
        let progress = ProgressTracker::new();
        download_file(
            &self.client,
            &media.download_url,
            token,
            &video_path,
            Some(media.size_bytes),
            &progress,
            &self.retry,
        )
        .await?;

        if let Some(poster_url) = &media.poster_url {
            let poster = dir.join("poster.jpg");
            let progress = ProgressTracker::new();
            if let Err(e) = download_file(
                &self.client,
                poster_url,
                token,
                &poster,
                None,
                &progress,
                &self.retry,
            )
            .await
            {
                tracing::warn!(media = %media.id, "poster download failed: {}", e);
            }
        }
        for caption in &media.captions {
            let dest = dir.join(format!("{}.srt", paths::clean_filename(&caption.srclang)));
            let progress = ProgressTracker::new();
            if let Err(e) = download_file(
                &self.client,
                &caption.url,
                token,
                &dest,
                None,
                &progress,
                &self.retry,
            )
            .await
            {
                tracing::warn!(media = %media.id, lang = %caption.srclang, "caption download failed: {}", e);
            }
        }
        Ok(video_path)
    }
}

/// Stage 6: swap the remote embed URL for the local video path, in place.
pub struct InPlaceIframeRewriter;

#[async_trait]
impl IframeRewriter for InPlaceIframeRewriter {
    async fn rewrite(&self, iframe: &StudioIframe, local_video: &Path) -> Result<(), SyncError> {
        let html = fs::read_to_string(&iframe.html_path)
            .await
            .map_err(DownloadError::Disk)?;
        let local = local_video.display().to_string();
        let rewritten = html.replace(&iframe.src, &local);
        if rewritten != html {
            fs::write(&iframe.html_path, rewritten)
                .await
                .map_err(DownloadError::Disk)?;
            tracing::debug!(file = %iframe.html_path.display(), media = %iframe.media_id, "rewrote embed");
        }
        Ok(())
    }
}

/// Runs the six stages in order against the offline root.
pub struct StudioSyncInteractor {
    scanner: Box<dyn IframeScanner>,
    auth: Box<dyn StudioAuthExchange>,
    fetcher: Box<dyn StudioMediaFetcher>,
    downloader: Box<dyn StudioVideoDownloader>,
    rewriter: Box<dyn IframeRewriter>,
    db: Arc<dyn StateDb>,
    offline_root: PathBuf,
}

impl StudioSyncInteractor {
    pub fn new(
        scanner: Box<dyn IframeScanner>,
        auth: Box<dyn StudioAuthExchange>,
        fetcher: Box<dyn StudioMediaFetcher>,
        downloader: Box<dyn StudioVideoDownloader>,
        rewriter: Box<dyn IframeRewriter>,
        db: Arc<dyn StateDb>,
        offline_root: PathBuf,
    ) -> Self {
        Self {
            scanner,
            auth,
            fetcher,
            downloader,
            rewriter,
            db,
            offline_root,
        }
    }

    /// Wire up the HTTP collaborators used outside tests.
    pub fn over_http(
        api: Arc<Api>,
        client: Client,
        db: Arc<dyn StateDb>,
        offline_root: PathBuf,
        retry: RetryConfig,
    ) -> Self {
        Self::new(
            Box::new(RegexIframeScanner::new()),
            Box::new(HttpStudioAuth::new(api)),
            Box::new(HttpStudioMediaFetcher::new(client.clone())),
            Box::new(HttpStudioVideoDownloader::new(client, retry)),
            Box::new(InPlaceIframeRewriter),
            db,
            offline_root,
        )
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<CategoryReport, SyncError> {
        // Stage 1: discover embeds.
        let iframes = self.scanner.scan(&self.offline_root).await?;
        let referenced: HashSet<String> =
            iframes.iter().map(|f| f.media_id.clone()).collect();

        let mut report = CategoryReport::default();

        if referenced.is_empty() {
            // Nothing embedded any more; stale cleanup still applies.
            self.remove_stale(&referenced).await?;
            return Ok(report);
        }

        // Stage 2: scoped session.
        let session = self.auth.launch().await.map_err(SyncError::Api)?;

        // Stage 3: metadata, best effort per media id.
        let mut media_list = Vec::new();
        let mut ordered: Vec<&String> = referenced.iter().collect();
        ordered.sort();
        for media_id in ordered {
            if cancel.is_cancelled() {
                return Ok(report);
            }
            match self.fetcher.fetch_media(&session, media_id).await {
                Ok(media) => media_list.push((media_id.clone(), media)),
                Err(e) => {
                    tracing::warn!(media = %media_id, "media metadata fetch failed: {}", e);
                    report.failed.push(ItemFailure {
                        id: media_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // Stage 4: drop videos nothing references any more.
        self.remove_stale(&referenced).await?;

        // Stage 5: download, best effort per item.
        let known: HashSet<String> = self
            .db
            .get_studio_videos()
            .await?
            .into_iter()
            .map(|r| r.media_id)
            .collect();
        let mut local_videos: HashMap<String, PathBuf> = HashMap::new();
        for (media_id, media) in &media_list {
            if cancel.is_cancelled() {
                break;
            }
            let dir = paths::studio_media_dir(&self.offline_root, media_id);
            let existing_path =
                dir.join(format!("media.{}", paths::video_extension(&media.mime_type)));
            if known.contains(media_id) && existing_path.exists() {
                tracing::debug!(media = %media_id, "video already offline, skipping");
                local_videos.insert(media_id.clone(), existing_path);
                report.skipped += 1;
                continue;
            }
            match self.downloader.download(&session, media, &dir).await {
                Ok(video_path) => {
                    self.db
                        .upsert_studio_video(&StudioVideoRecord {
                            media_id: media_id.clone(),
                            local_dir: dir.clone(),
                            mime_type: media.mime_type.clone(),
                            size_bytes: media.size_bytes,
                            downloaded_at: Some(Utc::now()),
                        })
                        .await?;
                    local_videos.insert(media_id.clone(), video_path);
                    report.synced += 1;
                }
                Err(e) => {
                    tracing::warn!(media = %media_id, "video download failed: {}", e);
                    report.failed.push(ItemFailure {
                        id: media_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        // Stage 6: point the HTML at what actually landed.
        for iframe in &iframes {
            let Some(video_path) = local_videos.get(&iframe.media_id) else {
                continue;
            };
            if let Err(e) = self.rewriter.rewrite(iframe, video_path).await {
                tracing::warn!(
                    file = %iframe.html_path.display(),
                    media = %iframe.media_id,
                    "iframe rewrite failed: {}",
                    e
                );
                report.failed.push(ItemFailure {
                    id: iframe.media_id.clone(),
                    error: e.to_string(),
                });
            }
        }

        Ok(report)
    }

    async fn remove_stale(&self, referenced: &HashSet<String>) -> Result<u64, SyncError> {
        let mut removed = 0;
        for record in self.db.get_studio_videos().await? {
            if referenced.contains(&record.media_id) {
                continue;
            }
            match fs::remove_dir_all(&record.local_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(DownloadError::Disk(e).into()),
            }
            self.db.delete_studio_video(&record.media_id).await?;
            tracing::info!(media = %record.media_id, "removed unreferenced video");
            removed += 1;
        }
        Ok(removed)
    }
}
