use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::DownloadError;
use super::progress::ProgressTracker;
use crate::retry::{self, RetryConfig};

/// Download a URL to `download_path` using a `.part` temp file.
///
/// Each attempt truncates any existing `.part` file and streams from scratch.
/// Only once the body is fully written (and, when `expected_size` is known,
/// verified against it) is the file renamed into place, so a crash mid-stream
/// never leaves a plausible-looking artifact at the final path. Progress is
/// published against `expected_size`; the terminal update fires after the
/// rename. Retries with exponential backoff on transient failures.
pub async fn download_file(
    client: &Client,
    url: &str,
    bearer_token: Option<&str>,
    download_path: &Path,
    expected_size: Option<u64>,
    progress: &ProgressTracker,
    retry_config: &RetryConfig,
) -> Result<(), DownloadError> {
    let part_path = download_path.with_extension("part");

    if let Some(parent) = download_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    retry::retry_with_backoff(
        retry_config,
        |e: &DownloadError| e.is_retryable(),
        || async {
            let _ = fs::remove_file(&part_path).await;
            attempt_download(
                client,
                url,
                bearer_token,
                download_path,
                &part_path,
                expected_size,
                progress,
            )
            .await
        },
    )
    .await?;

    progress.finish();
    Ok(())
}

/// Single download attempt with size verification.
async fn attempt_download(
    client: &Client,
    url: &str,
    bearer_token: Option<&str>,
    download_path: &Path,
    part_path: &Path,
    expected_size: Option<u64>,
    progress: &ProgressTracker,
) -> Result<(), DownloadError> {
    let path_str = download_path.display().to_string();

    let mut request = client.get(url);
    if let Some(token) = bearer_token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await.map_err(|e| DownloadError::Http {
        source: e,
        path: path_str.clone(),
    })?;

    if !response.status().is_success() {
        return Err(DownloadError::HttpStatus {
            status: response.status().as_u16(),
            path: path_str,
        });
    }

    let status = response.status().as_u16();
    let content_length = response.content_length();
    // The caller-supplied size comes from catalog metadata and can lag the
    // actual content; the response's own length is the better progress base.
    let progress_total = content_length.or(expected_size).unwrap_or(0);

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&part_path)
        .await?;

    let mut bytes_written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::warn!(
                "Body decode error for {} (status={}, content_length={:?}, bytes_so_far={}): {}",
                path_str,
                status,
                content_length,
                bytes_written,
                e
            );
            DownloadError::Http {
                source: e,
                path: path_str.clone(),
            }
        })?;
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
        progress.set_bytes(bytes_written, progress_total);
    }
    file.flush().await?;
    drop(file);

    if let Some(expected) = content_length {
        if bytes_written != expected {
            let _ = fs::remove_file(&part_path).await;
            return Err(DownloadError::SizeMismatch {
                path: path_str,
                expected,
                actual: bytes_written,
            });
        }
    }

    fs::rename(&part_path, download_path).await?;

    Ok(())
}
