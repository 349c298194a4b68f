//! Record types for the state database.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

/// Download status of an offline file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// Seen in a selection but not yet downloaded.
    Pending,
    /// Durable artifact exists on disk.
    Downloaded,
    /// Last download attempt failed.
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloaded => "downloaded",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "downloaded" => Some(Self::Downloaded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One offline file artifact tracked per (course, file).
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub course_id: String,
    pub file_id: String,
    pub display_name: String,
    pub local_path: Option<PathBuf>,
    pub size_bytes: u64,
    /// Server `updated_at` of the copy on disk; drives idempotent skip.
    pub updated_at: Option<DateTime<Utc>>,
    pub status: FileStatus,
    pub last_error: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
}

/// One downloaded Studio video artifact, keyed by its media/launch id.
#[derive(Debug, Clone)]
pub struct StudioVideoRecord {
    pub media_id: String,
    pub local_dir: PathBuf,
    pub mime_type: String,
    pub size_bytes: u64,
    pub downloaded_at: Option<DateTime<Utc>>,
}

/// Statistics for one completed sync run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncRunStats {
    pub files_downloaded: u64,
    pub files_skipped: u64,
    pub files_failed: u64,
    pub interrupted: bool,
}

/// Aggregate view of the state database for the `status` command.
#[derive(Debug, Clone, Default)]
pub struct StateSummary {
    pub total_files: u64,
    pub downloaded: u64,
    pub pending: u64,
    pub failed: u64,
    pub bytes_on_disk: u64,
    pub studio_videos: u64,
    pub selected_courses: u64,
    pub last_run_completed_at: Option<DateTime<Utc>>,
}
