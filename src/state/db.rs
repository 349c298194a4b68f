//! Durable per-user state behind an object-safe async trait.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::error::StateError;
use super::schema;
use super::types::{FileRecord, FileStatus, StateSummary, StudioVideoRecord, SyncRunStats};

/// Durable per-user state shared by the selector, the downloader, and the
/// reactive store.
///
/// Object-safe so components hold `Arc<dyn StateDb>` and tests substitute
/// in-memory databases.
#[async_trait]
pub trait StateDb: Send + Sync {
    // ── Offline file records ──

    /// Look up the record for one (course, file) pair.
    async fn get_file_record(
        &self,
        course_id: &str,
        file_id: &str,
    ) -> Result<Option<FileRecord>, StateError>;

    /// All file records for a course.
    async fn get_course_file_records(
        &self,
        course_id: &str,
    ) -> Result<Vec<FileRecord>, StateError>;

    /// Record that a file was seen in a selection, preserving any existing
    /// download status.
    async fn upsert_file_seen(
        &self,
        course_id: &str,
        file_id: &str,
        display_name: &str,
        size_bytes: u64,
    ) -> Result<(), StateError>;

    /// Mark a file as durably downloaded.
    async fn mark_file_downloaded(
        &self,
        course_id: &str,
        file_id: &str,
        local_path: &Path,
        size_bytes: u64,
        updated_at: Option<DateTime<Utc>>,
    ) -> Result<(), StateError>;

    /// Mark a file's last download attempt as failed.
    async fn mark_file_failed(
        &self,
        course_id: &str,
        file_id: &str,
        error: &str,
    ) -> Result<(), StateError>;

    /// Drop a file record entirely (after its artifact is removed).
    async fn delete_file_record(&self, course_id: &str, file_id: &str) -> Result<(), StateError>;

    // ── Saved selection ──

    /// Replace the saved selection node ids for a course.
    async fn replace_selection(
        &self,
        course_id: &str,
        node_ids: &[String],
    ) -> Result<(), StateError>;

    /// Saved selection node ids for a course.
    async fn get_selection(&self, course_id: &str) -> Result<Vec<String>, StateError>;

    /// Distinct course ids that have a saved selection.
    async fn get_selected_courses(&self) -> Result<Vec<String>, StateError>;

    // ── Pending cleanup (deselected file ids) ──

    /// Replace the pending-cleanup file ids for a course.
    async fn replace_pending_cleanup(
        &self,
        course_id: &str,
        file_ids: &[String],
    ) -> Result<(), StateError>;

    /// File ids still awaiting cleanup for a course.
    async fn get_pending_cleanup(&self, course_id: &str) -> Result<Vec<String>, StateError>;

    /// Distinct course ids with cleanup entries outstanding.
    async fn get_cleanup_courses(&self) -> Result<Vec<String>, StateError>;

    /// Clear one cleanup entry once its artifact is gone from disk.
    async fn clear_pending_cleanup(
        &self,
        course_id: &str,
        file_id: &str,
    ) -> Result<(), StateError>;

    // ── Studio videos ──

    async fn upsert_studio_video(&self, record: &StudioVideoRecord) -> Result<(), StateError>;

    async fn get_studio_videos(&self) -> Result<Vec<StudioVideoRecord>, StateError>;

    async fn delete_studio_video(&self, media_id: &str) -> Result<(), StateError>;

    // ── Reactive-store cache ──

    /// Read cached rows for a key: the refresh timestamp plus each row's
    /// payload, in insertion order.
    async fn cache_read(
        &self,
        cache_key: &str,
    ) -> Result<Option<(DateTime<Utc>, Vec<String>)>, StateError>;

    /// Replace the cached rows for a key and stamp the refresh time.
    /// Rows are (entity_id, payload); duplicate ids resolve write-wins.
    async fn cache_write(
        &self,
        cache_key: &str,
        rows: &[(String, String)],
    ) -> Result<(), StateError>;

    // ── Sync runs ──

    /// Start a new sync run and return its id.
    async fn start_sync_run(&self) -> Result<i64, StateError>;

    /// Close a sync run, recording its final statistics.
    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError>;

    /// Aggregate view for the `status` command.
    async fn get_summary(&self) -> Result<StateSummary, StateError>;
}

/// SQLite implementation of the state database.
pub struct SqliteStateDb {
    /// Wrapped in Mutex because rusqlite::Connection is not Sync. Queries
    /// are short; the guard is never held across an await.
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl std::fmt::Debug for SqliteStateDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStateDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStateDb {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;

            // WAL for concurrent reads while an interactor writes.
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;

            schema::migrate(&conn)?;
            Ok::<_, StateError>(conn)
        })
        .await??;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StateError> {
        self.conn
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }
}

fn to_unix(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp())
}

fn from_unix(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

fn row_to_file_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let status_str: String = row.get("status")?;
    Ok(FileRecord {
        course_id: row.get("course_id")?,
        file_id: row.get("file_id")?,
        display_name: row.get("display_name")?,
        local_path: row
            .get::<_, Option<String>>("local_path")?
            .map(PathBuf::from),
        size_bytes: row.get::<_, i64>("size_bytes")? as u64,
        updated_at: from_unix(row.get("updated_at")?),
        status: FileStatus::parse(&status_str).unwrap_or(FileStatus::Pending),
        last_error: row.get("last_error")?,
        synced_at: from_unix(row.get("synced_at")?),
    })
}

#[async_trait]
impl StateDb for SqliteStateDb {
    async fn get_file_record(
        &self,
        course_id: &str,
        file_id: &str,
    ) -> Result<Option<FileRecord>, StateError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT course_id, file_id, display_name, local_path, size_bytes,
                    updated_at, status, last_error, synced_at
             FROM offline_files WHERE course_id = ?1 AND file_id = ?2",
            [course_id, file_id],
            row_to_file_record,
        )
        .optional()
        .map_err(StateError::query)
    }

    async fn get_course_file_records(
        &self,
        course_id: &str,
    ) -> Result<Vec<FileRecord>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT course_id, file_id, display_name, local_path, size_bytes,
                        updated_at, status, last_error, synced_at
                 FROM offline_files WHERE course_id = ?1 ORDER BY file_id",
            )
            .map_err(StateError::query)?;
        let rows = stmt
            .query_map([course_id], row_to_file_record)
            .map_err(StateError::query)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StateError::query)
    }

    async fn upsert_file_seen(
        &self,
        course_id: &str,
        file_id: &str,
        display_name: &str,
        size_bytes: u64,
    ) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO offline_files (course_id, file_id, display_name, size_bytes, status)
             VALUES (?1, ?2, ?3, ?4, 'pending')
             ON CONFLICT(course_id, file_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 size_bytes = excluded.size_bytes",
            params![course_id, file_id, display_name, size_bytes as i64],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn mark_file_downloaded(
        &self,
        course_id: &str,
        file_id: &str,
        local_path: &Path,
        size_bytes: u64,
        updated_at: Option<DateTime<Utc>>,
    ) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO offline_files
                 (course_id, file_id, display_name, local_path, size_bytes,
                  updated_at, status, last_error, synced_at)
             VALUES (?1, ?2, '', ?3, ?4, ?5, 'downloaded', NULL, ?6)
             ON CONFLICT(course_id, file_id) DO UPDATE SET
                 local_path = excluded.local_path,
                 size_bytes = excluded.size_bytes,
                 updated_at = excluded.updated_at,
                 status = 'downloaded',
                 last_error = NULL,
                 synced_at = excluded.synced_at",
            params![
                course_id,
                file_id,
                local_path.to_string_lossy(),
                size_bytes as i64,
                to_unix(updated_at),
                Utc::now().timestamp(),
            ],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn mark_file_failed(
        &self,
        course_id: &str,
        file_id: &str,
        error: &str,
    ) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO offline_files (course_id, file_id, display_name, status, last_error)
             VALUES (?1, ?2, '', 'failed', ?3)
             ON CONFLICT(course_id, file_id) DO UPDATE SET
                 status = 'failed',
                 last_error = excluded.last_error",
            params![course_id, file_id, error],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn delete_file_record(&self, course_id: &str, file_id: &str) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM offline_files WHERE course_id = ?1 AND file_id = ?2",
            [course_id, file_id],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn replace_selection(
        &self,
        course_id: &str,
        node_ids: &[String],
    ) -> Result<(), StateError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StateError::query)?;
        tx.execute("DELETE FROM selected_nodes WHERE course_id = ?1", [course_id])
            .map_err(StateError::query)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO selected_nodes (course_id, node_id) VALUES (?1, ?2)")
                .map_err(StateError::query)?;
            for node_id in node_ids {
                stmt.execute([course_id, node_id]).map_err(StateError::query)?;
            }
        }
        tx.commit().map_err(StateError::query)?;
        Ok(())
    }

    async fn get_selection(&self, course_id: &str) -> Result<Vec<String>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT node_id FROM selected_nodes WHERE course_id = ?1 ORDER BY node_id")
            .map_err(StateError::query)?;
        let rows = stmt
            .query_map([course_id], |row| row.get(0))
            .map_err(StateError::query)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StateError::query)
    }

    async fn get_selected_courses(&self) -> Result<Vec<String>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT course_id FROM selected_nodes ORDER BY course_id")
            .map_err(StateError::query)?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(StateError::query)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StateError::query)
    }

    async fn replace_pending_cleanup(
        &self,
        course_id: &str,
        file_ids: &[String],
    ) -> Result<(), StateError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StateError::query)?;
        tx.execute(
            "DELETE FROM pending_cleanup WHERE course_id = ?1",
            [course_id],
        )
        .map_err(StateError::query)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO pending_cleanup (course_id, file_id) VALUES (?1, ?2)")
                .map_err(StateError::query)?;
            for file_id in file_ids {
                stmt.execute([course_id, file_id]).map_err(StateError::query)?;
            }
        }
        tx.commit().map_err(StateError::query)?;
        Ok(())
    }

    async fn get_pending_cleanup(&self, course_id: &str) -> Result<Vec<String>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT file_id FROM pending_cleanup WHERE course_id = ?1 ORDER BY file_id")
            .map_err(StateError::query)?;
        let rows = stmt
            .query_map([course_id], |row| row.get(0))
            .map_err(StateError::query)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StateError::query)
    }

    async fn get_cleanup_courses(&self) -> Result<Vec<String>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT course_id FROM pending_cleanup ORDER BY course_id")
            .map_err(StateError::query)?;
        let rows = stmt
            .query_map([], |row| row.get(0))
            .map_err(StateError::query)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StateError::query)
    }

    async fn clear_pending_cleanup(
        &self,
        course_id: &str,
        file_id: &str,
    ) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM pending_cleanup WHERE course_id = ?1 AND file_id = ?2",
            [course_id, file_id],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn upsert_studio_video(&self, record: &StudioVideoRecord) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO studio_videos (media_id, local_dir, mime_type, size_bytes, downloaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(media_id) DO UPDATE SET
                 local_dir = excluded.local_dir,
                 mime_type = excluded.mime_type,
                 size_bytes = excluded.size_bytes,
                 downloaded_at = excluded.downloaded_at",
            params![
                record.media_id,
                record.local_dir.to_string_lossy(),
                record.mime_type,
                record.size_bytes as i64,
                to_unix(record.downloaded_at),
            ],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn get_studio_videos(&self) -> Result<Vec<StudioVideoRecord>, StateError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT media_id, local_dir, mime_type, size_bytes, downloaded_at
                 FROM studio_videos ORDER BY media_id",
            )
            .map_err(StateError::query)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StudioVideoRecord {
                    media_id: row.get(0)?,
                    local_dir: PathBuf::from(row.get::<_, String>(1)?),
                    mime_type: row.get(2)?,
                    size_bytes: row.get::<_, i64>(3)? as u64,
                    downloaded_at: from_unix(row.get(4)?),
                })
            })
            .map_err(StateError::query)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StateError::query)
    }

    async fn delete_studio_video(&self, media_id: &str) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM studio_videos WHERE media_id = ?1", [media_id])
            .map_err(StateError::query)?;
        Ok(())
    }

    async fn cache_read(
        &self,
        cache_key: &str,
    ) -> Result<Option<(DateTime<Utc>, Vec<String>)>, StateError> {
        let conn = self.lock()?;
        let refreshed: Option<i64> = conn
            .query_row(
                "SELECT refreshed_at FROM cache_refreshes WHERE cache_key = ?1",
                [cache_key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StateError::query)?;

        let Some(refreshed_at) = from_unix(refreshed) else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT payload FROM cache_entries WHERE cache_key = ?1 ORDER BY rowid",
            )
            .map_err(StateError::query)?;
        let rows = stmt
            .query_map([cache_key], |row| row.get(0))
            .map_err(StateError::query)?;
        let payloads = rows
            .collect::<Result<Vec<String>, _>>()
            .map_err(StateError::query)?;
        Ok(Some((refreshed_at, payloads)))
    }

    async fn cache_write(
        &self,
        cache_key: &str,
        rows: &[(String, String)],
    ) -> Result<(), StateError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StateError::query)?;
        tx.execute("DELETE FROM cache_entries WHERE cache_key = ?1", [cache_key])
            .map_err(StateError::query)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO cache_entries (cache_key, entity_id, payload)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(cache_key, entity_id) DO UPDATE SET
                         payload = excluded.payload",
                )
                .map_err(StateError::query)?;
            for (entity_id, payload) in rows {
                stmt.execute(params![cache_key, entity_id, payload])
                    .map_err(StateError::query)?;
            }
        }
        tx.execute(
            "INSERT INTO cache_refreshes (cache_key, refreshed_at) VALUES (?1, ?2)
             ON CONFLICT(cache_key) DO UPDATE SET refreshed_at = excluded.refreshed_at",
            params![cache_key, Utc::now().timestamp()],
        )
        .map_err(StateError::query)?;
        tx.commit().map_err(StateError::query)?;
        Ok(())
    }

    async fn start_sync_run(&self) -> Result<i64, StateError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_runs (started_at) VALUES (?1)",
            [Utc::now().timestamp()],
        )
        .map_err(StateError::query)?;
        Ok(conn.last_insert_rowid())
    }

    async fn complete_sync_run(&self, run_id: i64, stats: &SyncRunStats) -> Result<(), StateError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE sync_runs SET completed_at = ?1, files_downloaded = ?2,
                    files_skipped = ?3, files_failed = ?4, interrupted = ?5
             WHERE id = ?6",
            params![
                Utc::now().timestamp(),
                stats.files_downloaded as i64,
                stats.files_skipped as i64,
                stats.files_failed as i64,
                stats.interrupted as i64,
                run_id,
            ],
        )
        .map_err(StateError::query)?;
        Ok(())
    }

    async fn get_summary(&self) -> Result<StateSummary, StateError> {
        let conn = self.lock()?;
        let (total_files, downloaded, pending, failed, bytes_on_disk) = conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'downloaded'), 0),
                        COALESCE(SUM(status = 'pending'), 0),
                        COALESCE(SUM(status = 'failed'), 0),
                        COALESCE(SUM(CASE WHEN status = 'downloaded' THEN size_bytes ELSE 0 END), 0)
                 FROM offline_files",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                        row.get::<_, i64>(3)? as u64,
                        row.get::<_, i64>(4)? as u64,
                    ))
                },
            )
            .map_err(StateError::query)?;

        let studio_videos: i64 = conn
            .query_row("SELECT COUNT(*) FROM studio_videos", [], |row| row.get(0))
            .map_err(StateError::query)?;
        let selected_courses: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT course_id) FROM selected_nodes",
                [],
                |row| row.get(0),
            )
            .map_err(StateError::query)?;
        let last_run: Option<i64> = conn
            .query_row(
                "SELECT completed_at FROM sync_runs
                 WHERE completed_at IS NOT NULL ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(StateError::query)?;

        Ok(StateSummary {
            total_files,
            downloaded,
            pending,
            failed,
            bytes_on_disk,
            studio_videos: studio_videos as u64,
            selected_courses: selected_courses as u64,
            last_run_completed_at: from_unix(last_run),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> SqliteStateDb {
        SqliteStateDb::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn file_record_lifecycle() {
        let db = db();
        assert!(db.get_file_record("c1", "f1").await.unwrap().is_none());

        db.upsert_file_seen("c1", "f1", "notes.pdf", 1000).await.unwrap();
        let rec = db.get_file_record("c1", "f1").await.unwrap().unwrap();
        assert_eq!(rec.status, FileStatus::Pending);
        assert_eq!(rec.size_bytes, 1000);

        let updated = Utc.with_ymd_and_hms(2024, 9, 1, 10, 0, 0).unwrap();
        db.mark_file_downloaded("c1", "f1", Path::new("/x/notes.pdf"), 1000, Some(updated))
            .await
            .unwrap();
        let rec = db.get_file_record("c1", "f1").await.unwrap().unwrap();
        assert_eq!(rec.status, FileStatus::Downloaded);
        assert_eq!(rec.updated_at, Some(updated));
        assert_eq!(rec.local_path.as_deref(), Some(Path::new("/x/notes.pdf")));

        db.mark_file_failed("c1", "f1", "410 Gone").await.unwrap();
        let rec = db.get_file_record("c1", "f1").await.unwrap().unwrap();
        assert_eq!(rec.status, FileStatus::Failed);
        assert_eq!(rec.last_error.as_deref(), Some("410 Gone"));

        db.delete_file_record("c1", "f1").await.unwrap();
        assert!(db.get_file_record("c1", "f1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_seen_preserves_downloaded_status() {
        let db = db();
        db.mark_file_downloaded("c1", "f1", Path::new("/x/a.pdf"), 10, None)
            .await
            .unwrap();
        db.upsert_file_seen("c1", "f1", "a.pdf", 20).await.unwrap();
        let rec = db.get_file_record("c1", "f1").await.unwrap().unwrap();
        assert_eq!(rec.status, FileStatus::Downloaded);
        assert_eq!(rec.size_bytes, 20);
    }

    #[tokio::test]
    async fn selection_replace_and_read() {
        let db = db();
        db.replace_selection("c1", &["tab:files".into(), "file:1".into()])
            .await
            .unwrap();
        assert_eq!(
            db.get_selection("c1").await.unwrap(),
            vec!["file:1".to_string(), "tab:files".to_string()]
        );

        db.replace_selection("c1", &["tab:modules".into()]).await.unwrap();
        assert_eq!(
            db.get_selection("c1").await.unwrap(),
            vec!["tab:modules".to_string()]
        );

        db.replace_selection("c2", &["tab:files".into()]).await.unwrap();
        assert_eq!(
            db.get_selected_courses().await.unwrap(),
            vec!["c1".to_string(), "c2".to_string()]
        );
    }

    #[tokio::test]
    async fn pending_cleanup_survives_until_cleared() {
        let db = db();
        db.replace_pending_cleanup("c1", &["f1".into(), "f2".into()])
            .await
            .unwrap();
        assert_eq!(
            db.get_pending_cleanup("c1").await.unwrap(),
            vec!["f1".to_string(), "f2".to_string()]
        );

        db.clear_pending_cleanup("c1", "f1").await.unwrap();
        assert_eq!(
            db.get_pending_cleanup("c1").await.unwrap(),
            vec!["f2".to_string()]
        );
        assert_eq!(db.get_cleanup_courses().await.unwrap(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn studio_video_records_round_trip() {
        let db = db();
        let rec = StudioVideoRecord {
            media_id: "m-1".into(),
            local_dir: PathBuf::from("/x/studio/m-1"),
            mime_type: "video/mp4".into(),
            size_bytes: 5000,
            downloaded_at: None,
        };
        db.upsert_studio_video(&rec).await.unwrap();
        let all = db.get_studio_videos().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].media_id, "m-1");

        db.delete_studio_video("m-1").await.unwrap();
        assert!(db.get_studio_videos().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_write_then_read_returns_rows_in_order() {
        let db = db();
        assert!(db.cache_read("courses").await.unwrap().is_none());

        db.cache_write(
            "courses",
            &[("1".into(), "{\"id\":1}".into()), ("2".into(), "{\"id\":2}".into())],
        )
        .await
        .unwrap();
        let (refreshed, rows) = db.cache_read("courses").await.unwrap().unwrap();
        assert!(refreshed <= Utc::now());
        assert_eq!(rows, vec!["{\"id\":1}".to_string(), "{\"id\":2}".to_string()]);
    }

    #[tokio::test]
    async fn cache_write_replaces_previous_rows() {
        let db = db();
        db.cache_write("k", &[("1".into(), "a".into())]).await.unwrap();
        db.cache_write("k", &[("2".into(), "b".into())]).await.unwrap();
        let (_, rows) = db.cache_read("k").await.unwrap().unwrap();
        assert_eq!(rows, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn sync_run_and_summary() {
        let db = db();
        let run = db.start_sync_run().await.unwrap();
        db.mark_file_downloaded("c1", "f1", Path::new("/x/a"), 100, None)
            .await
            .unwrap();
        db.mark_file_failed("c1", "f2", "boom").await.unwrap();
        db.complete_sync_run(
            run,
            &SyncRunStats {
                files_downloaded: 1,
                files_skipped: 0,
                files_failed: 1,
                interrupted: false,
            },
        )
        .await
        .unwrap();

        let summary = db.get_summary().await.unwrap();
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.downloaded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.bytes_on_disk, 100);
        assert!(summary.last_run_completed_at.is_some());
    }
}
