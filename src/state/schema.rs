//! SQLite schema and version-gated migrations for the offline state.

use rusqlite::Connection;

use super::error::StateError;

/// Bump when the schema changes; migrations run off the stored version.
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS offline_files (
    course_id TEXT NOT NULL,
    file_id TEXT NOT NULL,
    display_name TEXT NOT NULL,
    local_path TEXT,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER,
    status TEXT NOT NULL DEFAULT 'pending',
    last_error TEXT,
    synced_at INTEGER,
    PRIMARY KEY (course_id, file_id)
);

CREATE INDEX IF NOT EXISTS idx_offline_files_status ON offline_files(status);

CREATE TABLE IF NOT EXISTS selected_nodes (
    course_id TEXT NOT NULL,
    node_id TEXT NOT NULL,
    PRIMARY KEY (course_id, node_id)
);

-- File ids deselected at save time, kept durably until cleanup deletes the
-- corresponding artifact. Survives a crash between download and cleanup.
CREATE TABLE IF NOT EXISTS pending_cleanup (
    course_id TEXT NOT NULL,
    file_id TEXT NOT NULL,
    PRIMARY KEY (course_id, file_id)
);

CREATE TABLE IF NOT EXISTS studio_videos (
    media_id TEXT PRIMARY KEY,
    local_dir TEXT NOT NULL,
    mime_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    downloaded_at INTEGER
);

-- Reactive-store cache: one row per decoded entity, write-wins per row.
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_key TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (cache_key, entity_id)
);

CREATE TABLE IF NOT EXISTS cache_refreshes (
    cache_key TEXT PRIMARY KEY,
    refreshed_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    files_downloaded INTEGER DEFAULT 0,
    files_skipped INTEGER DEFAULT 0,
    files_failed INTEGER DEFAULT 0,
    interrupted INTEGER DEFAULT 0
);
"#;

/// Read the schema version recorded in the database.
pub(crate) fn get_schema_version(conn: &Connection) -> Result<i32, StateError> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StateError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Initialize or migrate the database schema.
///
/// Idempotent; safe to call on both new and existing databases.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StateError> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StateError::UnsupportedSchemaVersion {
            found: current_version,
            expected: SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(SCHEMA_V1)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        tracing::debug!("Initialized state schema at version {}", SCHEMA_VERSION);
    } else if current_version < SCHEMA_VERSION {
        for version in (current_version + 1)..=SCHEMA_VERSION {
            migrate_to_version(conn, version)?;
        }
    }

    Ok(())
}

fn migrate_to_version(conn: &Connection, version: i32) -> Result<(), StateError> {
    // Future migrations go here, e.g.:
    // match version {
    //     2 => conn.execute_batch("ALTER TABLE offline_files ADD COLUMN ...")?,
    //     _ => {}
    // }
    let _ = conn;
    tracing::debug!("Migrated state schema to version {}", version);
    Ok(())
}
