//! Durable per-user state: offline file records, saved selections, the
//! pending-cleanup list, Studio video records, store cache rows, and sync
//! run history. One SQLite file per `{host}-{userID}`.

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{SqliteStateDb, StateDb};
pub use error::StateError;
pub use types::{FileRecord, FileStatus, StateSummary, StudioVideoRecord, SyncRunStats};
