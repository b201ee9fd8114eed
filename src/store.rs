use crate::snapshot::SystemSnapshot;
use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;

pub type RecordId = i64;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS system_stats (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    memory_info TEXT,
    swap_info TEXT,
    storage_info TEXT,
    cpu_info TEXT,
    gpu_usage REAL,
    lscpu_json TEXT
);";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open snapshot database {path}: {source}")]
    Open {
        path: String,
        source: rusqlite::Error,
    },
    #[error("failed to create schema: {0}")]
    Schema(#[source] rusqlite::Error),
    #[error("failed to encode {field}: {source}")]
    Encode {
        field: &'static str,
        source: serde_json::Error,
    },
    #[error("failed to insert snapshot: {0}")]
    Insert(#[source] rusqlite::Error),
}

/// Append-only SQLite log of snapshots. One handle is opened at startup and
/// reused by every cycle.
pub struct SnapshotStore {
    conn: Connection,
}

impl SnapshotStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { conn })
    }

    /// Safe to call on every start; existing rows are left alone.
    pub fn ensure_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(SCHEMA)
            .map_err(StoreError::Schema)
    }

    /// Each sub-entity is encoded on its own so one bad column does not hide the others.
    pub fn append(&self, snapshot: &SystemSnapshot) -> Result<RecordId, StoreError> {
        let memory = encode("memory_info", &snapshot.memory)?;
        let swap = encode("swap_info", &snapshot.swap)?;
        let storage = encode("storage_info", &snapshot.storage)?;
        let cpu = encode("cpu_info", &snapshot.cpu)?;
        let architecture = encode("lscpu_json", &snapshot.architecture)?;

        self.conn
            .execute(
                "INSERT INTO system_stats \
                 (memory_info, swap_info, storage_info, cpu_info, gpu_usage, lscpu_json) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![memory, swap, storage, cpu, snapshot.gpu_usage, architecture],
            )
            .map_err(StoreError::Insert)?;
        Ok(self.conn.last_insert_rowid())
    }

    #[cfg(test)]
    pub(crate) fn open_read_only(path: impl AsRef<Path>) -> Self {
        let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .expect("open read-only database");
        Self { conn }
    }
}

fn encode<T: serde::Serialize>(field: &'static str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Encode { field, source })
}
