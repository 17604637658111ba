//! Store handle and schema management

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::Result;

/// Schema applied on open; every statement is idempotent.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS file_metadata (
    file_id                TEXT PRIMARY KEY,
    original_filename      TEXT NOT NULL,
    storage_path           TEXT NOT NULL,
    upload_timestamp       TEXT NOT NULL,
    upload_status          TEXT NOT NULL,
    processing_start_time  TEXT,
    processing_end_time    TEXT,
    error_message          TEXT
);

CREATE TABLE IF NOT EXISTS column_mapping (
    file_id       TEXT PRIMARY KEY,
    mappings_json TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file_processing_status (
    file_id           TEXT PRIMARY KEY,
    status            TEXT NOT NULL,
    error_count       INTEGER NOT NULL DEFAULT 0,
    validation_errors TEXT NOT NULL DEFAULT '[]',
    processing_start  TEXT NOT NULL,
    processing_end    TEXT
);

CREATE TABLE IF NOT EXISTS transactions (
    id               TEXT PRIMARY KEY,
    file_id          TEXT NOT NULL,
    transaction_id   TEXT NOT NULL UNIQUE,
    transaction_date TEXT NOT NULL,
    amount           TEXT NOT NULL,
    customer_name    TEXT NOT NULL,
    payment_method   TEXT NOT NULL,
    shipping_city    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_file ON transactions(file_id);
CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(transaction_date);
";

/// SQLite-backed store shared by all pipeline stages
///
/// The connection is guarded by a mutex; every operation is a short
/// synchronous statement, so contention is negligible next to the file and
/// queue I/O around it.
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at the given path and apply the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::StoreError::Corrupt(format!("cannot create {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "Opened transaction store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        debug!("Opened in-memory transaction store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Lock the connection, recovering from a poisoned mutex
    pub(crate) fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// RFC 3339 timestamp helpers shared by the row mappers
pub(crate) fn fmt_ts(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_ts(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| crate::StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

pub(crate) fn parse_opt_ts(s: Option<String>) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}
