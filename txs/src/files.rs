//! File metadata operations

use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::records::{FileRecord, UploadStatus};
use crate::store::{Store, fmt_ts, parse_opt_ts, parse_ts};

impl Store {
    /// Insert a freshly created file record
    pub fn insert_file(&self, record: &FileRecord) -> Result<()> {
        debug!(file_id = %record.file_id, status = %record.status, "insert_file");
        self.conn().execute(
            "INSERT INTO file_metadata
                 (file_id, original_filename, storage_path, upload_timestamp,
                  upload_status, processing_start_time, processing_end_time, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.file_id.to_string(),
                record.original_filename,
                record.storage_path,
                fmt_ts(&record.uploaded_at),
                record.status.as_str(),
                record.processing_started_at.as_ref().map(fmt_ts),
                record.processing_ended_at.as_ref().map(fmt_ts),
                record.error_message,
            ],
        )?;
        Ok(())
    }

    /// Rewrite the mutable fields of an existing file record
    pub fn update_file(&self, record: &FileRecord) -> Result<()> {
        debug!(file_id = %record.file_id, status = %record.status, "update_file");
        self.conn().execute(
            "UPDATE file_metadata
                SET upload_status = ?2,
                    processing_start_time = ?3,
                    processing_end_time = ?4,
                    error_message = ?5
              WHERE file_id = ?1",
            params![
                record.file_id.to_string(),
                record.status.as_str(),
                record.processing_started_at.as_ref().map(fmt_ts),
                record.processing_ended_at.as_ref().map(fmt_ts),
                record.error_message,
            ],
        )?;
        Ok(())
    }

    /// Load a file record by id
    pub fn get_file(&self, file_id: Uuid) -> Result<Option<FileRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT file_id, original_filename, storage_path, upload_timestamp,
                    upload_status, processing_start_time, processing_end_time, error_message
               FROM file_metadata WHERE file_id = ?1",
        )?;
        let row = stmt
            .query_row(params![file_id.to_string()], map_file_row)
            .optional()?;
        row.transpose()
    }

    /// Upload status string for a file, if the file is known
    pub fn file_status(&self, file_id: Uuid) -> Result<Option<UploadStatus>> {
        let status: Option<String> = self
            .conn()
            .query_row(
                "SELECT upload_status FROM file_metadata WHERE file_id = ?1",
                params![file_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match status {
            Some(s) => UploadStatus::parse(&s)
                .map(Some)
                .ok_or_else(|| crate::StoreError::Corrupt(format!("bad upload status {s:?}"))),
            None => Ok(None),
        }
    }
}

fn map_file_row(row: &Row<'_>) -> rusqlite::Result<Result<FileRecord>> {
    let file_id: String = row.get(0)?;
    let uploaded_at: String = row.get(3)?;
    let status: String = row.get(4)?;
    let started: Option<String> = row.get(5)?;
    let ended: Option<String> = row.get(6)?;

    Ok(build_file_record(
        file_id,
        row.get(1)?,
        row.get(2)?,
        uploaded_at,
        status,
        started,
        ended,
        row.get(7)?,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_file_record(
    file_id: String,
    original_filename: String,
    storage_path: String,
    uploaded_at: String,
    status: String,
    started: Option<String>,
    ended: Option<String>,
    error_message: Option<String>,
) -> Result<FileRecord> {
    Ok(FileRecord {
        file_id: Uuid::parse_str(&file_id)
            .map_err(|e| crate::StoreError::Corrupt(format!("bad file id {file_id:?}: {e}")))?,
        original_filename,
        storage_path,
        uploaded_at: parse_ts(&uploaded_at)?,
        status: UploadStatus::parse(&status)
            .ok_or_else(|| crate::StoreError::Corrupt(format!("bad upload status {status:?}")))?,
        processing_started_at: parse_opt_ts(started)?,
        processing_ended_at: parse_opt_ts(ended)?,
        error_message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_insert_and_get_file() {
        let store = Store::open_in_memory().unwrap();
        let record = FileRecord::new("Sales Q1.csv", "/tmp/uploads/abc.csv");

        store.insert_file(&record).unwrap();

        let loaded = store.get_file(record.file_id).unwrap().unwrap();
        assert_eq!(loaded.original_filename, "Sales Q1.csv");
        assert_eq!(loaded.status, UploadStatus::Pending);
        assert!(loaded.error_message.is_none());
    }

    #[test]
    fn test_update_file_status_and_error() {
        let store = Store::open_in_memory().unwrap();
        let mut record = FileRecord::new("a.csv", "/tmp/a.csv");
        store.insert_file(&record).unwrap();

        record.status = UploadStatus::Failed;
        record.error_message = Some("disk full".to_string());
        record.processing_started_at = Some(Utc::now());
        record.processing_ended_at = Some(Utc::now());
        store.update_file(&record).unwrap();

        let loaded = store.get_file(record.file_id).unwrap().unwrap();
        assert_eq!(loaded.status, UploadStatus::Failed);
        assert_eq!(loaded.error_message.as_deref(), Some("disk full"));
        assert!(loaded.processing_ended_at.is_some());
    }

    #[test]
    fn test_file_status_for_unknown_file() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.file_status(Uuid::new_v4()).unwrap().is_none());
    }
}
