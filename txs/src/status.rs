//! Processing status upserts
//!
//! This is the durable side of the status ledger. Writes are
//! last-writer-wins upserts keyed by file id; `processing_end` is set only
//! when the incoming status is terminal and, once set, is never cleared.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::records::{PipelineStatus, ProcessingStatus};
use crate::store::{Store, fmt_ts, parse_opt_ts, parse_ts};

impl Store {
    /// Upsert the processing status for a file
    ///
    /// `error_count` is derived from the error list, never passed
    /// separately, so the count/list invariant holds by construction.
    pub fn upsert_status(&self, file_id: Uuid, status: PipelineStatus, errors: &[String]) -> Result<()> {
        debug!(%file_id, %status, error_count = errors.len(), "upsert_status");
        let now = fmt_ts(&Utc::now());
        let end = status.is_terminal().then(|| now.clone());
        let errors_json = serde_json::to_string(errors)?;

        self.conn().execute(
            "INSERT INTO file_processing_status
                 (file_id, status, error_count, validation_errors, processing_start, processing_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(file_id) DO UPDATE SET
                 status = excluded.status,
                 error_count = excluded.error_count,
                 validation_errors = excluded.validation_errors,
                 processing_end = COALESCE(excluded.processing_end, file_processing_status.processing_end)",
            params![
                file_id.to_string(),
                status.as_str(),
                errors.len() as i64,
                errors_json,
                now,
                end,
            ],
        )?;
        Ok(())
    }

    /// Status and error count for a file (the ledger's cache-miss read)
    pub fn get_status(&self, file_id: Uuid) -> Result<Option<(PipelineStatus, usize)>> {
        let row: Option<(String, i64)> = self
            .conn()
            .query_row(
                "SELECT status, error_count FROM file_processing_status WHERE file_id = ?1",
                params![file_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((status, count)) => {
                let status = PipelineStatus::parse(&status)
                    .ok_or_else(|| crate::StoreError::Corrupt(format!("bad pipeline status {status:?}")))?;
                Ok(Some((status, count as usize)))
            }
            None => Ok(None),
        }
    }

    /// Full status record including the persisted error list
    pub fn get_full_status(&self, file_id: Uuid) -> Result<Option<ProcessingStatus>> {
        let row: Option<(String, i64, String, String, Option<String>)> = self
            .conn()
            .query_row(
                "SELECT status, error_count, validation_errors, processing_start, processing_end
                   FROM file_processing_status WHERE file_id = ?1",
                params![file_id.to_string()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((status, count, errors_json, started, ended)) => {
                let status = PipelineStatus::parse(&status)
                    .ok_or_else(|| crate::StoreError::Corrupt(format!("bad pipeline status {status:?}")))?;
                Ok(Some(ProcessingStatus {
                    file_id,
                    status,
                    error_count: count as usize,
                    errors: serde_json::from_str(&errors_json)?,
                    started_at: parse_ts(&started)?,
                    ended_at: parse_opt_ts(ended)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Persisted validation error list, if any status record exists
    pub fn validation_errors(&self, file_id: Uuid) -> Result<Option<Vec<String>>> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT validation_errors FROM file_processing_status WHERE file_id = ?1",
                params![file_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_then_read_back() {
        let store = Store::open_in_memory().unwrap();
        let file_id = Uuid::new_v4();

        store
            .upsert_status(file_id, PipelineStatus::Processing, &[])
            .unwrap();

        let (status, count) = store.get_status(file_id).unwrap().unwrap();
        assert_eq!(status, PipelineStatus::Processing);
        assert_eq!(count, 0);

        let full = store.get_full_status(file_id).unwrap().unwrap();
        assert!(full.ended_at.is_none(), "non-terminal status must not set an end time");
    }

    #[test]
    fn test_last_writer_wins() {
        let store = Store::open_in_memory().unwrap();
        let file_id = Uuid::new_v4();
        let errors = vec!["Row 2: Invalid date format.".to_string()];

        store
            .upsert_status(file_id, PipelineStatus::Processing, &[])
            .unwrap();
        store
            .upsert_status(file_id, PipelineStatus::Failed, &errors)
            .unwrap();

        let full = store.get_full_status(file_id).unwrap().unwrap();
        assert_eq!(full.status, PipelineStatus::Failed);
        assert_eq!(full.error_count, full.errors.len());
        assert!(full.ended_at.is_some());
    }

    #[test]
    fn test_processing_end_never_cleared() {
        let store = Store::open_in_memory().unwrap();
        let file_id = Uuid::new_v4();

        store
            .upsert_status(file_id, PipelineStatus::Completed, &[])
            .unwrap();
        let first_end = store.get_full_status(file_id).unwrap().unwrap().ended_at;
        assert!(first_end.is_some());

        // A later non-terminal write must leave the end timestamp alone
        store
            .upsert_status(file_id, PipelineStatus::Processing, &[])
            .unwrap();
        let full = store.get_full_status(file_id).unwrap().unwrap();
        assert_eq!(full.ended_at, first_end);
    }

    #[test]
    fn test_status_absent_for_unknown_file() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_status(Uuid::new_v4()).unwrap().is_none());
        assert!(store.validation_errors(Uuid::new_v4()).unwrap().is_none());
    }
}
