//! Ingestion worker: accept raw CSV bytes and persist them durably
//!
//! Upload status lives in a concurrent cache in front of the metadata
//! store so the status endpoint stays cheap while a large write is in
//! flight. Small payloads are written before the receipt returns; large
//! ones are handed to a background task that records exactly one terminal
//! status when the write finishes.

use chrono::Utc;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use txnstore::{FileRecord, Store, UploadStatus};
use uuid::Uuid;

use crate::boundary::UploadReceipt;
use crate::error::{PipelineError, Result};

/// Payloads above this size are written on a background task
pub const ASYNC_UPLOAD_THRESHOLD: usize = 10 * 1024 * 1024;

/// Accepts uploads, stores bytes under `<upload_dir>/<file_id>.csv`
#[derive(Clone)]
pub struct IngestionWorker {
    store: Arc<Store>,
    upload_dir: PathBuf,
    status_cache: Arc<DashMap<Uuid, UploadStatus>>,
}

impl IngestionWorker {
    pub fn new(store: Arc<Store>, upload_dir: PathBuf) -> Self {
        Self {
            store,
            upload_dir,
            status_cache: Arc::new(DashMap::new()),
        }
    }

    /// Accept an upload and return its receipt
    ///
    /// The receipt always carries the generated file id and the CSV header
    /// row; whether the bytes are on disk yet depends on the payload size.
    pub async fn upload(&self, bytes: Vec<u8>, original_filename: &str) -> Result<UploadReceipt> {
        let headers = extract_headers(&bytes)?;
        let sanitized = sanitize_filename(original_filename);

        let file_id = Uuid::new_v4();
        // The storage path derives from the file id, never the client
        // filename, so downstream stages can re-open the bytes knowing
        // only the id.
        let storage_path = self.upload_dir.join(format!("{file_id}.csv"));
        let mut record = FileRecord {
            file_id,
            original_filename: original_filename.to_string(),
            storage_path: storage_path.to_string_lossy().into_owned(),
            uploaded_at: Utc::now(),
            status: UploadStatus::Pending,
            processing_started_at: None,
            processing_ended_at: None,
            error_message: None,
        };
        self.store.insert_file(&record)?;
        self.status_cache.insert(file_id, UploadStatus::Pending);
        info!(
            %file_id,
            original = original_filename,
            sanitized = %sanitized,
            size = bytes.len(),
            "Upload accepted"
        );

        let message = if bytes.len() > ASYNC_UPLOAD_THRESHOLD {
            self.begin_async_store(record, bytes);
            "File upload started asynchronously.".to_string()
        } else {
            match self.write_bytes(&storage_path, &bytes) {
                Ok(()) => {
                    self.transition(&mut record, UploadStatus::Uploaded, None);
                    "File uploaded successfully.".to_string()
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.transition(&mut record, UploadStatus::Failed, Some(reason.clone()));
                    format!("File upload failed: {reason}")
                }
            }
        };

        Ok(UploadReceipt {
            file_id,
            original_filename: original_filename.to_string(),
            sanitized_filename: sanitized,
            headers,
            message,
        })
    }

    /// Upload status for the status endpoint; never fails
    pub fn status(&self, file_id: Uuid) -> String {
        if let Some(status) = self.status_cache.get(&file_id) {
            return status.to_string();
        }
        match self.store.file_status(file_id) {
            Ok(Some(status)) => {
                self.status_cache.insert(file_id, status);
                status.to_string()
            }
            Ok(None) => "UNKNOWN".to_string(),
            Err(e) => {
                error!(%file_id, error = %e, "Upload status lookup failed");
                "UNKNOWN".to_string()
            }
        }
    }

    /// Large-payload path: mark the record in-flight and write on a task
    fn begin_async_store(&self, mut record: FileRecord, bytes: Vec<u8>) {
        record.processing_started_at = Some(Utc::now());
        self.transition(&mut record, UploadStatus::Processing, None);

        let worker = self.clone();
        tokio::spawn(async move {
            let path = PathBuf::from(&record.storage_path);
            let result = match tokio::fs::create_dir_all(&worker.upload_dir).await {
                Ok(()) => tokio::fs::write(&path, &bytes).await,
                Err(e) => Err(e),
            };
            record.processing_ended_at = Some(Utc::now());
            // Exactly one terminal status per upload
            match result {
                Ok(()) => worker.transition(&mut record, UploadStatus::Uploaded, None),
                Err(e) => {
                    warn!(file_id = %record.file_id, error = %e, "Background upload write failed");
                    worker.transition(&mut record, UploadStatus::Failed, Some(e.to_string()));
                }
            }
        });
    }

    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Apply a status transition to cache and store
    ///
    /// A failed durable write is logged, not propagated; the cache keeps
    /// answering status queries and the store catches up on the next write.
    fn transition(&self, record: &mut FileRecord, status: UploadStatus, error: Option<String>) {
        record.status = status;
        record.error_message = error;
        self.status_cache.insert(record.file_id, status);
        if let Err(e) = self.store.update_file(record) {
            error!(file_id = %record.file_id, %status, error = %e, "File status write failed");
        }
    }
}

/// Parse the header row out of raw CSV bytes
fn extract_headers(bytes: &[u8]) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|_| PipelineError::NoHeaders)?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(PipelineError::NoHeaders);
    }
    Ok(headers)
}

/// Neutralize a client-supplied filename for display and logging
///
/// A run of whitespace collapses to a single underscore; anything outside
/// `[A-Za-z0-9._-]` is dropped.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
        } else {
            in_whitespace = false;
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                out.push(c);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn worker(dir: &TempDir) -> IngestionWorker {
        IngestionWorker::new(
            Arc::new(Store::open_in_memory().unwrap()),
            dir.path().to_path_buf(),
        )
    }

    #[tokio::test]
    async fn test_small_upload_is_synchronous() {
        let dir = TempDir::new().unwrap();
        let worker = worker(&dir);

        let csv = b"id,date,amount\nT1,2024-01-05,1.00\n".to_vec();
        let receipt = worker.upload(csv, "Sales Q1.csv").await.unwrap();

        assert_eq!(receipt.headers, vec!["id", "date", "amount"]);
        assert_eq!(receipt.sanitized_filename, "Sales_Q1.csv");
        assert_eq!(receipt.message, "File uploaded successfully.");
        assert_eq!(worker.status(receipt.file_id), "UPLOADED");

        // Bytes live at <upload_dir>/<file_id>.csv
        let stored = dir.path().join(format!("{}.csv", receipt.file_id));
        assert!(stored.exists());
    }

    #[tokio::test]
    async fn test_headerless_upload_is_rejected_without_a_record() {
        let dir = TempDir::new().unwrap();
        let worker = worker(&dir);

        let err = worker.upload(Vec::new(), "empty.csv").await.unwrap_err();
        assert!(matches!(err, PipelineError::NoHeaders));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_large_upload_reaches_uploaded_in_background() {
        let dir = TempDir::new().unwrap();
        let worker = worker(&dir);

        let mut csv = b"id,date,amount\n".to_vec();
        csv.resize(ASYNC_UPLOAD_THRESHOLD + 1, b'x');
        let receipt = worker.upload(csv, "big.csv").await.unwrap();
        assert_eq!(receipt.message, "File upload started asynchronously.");

        let mut status = worker.status(receipt.file_id);
        for _ in 0..100 {
            if status == "UPLOADED" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = worker.status(receipt.file_id);
        }
        assert_eq!(status, "UPLOADED");
        assert!(dir.path().join(format!("{}.csv", receipt.file_id)).exists());
    }

    #[tokio::test]
    async fn test_unknown_file_status() {
        let dir = TempDir::new().unwrap();
        assert_eq!(worker(&dir).status(Uuid::new_v4()), "UNKNOWN");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Sales Q1 2024.csv"), "Sales_Q1_2024.csv");
        assert_eq!(sanitize_filename("../../etc/passwd"), "....etcpasswd");
        assert_eq!(sanitize_filename("répört.csv"), "rprt.csv");
        assert_eq!(sanitize_filename("a-b_c.d"), "a-b_c.d");
    }

    #[test]
    fn test_sanitize_collapses_whitespace_runs() {
        assert_eq!(sanitize_filename("a  b.csv"), "a_b.csv");
        assert_eq!(sanitize_filename("a \t\n b.csv"), "a_b.csv");
        assert_eq!(sanitize_filename("  leading.csv"), "_leading.csv");
    }
}
