//! Validation worker: one queue message in, one terminal verdict out
//!
//! Consumes "ready to validate" file ids. Every path through this worker
//! ends in a ledger upsert: missing mapping, unreadable file, validation
//! errors, or a clean pass that also enqueues materialization. Re-delivery
//! of the same id re-runs the whole thing and lands on the same verdict.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use txnstore::{FieldMapping, PipelineStatus, Store};
use uuid::Uuid;

use crate::error::Result;
use crate::ledger::StatusLedger;
use crate::mapping::MappingTable;
use crate::queue::QueuePublisher;
use crate::validator::validate_rows;

#[derive(Clone)]
pub struct ValidationWorker {
    store: Arc<Store>,
    ledger: Arc<StatusLedger>,
    upload_dir: PathBuf,
    materialize_queue: Arc<dyn QueuePublisher>,
}

impl ValidationWorker {
    pub fn new(
        store: Arc<Store>,
        ledger: Arc<StatusLedger>,
        upload_dir: PathBuf,
        materialize_queue: Arc<dyn QueuePublisher>,
    ) -> Self {
        Self {
            store,
            ledger,
            upload_dir,
            materialize_queue,
        }
    }

    /// Handle one queue message
    ///
    /// Never propagates an error to the consumer loop; an unexpected
    /// failure becomes a best-effort `FAILED` verdict instead.
    pub async fn process(&self, file_id: Uuid) {
        if let Err(e) = self.run(file_id).await {
            error!(%file_id, error = %e, "Validation failed unexpectedly");
            let errors = vec![format!("Unexpected processing error: {e}")];
            // Best effort: the ledger logs its own durable failures
            let _ = self.ledger.upsert(file_id, PipelineStatus::Failed, &errors);
        }
    }

    async fn run(&self, file_id: Uuid) -> Result<()> {
        let Some(mapping) = self.store.get_mapping(file_id)? else {
            warn!(%file_id, "No column mapping found for validation");
            let errors = vec!["No column mapping found.".to_string()];
            self.set_status(file_id, PipelineStatus::Failed, &errors);
            return Ok(());
        };

        let path = self.upload_dir.join(format!("{file_id}.csv"));
        match read_and_validate(&path, &mapping) {
            Err(e) => {
                warn!(%file_id, error = %e, "Uploaded file unreadable during validation");
                let errors = vec![format!("Failed to read uploaded file: {e}")];
                self.set_status(file_id, PipelineStatus::Failed, &errors);
            }
            Ok(errors) if !errors.is_empty() => {
                info!(%file_id, error_count = errors.len(), "Validation found errors");
                self.set_status(file_id, PipelineStatus::Failed, &errors);
            }
            Ok(_) => {
                info!(%file_id, "Validation passed");
                self.set_status(file_id, PipelineStatus::Completed, &[]);
                self.materialize_queue.publish(file_id).await?;
            }
        }
        Ok(())
    }

    /// Record the verdict; a durable write failure must not turn a real
    /// validation result into a generic one, so it is logged and dropped.
    fn set_status(&self, file_id: Uuid, status: PipelineStatus, errors: &[String]) {
        if self.ledger.upsert(file_id, status, errors).is_err() {
            warn!(%file_id, %status, "Verdict reached but durable status write failed");
        }
    }
}

/// Read the whole file and run both mandatory checks over every row
///
/// Row numbers are 1-based counting the header row, so the first data row
/// reports as row 2.
fn read_and_validate(path: &Path, mapping: &FieldMapping) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let table = MappingTable::build(mapping, &headers);

    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }
    Ok(validate_rows(
        records.iter().enumerate().map(|(i, r)| (i as u64 + 2, r)),
        &table,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{InProcessQueue, MATERIALIZE_QUEUE};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<Store>,
        ledger: Arc<StatusLedger>,
        worker: ValidationWorker,
        materialize_rx: crate::queue::QueueReceiver,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let ledger = Arc::new(StatusLedger::new(store.clone()));
        let (queue, materialize_rx) = InProcessQueue::channel(MATERIALIZE_QUEUE, 8);
        let worker = ValidationWorker::new(
            store.clone(),
            ledger.clone(),
            dir.path().to_path_buf(),
            Arc::new(queue),
        );
        Fixture {
            _dir: dir,
            store,
            ledger,
            worker,
            materialize_rx,
        }
    }

    fn seed(fx: &Fixture, file_id: Uuid, csv: &str) {
        std::fs::write(fx._dir.path().join(format!("{file_id}.csv")), csv).unwrap();
        fx.store
            .save_mapping(&FieldMapping::new(
                file_id,
                vec![
                    ("id".into(), "TransactionID".into()),
                    ("date".into(), "TransactionDate".into()),
                ],
            ))
            .unwrap();
    }

    #[tokio::test]
    async fn test_clean_file_completes_and_enqueues() {
        let mut fx = fixture();
        let file_id = Uuid::new_v4();
        seed(&fx, file_id, "id,date\nT1,2024-01-05\nT2,2024-01-06\n");

        fx.worker.process(file_id).await;

        assert_eq!(
            fx.ledger.get(file_id).unwrap(),
            Some((PipelineStatus::Completed, 0))
        );
        assert_eq!(fx.materialize_rx.recv().await.unwrap(), file_id.to_string());
    }

    #[tokio::test]
    async fn test_errors_fail_without_enqueue() {
        let fx = fixture();
        let file_id = Uuid::new_v4();
        seed(&fx, file_id, "id,date\nT1,2024-01-05\nT1,bad-date\n");

        fx.worker.process(file_id).await;

        assert_eq!(
            fx.ledger.get(file_id).unwrap(),
            Some((PipelineStatus::Failed, 2))
        );
        let errors = fx.ledger.errors(file_id, 1, 10).unwrap();
        assert_eq!(
            errors,
            vec![
                "Row 3: Duplicate or missing TransactionID.".to_string(),
                "Row 3: Invalid date format.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_mapping_fails_with_single_error() {
        let fx = fixture();
        let file_id = Uuid::new_v4();
        std::fs::write(fx._dir.path().join(format!("{file_id}.csv")), "id\nT1\n").unwrap();

        fx.worker.process(file_id).await;

        assert_eq!(
            fx.ledger.get(file_id).unwrap(),
            Some((PipelineStatus::Failed, 1))
        );
        assert_eq!(
            fx.ledger.errors(file_id, 1, 10).unwrap(),
            vec!["No column mapping found.".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unreadable_file_fails_with_single_error() {
        let fx = fixture();
        let file_id = Uuid::new_v4();
        // Mapping exists, bytes do not
        fx.store
            .save_mapping(&FieldMapping::new(
                file_id,
                vec![("id".into(), "TransactionID".into())],
            ))
            .unwrap();

        fx.worker.process(file_id).await;

        let (status, error_count) = fx.ledger.get(file_id).unwrap().unwrap();
        assert_eq!(status, PipelineStatus::Failed);
        assert_eq!(error_count, 1);
    }

    #[tokio::test]
    async fn test_redelivery_lands_on_same_verdict() {
        let mut fx = fixture();
        let file_id = Uuid::new_v4();
        seed(&fx, file_id, "id,date\nT1,2024-01-05\n");

        fx.worker.process(file_id).await;
        fx.worker.process(file_id).await;

        // Same verdict both times, one materialization message per delivery
        assert_eq!(
            fx.ledger.get(file_id).unwrap(),
            Some((PipelineStatus::Completed, 0))
        );
        assert_eq!(fx.materialize_rx.recv().await.unwrap(), file_id.to_string());
        assert_eq!(fx.materialize_rx.recv().await.unwrap(), file_id.to_string());
    }
}
