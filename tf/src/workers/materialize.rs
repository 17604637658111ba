//! Materialization worker: from validated CSV bytes to transaction rows
//!
//! Re-reads the stored file and re-derives every row through the mapping
//! table rather than trusting anything computed during validation. Rows
//! that fail extraction are skipped and counted, never inserted partially.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use txnstore::{Store, Transaction};
use uuid::Uuid;

use crate::error::Result;
use crate::mapping::MappingTable;

/// What one materialization run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeOutcome {
    pub inserted: usize,
    pub skipped: usize,
    pub failed_batches: usize,
}

#[derive(Clone)]
pub struct MaterializationWorker {
    store: Arc<Store>,
    upload_dir: PathBuf,
    batch_size: usize,
}

impl MaterializationWorker {
    pub fn new(store: Arc<Store>, upload_dir: PathBuf, batch_size: usize) -> Self {
        Self {
            store,
            upload_dir,
            batch_size: batch_size.max(1),
        }
    }

    /// Handle one queue message; never propagates to the consumer loop
    pub async fn process(&self, file_id: Uuid) -> MaterializeOutcome {
        match self.run(file_id) {
            Ok(outcome) => {
                info!(
                    %file_id,
                    inserted = outcome.inserted,
                    skipped = outcome.skipped,
                    failed_batches = outcome.failed_batches,
                    "Materialization finished"
                );
                if outcome.skipped > 0 {
                    warn!(%file_id, skipped = outcome.skipped, "Rows skipped during materialization");
                }
                outcome
            }
            Err(e) => {
                error!(%file_id, error = %e, "Materialization failed");
                MaterializeOutcome::default()
            }
        }
    }

    fn run(&self, file_id: Uuid) -> Result<MaterializeOutcome> {
        let Some(mapping) = self.store.get_mapping(file_id)? else {
            warn!(%file_id, "No column mapping found for materialization");
            return Ok(MaterializeOutcome::default());
        };

        let path = self.upload_dir.join(format!("{file_id}.csv"));
        let mut reader = csv::Reader::from_path(&path)?;
        let headers = reader.headers()?.clone();
        let table = MappingTable::build(&mapping, &headers);

        let mut outcome = MaterializeOutcome::default();
        let mut batch: Vec<Transaction> = Vec::with_capacity(self.batch_size);
        for record in reader.records() {
            let record = record?;
            match table.extract(&record) {
                Some(row) => {
                    batch.push(row.into_transaction(file_id));
                    if batch.len() >= self.batch_size {
                        self.flush(file_id, &mut batch, &mut outcome);
                    }
                }
                None => outcome.skipped += 1,
            }
        }
        self.flush(file_id, &mut batch, &mut outcome);
        Ok(outcome)
    }

    /// Insert one batch; a failed batch is abandoned whole and the run
    /// continues with the next one.
    fn flush(
        &self,
        file_id: Uuid,
        batch: &mut Vec<Transaction>,
        outcome: &mut MaterializeOutcome,
    ) {
        if batch.is_empty() {
            return;
        }
        match self.store.insert_batch(batch) {
            Ok(()) => outcome.inserted += batch.len(),
            Err(e) => {
                error!(%file_id, rows = batch.len(), error = %e, "Batch insert failed, abandoning batch");
                outcome.failed_batches += 1;
            }
        }
        batch.clear();
    }
}
