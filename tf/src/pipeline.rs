//! Pipeline assembly and the boundary operations
//!
//! `Pipeline::start` wires the three stage workers together with bounded
//! in-process queues and spawns one consumer loop per queue. Each loop
//! fans messages out to a semaphore-bounded set of tasks, so a slow file
//! does not stall the queue while total concurrency stays capped.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};
use txnstore::{FieldMapping, PipelineStatus, Store, StoreError};
use uuid::Uuid;

use crate::boundary::{MappingRequest, StatusReport, UploadReceipt};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::ledger::StatusLedger;
use crate::queue::{
    parse_file_id, InProcessQueue, QueuePublisher, QueueReceiver, MATERIALIZE_QUEUE, VALIDATE_QUEUE,
};
use crate::workers::{IngestionWorker, MaterializationWorker, ValidationWorker};

/// The assembled pipeline: boundary operations in, side effects out
pub struct Pipeline {
    store: Arc<Store>,
    ledger: Arc<StatusLedger>,
    ingest: IngestionWorker,
    validate_queue: InProcessQueue,
    consumers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Wire the stages and spawn both queue consumers
    pub fn start(config: &Config, store: Arc<Store>) -> Self {
        let upload_dir = config.storage.upload_dir.clone();
        let capacity = config.workers.queue_capacity.max(1);
        let max_concurrent = config.workers.max_concurrent.max(1);

        let ledger = Arc::new(StatusLedger::new(store.clone()));
        let (validate_queue, validate_rx) = InProcessQueue::channel(VALIDATE_QUEUE, capacity);
        let (materialize_queue, materialize_rx) =
            InProcessQueue::channel(MATERIALIZE_QUEUE, capacity);

        let ingest = IngestionWorker::new(store.clone(), upload_dir.clone());
        let validation = ValidationWorker::new(
            store.clone(),
            ledger.clone(),
            upload_dir.clone(),
            Arc::new(materialize_queue),
        );
        let materialization = MaterializationWorker::new(
            store.clone(),
            upload_dir,
            config.materialize.batch_size,
        );

        let consumers = vec![
            spawn_consumer(validate_rx, max_concurrent, move |file_id| {
                let worker = validation.clone();
                async move { worker.process(file_id).await }
            }),
            spawn_consumer(materialize_rx, max_concurrent, move |file_id| {
                let worker = materialization.clone();
                async move {
                    worker.process(file_id).await;
                }
            }),
        ];

        Self {
            store,
            ledger,
            ingest,
            validate_queue,
            consumers,
        }
    }

    /// Upload boundary: accept CSV bytes, return the receipt
    pub async fn upload(&self, bytes: Vec<u8>, original_filename: &str) -> Result<UploadReceipt> {
        self.ingest.upload(bytes, original_filename).await
    }

    /// Upload status boundary
    pub fn upload_status(&self, file_id: Uuid) -> String {
        self.ingest.status(file_id)
    }

    /// Mapping boundary: save the mapping once, then kick off validation
    ///
    /// The `PROCESSING` status is observable before the queue message is in
    /// flight, so a poll racing the publish never sees a gap.
    pub async fn save_mapping(&self, request: MappingRequest) -> Result<()> {
        if request.mappings.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "mappings must not be empty".to_string(),
            ));
        }

        let mapping = FieldMapping::new(request.file_id, request.mappings);
        match self.store.save_mapping(&mapping) {
            Err(StoreError::MappingExists(id)) => {
                warn!(file_id = %id, "Rejecting second mapping for file");
                return Err(PipelineError::MappingAlreadyExists(id));
            }
            other => other?,
        }

        self.ledger
            .upsert(request.file_id, PipelineStatus::Processing, &[])?;
        self.validate_queue.publish(request.file_id).await?;
        info!(file_id = %request.file_id, "Mapping saved, file queued for validation");
        Ok(())
    }

    /// Status boundary: an unknown file id is an answer, not an error
    pub fn status_report(&self, file_id: Uuid) -> Result<StatusReport> {
        Ok(match self.ledger.get(file_id)? {
            Some((status, error_count)) => StatusReport::found(file_id, status, error_count),
            None => StatusReport::not_found(file_id),
        })
    }

    /// Error listing boundary (1-based page)
    pub fn validation_errors(&self, file_id: Uuid, page: usize, size: usize) -> Result<Vec<String>> {
        self.ledger.errors(file_id, page, size)
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<StatusLedger> {
        &self.ledger
    }

    /// Close intake and wait for in-flight work to drain
    ///
    /// Dropping the validate publisher ends the validation loop; that drops
    /// the last materialize publisher, which ends the second loop in turn.
    pub async fn shutdown(mut self) {
        let consumers = std::mem::take(&mut self.consumers);
        drop(self);
        for handle in consumers {
            let _ = handle.await;
        }
    }
}

/// One consumer loop: recv, parse, dispatch onto a bounded task set
fn spawn_consumer<F, Fut>(
    mut rx: QueueReceiver,
    max_concurrent: usize,
    handler: F,
) -> JoinHandle<()>
where
    F: Fn(Uuid) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut tasks = JoinSet::new();

        while let Some(body) = rx.recv().await {
            let Some(file_id) = parse_file_id(rx.name(), &body) else {
                continue;
            };
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let work = handler(file_id);
            tasks.spawn(async move {
                work.await;
                drop(permit);
            });
            while tasks.try_join_next().is_some() {}
        }

        // Channel closed: drain what is still running
        while tasks.join_next().await.is_some() {}
        info!(queue = rx.name(), "Queue consumer stopped");
    })
}
