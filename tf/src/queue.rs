//! Stage-to-stage queue channels
//!
//! The real broker is an external collaborator; the pipeline only assumes
//! an at-least-once text channel whose message body is exactly the file id.
//! Consumers therefore tolerate duplicate delivery and garbage bodies.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Channel fed by mapping registration, consumed by the validation worker
pub const VALIDATE_QUEUE: &str = "csv-processing-queue";

/// Channel fed by the validation worker, consumed by materialization
pub const MATERIALIZE_QUEUE: &str = "transaction-processing-queue";

/// Publisher half of a stage-to-stage channel
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Publish a file id for the downstream stage
    async fn publish(&self, file_id: Uuid) -> Result<()>;
}

/// In-process bounded channel implementing the transport contract
#[derive(Clone)]
pub struct InProcessQueue {
    name: &'static str,
    tx: mpsc::Sender<String>,
}

impl InProcessQueue {
    /// Create a named channel pair with bounded capacity
    pub fn channel(name: &'static str, capacity: usize) -> (Self, QueueReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { name, tx }, QueueReceiver { name, rx })
    }

    pub fn name(&self) -> &str {
        self.name
    }
}

#[async_trait]
impl QueuePublisher for InProcessQueue {
    async fn publish(&self, file_id: Uuid) -> Result<()> {
        debug!(queue = self.name, %file_id, "publish");
        self.tx
            .send(file_id.to_string())
            .await
            .map_err(|_| PipelineError::QueueClosed)
    }
}

/// Consumer half of a channel
pub struct QueueReceiver {
    name: &'static str,
    rx: mpsc::Receiver<String>,
}

impl QueueReceiver {
    /// Next message body, or `None` once every publisher is gone
    pub async fn recv(&mut self) -> Option<String> {
        let body = self.rx.recv().await;
        if let Some(body) = &body {
            debug!(queue = self.name, body, "recv");
        }
        body
    }

    pub fn name(&self) -> &str {
        self.name
    }
}

/// Parse a message body into a file id
///
/// A malformed body is the transport's problem, not ours: log and drop.
pub fn parse_file_id(queue: &str, body: &str) -> Option<Uuid> {
    match Uuid::parse_str(body) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(queue, body, "Dropping malformed queue message");
            None
        }
    }
}
