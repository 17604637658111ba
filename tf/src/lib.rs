//! txnflow - CSV transaction ingestion pipeline
//!
//! Files move through three stages connected by at-least-once queues:
//! ingestion accepts raw CSV bytes and stores them durably, validation
//! checks the rows against a user-declared column mapping, and
//! materialization turns validated rows into transaction records. A
//! status ledger (in-process cache over the durable store) answers
//! status and error queries at every point in between.

pub mod boundary;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod mapping;
pub mod pipeline;
pub mod queue;
pub mod validator;
pub mod workers;

pub use boundary::{MappingRequest, StatusReport, UploadReceipt};
pub use config::Config;
pub use error::{PipelineError, Result};
pub use ledger::StatusLedger;
pub use pipeline::Pipeline;
pub use workers::{IngestionWorker, MaterializationWorker, ValidationWorker};
