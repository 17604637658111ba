//! Pipeline stage workers

mod ingest;
mod materialize;
mod validate;

pub use ingest::{sanitize_filename, IngestionWorker, ASYNC_UPLOAD_THRESHOLD};
pub use materialize::{MaterializationWorker, MaterializeOutcome};
pub use validate::ValidationWorker;
