//! txnstore - durable storage for the txnflow pipeline
//!
//! SQLite-backed persistence for every record the pipeline shares across
//! stages: uploaded-file metadata, user-declared column mappings, the
//! per-file processing status (the durable half of the status ledger), and
//! the materialized transactions themselves.
//!
//! The store is deliberately dumb: it owns schema and SQL, nothing else.
//! Pipeline semantics (status transitions, validation, batching) live in
//! the `txnflow` crate.

pub mod error;
pub mod records;
pub mod store;

mod files;
mod mappings;
mod status;
mod transactions;

pub use error::{Result, StoreError};
pub use records::{
    FieldMapping, FileRecord, PipelineStatus, ProcessingStatus, Transaction, UploadStatus,
};
pub use store::Store;
pub use transactions::CityTotal;
