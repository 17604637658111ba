//! Pipeline error taxonomy
//!
//! User-input errors are reported synchronously and never retried.
//! Storage and queue failures are currently terminal for the affected file.
//! Row-level validation findings are data (`Vec<String>` in the status
//! ledger), not `Err` values, so a bad file never aborts early.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by pipeline operations
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The uploaded file had no parseable CSV header row
    #[error("file upload failed: no valid headers found")]
    NoHeaders,

    /// A mapping was already saved for this file; resubmission is user error
    #[error("mapping already exists for file {0}")]
    MappingAlreadyExists(Uuid),

    /// Malformed boundary request (e.g. empty mapping)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("store error: {0}")]
    Store(#[from] txnstore::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The queue transport is gone; nothing downstream will ever consume
    #[error("queue closed")]
    QueueClosed,
}

impl PipelineError {
    /// Whether this error is the caller's fault (no retry, report as-is)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            PipelineError::NoHeaders
                | PipelineError::MappingAlreadyExists(_)
                | PipelineError::InvalidRequest(_)
        )
    }
}

/// Result alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_classification() {
        assert!(PipelineError::NoHeaders.is_user_error());
        assert!(PipelineError::MappingAlreadyExists(Uuid::new_v4()).is_user_error());
        assert!(PipelineError::InvalidRequest("empty".into()).is_user_error());
        assert!(!PipelineError::QueueClosed.is_user_error());
    }
}
