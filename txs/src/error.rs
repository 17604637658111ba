//! Store error types

use thiserror::Error;
use uuid::Uuid;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mapping already exists for file {0}")]
    MappingExists(Uuid),

    #[error("invalid stored value: {0}")]
    Corrupt(String),
}

/// Result alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
