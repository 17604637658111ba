//! Persisted record types shared across pipeline stages

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upload lifecycle of a file, owned by the ingestion stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Pending,
    Processing,
    Uploaded,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "PENDING",
            UploadStatus::Processing => "PROCESSING",
            UploadStatus::Uploaded => "UPLOADED",
            UploadStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(UploadStatus::Pending),
            "PROCESSING" => Some(UploadStatus::Processing),
            "UPLOADED" => Some(UploadStatus::Uploaded),
            "FAILED" => Some(UploadStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing stage outcome tracked by the status ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Processing,
    Failed,
    Completed,
}

impl PipelineStatus {
    /// Terminal statuses set `processing_end`; `Processing` never does.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Failed | PipelineStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Processing => "PROCESSING",
            PipelineStatus::Failed => "FAILED",
            PipelineStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROCESSING" => Some(PipelineStatus::Processing),
            "FAILED" => Some(PipelineStatus::Failed),
            "COMPLETED" => Some(PipelineStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one uploaded file
///
/// Created once at ingestion; only the ingestion worker mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: Uuid,
    pub original_filename: String,
    /// Where the bytes actually live on disk (derived from the file id)
    pub storage_path: String,
    pub uploaded_at: DateTime<Utc>,
    pub status: UploadStatus,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_ended_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl FileRecord {
    /// New record in `Pending` state with a freshly generated file id
    pub fn new(original_filename: impl Into<String>, storage_path: impl Into<String>) -> Self {
        Self {
            file_id: Uuid::new_v4(),
            original_filename: original_filename.into(),
            storage_path: storage_path.into(),
            uploaded_at: Utc::now(),
            status: UploadStatus::Pending,
            processing_started_at: None,
            processing_ended_at: None,
            error_message: None,
        }
    }
}

/// User-declared column mapping for one file
///
/// Ordered `source column -> canonical field` pairs. Immutable once saved;
/// a second save for the same file id is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub file_id: Uuid,
    pub mappings: Vec<(String, String)>,
    pub created_at: DateTime<Utc>,
}

impl FieldMapping {
    pub fn new(file_id: Uuid, mappings: Vec<(String, String)>) -> Self {
        Self {
            file_id,
            mappings,
            created_at: Utc::now(),
        }
    }
}

/// The durable half of the status ledger, keyed 1:1 by file id
///
/// Invariant: when `status` is `Failed` from validation, `error_count`
/// equals `errors.len()`; `ended_at` is set iff the status is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub file_id: Uuid,
    pub status: PipelineStatus,
    pub error_count: usize,
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One materialized transaction row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Generated row identity
    pub id: Uuid,
    /// Owning file
    pub file_id: Uuid,
    /// Business transaction id, unique across the whole store
    pub transaction_id: String,
    pub transaction_date: NaiveDate,
    pub amount: Decimal,
    pub customer_name: String,
    pub payment_method: String,
    pub shipping_city: String,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        file_id: Uuid,
        transaction_id: impl Into<String>,
        transaction_date: NaiveDate,
        amount: Decimal,
        customer_name: impl Into<String>,
        payment_method: impl Into<String>,
        shipping_city: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_id,
            transaction_id: transaction_id.into(),
            transaction_date,
            amount,
            customer_name: customer_name.into(),
            payment_method: payment_method.into(),
            shipping_city: shipping_city.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips() {
        for s in [
            UploadStatus::Pending,
            UploadStatus::Processing,
            UploadStatus::Uploaded,
            UploadStatus::Failed,
        ] {
            assert_eq!(UploadStatus::parse(s.as_str()), Some(s));
        }
        for s in [
            PipelineStatus::Processing,
            PipelineStatus::Failed,
            PipelineStatus::Completed,
        ] {
            assert_eq!(PipelineStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(PipelineStatus::parse("NOT_A_STATUS"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!PipelineStatus::Processing.is_terminal());
        assert!(PipelineStatus::Failed.is_terminal());
        assert!(PipelineStatus::Completed.is_terminal());
    }

    #[test]
    fn test_new_file_record_is_pending() {
        let record = FileRecord::new("sales.csv", "/tmp/uploads/x.csv");
        assert_eq!(record.status, UploadStatus::Pending);
        assert!(record.processing_started_at.is_none());
        assert!(record.error_message.is_none());
    }
}
