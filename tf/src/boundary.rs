//! Typed contracts for the outer transport layer
//!
//! The pipeline exposes upload, mapping registration, status, and error
//! queries as plain functions over these types; whatever serves them over
//! the wire serializes them as-is.

use serde::{Deserialize, Serialize};
use txnstore::PipelineStatus;
use uuid::Uuid;

/// Receipt returned from a successful upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub file_id: Uuid,
    pub original_filename: String,
    pub sanitized_filename: String,
    /// Header row of the uploaded CSV, for building a mapping
    pub headers: Vec<String>,
    pub message: String,
}

/// A mapping registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRequest {
    pub file_id: Uuid,
    /// Ordered `source column -> canonical field` pairs
    pub mappings: Vec<(String, String)>,
}

/// Answer to a status query
///
/// An unknown file id yields the `NOT_FOUND` form rather than an error;
/// callers poll this endpoint and absence is an ordinary answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub file_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_count: Option<usize>,
    /// Where to fetch the paginated error list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_url: Option<String>,
}

impl StatusReport {
    pub fn found(file_id: Uuid, status: PipelineStatus, error_count: usize) -> Self {
        Self {
            file_id,
            status: status.as_str().to_string(),
            error_count: Some(error_count),
            error_url: Some(error_url(file_id)),
        }
    }

    pub fn not_found(file_id: Uuid) -> Self {
        Self {
            file_id,
            status: "NOT_FOUND".to_string(),
            error_count: None,
            error_url: None,
        }
    }
}

/// Relative URL of the error listing for a file
pub fn error_url(file_id: Uuid) -> String {
    format!("/api/mapping/errors/{file_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_report_carries_error_url() {
        let file_id = Uuid::new_v4();
        let report = StatusReport::found(file_id, PipelineStatus::Failed, 2);

        assert_eq!(report.status, "FAILED");
        assert_eq!(report.error_count, Some(2));
        assert_eq!(report.error_url, Some(format!("/api/mapping/errors/{file_id}")));
    }

    #[test]
    fn test_not_found_report_omits_details() {
        let report = StatusReport::not_found(Uuid::new_v4());
        assert_eq!(report.status, "NOT_FOUND");

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("errorCount").is_none());
        assert!(json.get("errorUrl").is_none());
    }
}
