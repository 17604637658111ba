//! Column mapping persistence
//!
//! One mapping per file, immutable once saved. The ordered pairs are stored
//! as a JSON array so the user-declared order survives round trips.

use rusqlite::{Error as SqlError, ErrorCode, OptionalExtension, params};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::records::FieldMapping;
use crate::store::{Store, fmt_ts, parse_ts};

impl Store {
    /// Persist a new mapping; rejects a second mapping for the same file
    pub fn save_mapping(&self, mapping: &FieldMapping) -> Result<()> {
        debug!(file_id = %mapping.file_id, pairs = mapping.mappings.len(), "save_mapping");
        let json = serde_json::to_string(&mapping.mappings)?;

        let result = self.conn().execute(
            "INSERT INTO column_mapping (file_id, mappings_json, created_at)
             VALUES (?1, ?2, ?3)",
            params![mapping.file_id.to_string(), json, fmt_ts(&mapping.created_at)],
        );

        match result {
            Ok(_) => Ok(()),
            Err(SqlError::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::MappingExists(mapping.file_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load the mapping for a file, if one was ever saved
    pub fn get_mapping(&self, file_id: Uuid) -> Result<Option<FieldMapping>> {
        let row: Option<(String, String)> = self
            .conn()
            .query_row(
                "SELECT mappings_json, created_at FROM column_mapping WHERE file_id = ?1",
                params![file_id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((json, created_at)) => Ok(Some(FieldMapping {
                file_id,
                mappings: serde_json::from_str(&json)?,
                created_at: parse_ts(&created_at)?,
            })),
            None => Ok(None),
        }
    }

    /// Whether a mapping exists for this file
    pub fn mapping_exists(&self, file_id: Uuid) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM column_mapping WHERE file_id = ?1",
            params![file_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mapping(file_id: Uuid) -> FieldMapping {
        FieldMapping::new(
            file_id,
            vec![
                ("id".to_string(), "TransactionID".to_string()),
                ("date".to_string(), "TransactionDate".to_string()),
            ],
        )
    }

    #[test]
    fn test_save_and_get_mapping_preserves_order() {
        let store = Store::open_in_memory().unwrap();
        let file_id = Uuid::new_v4();
        store.save_mapping(&sample_mapping(file_id)).unwrap();

        let loaded = store.get_mapping(file_id).unwrap().unwrap();
        assert_eq!(loaded.mappings[0].0, "id");
        assert_eq!(loaded.mappings[1].1, "TransactionDate");
    }

    #[test]
    fn test_second_mapping_rejected() {
        let store = Store::open_in_memory().unwrap();
        let file_id = Uuid::new_v4();
        store.save_mapping(&sample_mapping(file_id)).unwrap();

        let err = store.save_mapping(&sample_mapping(file_id)).unwrap_err();
        assert!(matches!(err, StoreError::MappingExists(id) if id == file_id));
    }

    #[test]
    fn test_mapping_absent_for_unknown_file() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_mapping(Uuid::new_v4()).unwrap().is_none());
        assert!(!store.mapping_exists(Uuid::new_v4()).unwrap());
    }
}
