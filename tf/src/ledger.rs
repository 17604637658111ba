//! Status ledger: the authoritative view of a file's pipeline progress
//!
//! A concurrent in-process cache fronts the durable upsert store. Writes go
//! cache-first; a failed durable write leaves the cache briefly ahead of
//! the store, which is tolerated because reads fall back to the store on a
//! cache miss and repopulate. A record that exists durably is never
//! reported as absent just because the cache is cold.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error};
use txnstore::{PipelineStatus, Store};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy)]
struct CachedStatus {
    status: PipelineStatus,
    error_count: usize,
}

/// Cache-plus-store pair tracking per-file processing status
pub struct StatusLedger {
    cache: DashMap<Uuid, CachedStatus>,
    store: Arc<Store>,
}

impl StatusLedger {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            cache: DashMap::new(),
            store,
        }
    }

    /// Record a status transition: cache first, then the durable upsert
    ///
    /// The durable write failing is logged and returned to the caller, but
    /// the cache write stands; the store is re-consulted on cache misses,
    /// so this is eventual consistency rather than corruption.
    pub fn upsert(&self, file_id: Uuid, status: PipelineStatus, errors: &[String]) -> Result<()> {
        debug!(%file_id, %status, error_count = errors.len(), "ledger upsert");
        self.cache.insert(
            file_id,
            CachedStatus {
                status,
                error_count: errors.len(),
            },
        );

        if let Err(e) = self.store.upsert_status(file_id, status, errors) {
            error!(%file_id, %status, error = %e, "Durable status write failed; cache is ahead of store");
            return Err(e.into());
        }
        Ok(())
    }

    /// Status and error count for a file, cache-first
    pub fn get(&self, file_id: Uuid) -> Result<Option<(PipelineStatus, usize)>> {
        if let Some(cached) = self.cache.get(&file_id) {
            return Ok(Some((cached.status, cached.error_count)));
        }

        match self.store.get_status(file_id)? {
            Some((status, error_count)) => {
                self.cache.insert(file_id, CachedStatus { status, error_count });
                Ok(Some((status, error_count)))
            }
            None => Ok(None),
        }
    }

    /// Paginated slice of the persisted error list (1-based page)
    ///
    /// Out-of-range pages return an empty slice, never an error.
    pub fn errors(&self, file_id: Uuid, page: usize, size: usize) -> Result<Vec<String>> {
        let all = self.store.validation_errors(file_id)?.unwrap_or_default();
        Ok(paginate(&all, page, size))
    }
}

fn paginate(list: &[String], page: usize, size: usize) -> Vec<String> {
    if page == 0 || size == 0 {
        return Vec::new();
    }
    let start = (page - 1).saturating_mul(size).min(list.len());
    let end = start.saturating_add(size).min(list.len());
    list[start..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> StatusLedger {
        StatusLedger::new(Arc::new(Store::open_in_memory().unwrap()))
    }

    fn errors(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Row {}: Invalid date format.", i + 2)).collect()
    }

    #[test]
    fn test_upsert_and_get() {
        let ledger = ledger();
        let file_id = Uuid::new_v4();

        ledger.upsert(file_id, PipelineStatus::Processing, &[]).unwrap();
        assert_eq!(
            ledger.get(file_id).unwrap(),
            Some((PipelineStatus::Processing, 0))
        );

        let errs = errors(3);
        ledger.upsert(file_id, PipelineStatus::Failed, &errs).unwrap();
        assert_eq!(ledger.get(file_id).unwrap(), Some((PipelineStatus::Failed, 3)));
    }

    #[test]
    fn test_cold_cache_falls_back_to_store() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let file_id = Uuid::new_v4();

        // Write through one ledger, read through a second with an empty cache
        StatusLedger::new(store.clone())
            .upsert(file_id, PipelineStatus::Completed, &[])
            .unwrap();

        let cold = StatusLedger::new(store);
        assert_eq!(cold.get(file_id).unwrap(), Some((PipelineStatus::Completed, 0)));
        // Repopulated: second read hits the cache
        assert!(cold.cache.contains_key(&file_id));
    }

    #[test]
    fn test_unknown_file_is_none() {
        assert_eq!(ledger().get(Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn test_pagination_slices() {
        let ledger = ledger();
        let file_id = Uuid::new_v4();
        ledger.upsert(file_id, PipelineStatus::Failed, &errors(15)).unwrap();

        let page1 = ledger.errors(file_id, 1, 10).unwrap();
        assert_eq!(page1.len(), 10);

        // Page 2 of 10 over 15 items: items 11-15
        let page2 = ledger.errors(file_id, 2, 10).unwrap();
        assert_eq!(page2.len(), 5);
        assert_eq!(page2[0], "Row 12: Invalid date format.");

        // Far out of range: empty, not an error
        assert!(ledger.errors(file_id, 100, 10).unwrap().is_empty());
    }

    #[test]
    fn test_pagination_for_unknown_file_is_empty() {
        assert!(ledger().errors(Uuid::new_v4(), 1, 10).unwrap().is_empty());
    }
}
