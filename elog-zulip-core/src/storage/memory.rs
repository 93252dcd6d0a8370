//! In-memory store, used for dry runs and tests.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{PublishedStore, StorageError};
use crate::entry::PublishedRecord;

/// A store that keeps records in memory and logs every insert.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PublishedRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with `records`.
    pub fn with_records(records: impl IntoIterator<Item = PublishedRecord>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().collect()),
        }
    }

    /// Snapshot of the stored records, in insertion order.
    pub fn records(&self) -> Vec<PublishedRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PublishedRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl PublishedStore for MemoryStore {
    async fn insert(&self, record: &PublishedRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string(record)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?;
        tracing::info!("Inserting {}", json);

        let mut records = self.lock();
        if !records.iter().any(|r| r.entry_id == record.entry_id) {
            records.push(record.clone());
        }
        Ok(())
    }

    async fn find_ordered(&self) -> Result<Vec<PublishedRecord>, StorageError> {
        let mut records = self.records();
        records.sort_by_key(|r| r.entry_id);
        Ok(records)
    }
}
