//! Durable keyed storage behind the record store
//!
//! The store only needs single-record get/put/delete plus a full listing.
//! Writes are last-write-wins per record; the store layers its own
//! per-record serialization on top.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::types::Record;
use crate::error::Result;

/// Keyed persistence contract consumed by [`RecordStore`](super::RecordStore)
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Load one record
    async fn get(&self, id: &str) -> Result<Option<Record>>;

    /// Insert or replace a record
    async fn put(&self, record: &Record) -> Result<()>;

    /// Remove a record, returning whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Every stored record, in backend-defined order
    async fn list_all(&self) -> Result<Vec<Record>>;
}

/// In-process backend, used by tests and `DATABASE_URL=memory`
#[derive(Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, Record>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordBackend for MemoryBackend {
    async fn get(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn put(&self, record: &Record) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn list_all(&self) -> Result<Vec<Record>> {
        Ok(self.records.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let backend = MemoryBackend::new();
        let record = Record::new(Some("a".to_string()), 1.0);

        backend.put(&record).await.unwrap();
        assert_eq!(backend.get(&record.id).await.unwrap(), Some(record.clone()));
        assert_eq!(backend.list_all().await.unwrap().len(), 1);

        assert!(backend.delete(&record.id).await.unwrap());
        assert!(!backend.delete(&record.id).await.unwrap());
        assert!(backend.get(&record.id).await.unwrap().is_none());
    }
}
