//! Versioned record store
//!
//! Optimistic concurrency over a [`RecordBackend`]. Every mutation of a given
//! record runs its read-modify-write under that record's lock, so version
//! increments are never skipped or duplicated. Different records never
//! contend.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::backend::RecordBackend;
use super::types::{NewRecord, Record, RecordPatch};
use crate::error::{AppError, Result};

/// Shared handle to the record store
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn RecordBackend>,
    locks: Arc<RecordLocks>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn RecordBackend>) -> Self {
        Self {
            backend,
            locks: Arc::new(RecordLocks::default()),
        }
    }

    /// Every record, unordered
    pub async fn list_all(&self) -> Result<Vec<Record>> {
        self.backend.list_all().await
    }

    /// Snapshot of one record
    pub async fn get(&self, id: &str) -> Result<Option<Record>> {
        self.backend.get(id).await
    }

    /// Allocate and persist a new record at version 1
    pub async fn create(&self, new: NewRecord) -> Result<Record> {
        let record = Record::new(new.title, new.value.unwrap_or(0.0));
        self.backend.put(&record).await?;

        tracing::debug!(record_id = %record.id, "Created record");
        Ok(record)
    }

    /// Apply `patch` only if the caller saw the current version.
    ///
    /// `expected_version` of `None` or `0` skips the check.
    pub async fn conditional_update(
        &self,
        id: &str,
        patch: &RecordPatch,
        expected_version: Option<i64>,
    ) -> Result<Record> {
        self.mutate(id, expected_version, |record| record.apply_patch(patch))
            .await
    }

    /// Apply `patch` regardless of version; offline replay always wins
    pub async fn unconditional_update(&self, id: &str, patch: &RecordPatch) -> Result<Record> {
        self.mutate(id, None, |record| record.apply_patch(patch)).await
    }

    /// Recompute the derived result from the current value
    pub async fn compute(&self, id: &str) -> Result<Record> {
        self.mutate(id, None, Record::compute).await
    }

    /// Remove a record
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.locks.acquire(id).await;

        if self.backend.delete(id).await? {
            tracing::debug!(record_id = %id, "Deleted record");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Record not found: {}", id)))
        }
    }

    async fn mutate<F>(&self, id: &str, expected_version: Option<i64>, change: F) -> Result<Record>
    where
        F: FnOnce(&mut Record),
    {
        let _guard = self.locks.acquire(id).await;

        let mut record = self
            .backend
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Record not found: {}", id)))?;

        if let Some(expected) = expected_version.filter(|v| *v != 0) {
            if expected != record.version {
                tracing::debug!(
                    record_id = %id,
                    expected,
                    current = record.version,
                    "Rejected stale update"
                );
                return Err(AppError::VersionConflict {
                    current_version: record.version,
                });
            }
        }

        change(&mut record);
        record.bump_version();
        self.backend.put(&record).await?;

        Ok(record)
    }
}

/// Lock table keyed by record id.
///
/// Entries are dropped once nobody holds or waits on them.
#[derive(Default)]
struct RecordLocks {
    table: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RecordLocks {
    async fn acquire(self: &Arc<Self>, id: &str) -> RecordGuard {
        let lock = self
            .table
            .lock()
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        RecordGuard {
            guard: Some(lock.lock_owned().await),
            id: id.to_string(),
            locks: Arc::clone(self),
        }
    }
}

struct RecordGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: String,
    locks: Arc<RecordLocks>,
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        self.guard.take();

        let mut table = self.locks.table.lock();
        if table
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MemoryBackend;

    fn store() -> RecordStore {
        RecordStore::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn test_conditional_update_scenario() {
        let store = store();

        let created = store.create(NewRecord::new("t", 16.0)).await.unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.created_at, created.updated_at);

        let updated = store
            .conditional_update(&created.id, &RecordPatch::value(20.0), Some(1))
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.value, 20.0);

        let stale = store
            .conditional_update(&created.id, &RecordPatch::value(30.0), Some(1))
            .await;
        assert!(matches!(
            stale,
            Err(AppError::VersionConflict { current_version: 2 })
        ));

        // A failed update leaves the record untouched
        let current = store.get(&created.id).await.unwrap().unwrap();
        assert_eq!(current, updated);
    }

    #[tokio::test]
    async fn test_zero_version_skips_check() {
        let store = store();
        let created = store.create(NewRecord::new("t", 1.0)).await.unwrap();
        store
            .unconditional_update(&created.id, &RecordPatch::value(2.0))
            .await
            .unwrap();

        let updated = store
            .conditional_update(&created.id, &RecordPatch::value(3.0), Some(0))
            .await
            .unwrap();
        assert_eq!(updated.version, 3);
    }

    #[tokio::test]
    async fn test_create_defaults_missing_value() {
        let store = store();
        let record = store.create(NewRecord::default()).await.unwrap();
        assert_eq!(record.value, 0.0);
        assert!(record.title.is_none());
    }

    #[tokio::test]
    async fn test_compute() {
        let store = store();
        let record = store.create(NewRecord::new("neg", -25.0)).await.unwrap();

        let computed = store.compute(&record.id).await.unwrap();
        assert_eq!(computed.computed_result, Some(500.0));
        assert_eq!(computed.version, 2);
        assert_eq!(computed.value, -25.0);
    }

    #[tokio::test]
    async fn test_missing_record() {
        let store = store();
        let patch = RecordPatch::value(1.0);

        assert!(matches!(
            store.unconditional_update("nope", &patch).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            store.conditional_update("nope", &patch, Some(3)).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(store.compute("nope").await, Err(AppError::NotFound(_))));
        assert!(matches!(store.delete("nope").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_versions_strictly_increase() {
        let store = store();
        let mut last = store.create(NewRecord::new("v", 0.0)).await.unwrap();

        for i in 0..10 {
            let next = if i % 2 == 0 {
                store
                    .unconditional_update(&last.id, &RecordPatch::value(i as f64))
                    .await
                    .unwrap()
            } else {
                store.compute(&last.id).await.unwrap()
            };
            assert_eq!(next.version, last.version + 1);
            assert!(next.updated_at >= last.updated_at);
            last = next;
        }
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialized() {
        let store = store();
        let record = store.create(NewRecord::new("c", 0.0)).await.unwrap();

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                let id = record.id.clone();
                tokio::spawn(async move {
                    store
                        .unconditional_update(&id, &RecordPatch::value(i as f64))
                        .await
                        .unwrap()
                        .version
                })
            })
            .collect();

        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap());
        }
        versions.sort_unstable();

        assert_eq!(versions, (2..=33).collect::<Vec<i64>>());
        assert_eq!(store.get(&record.id).await.unwrap().unwrap().version, 33);
        assert!(store.locks.table.lock().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let store = store();
        let record = store.create(NewRecord::new("d", 1.0)).await.unwrap();

        store.delete(&record.id).await.unwrap();
        assert!(store.get(&record.id).await.unwrap().is_none());
        assert!(store.list_all().await.unwrap().is_empty());
    }
}
