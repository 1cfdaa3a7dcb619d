//! Offline queue replay
//!
//! Applies a batch of operations a device buffered while disconnected.
//! Operations run strictly in submission order and each applied one is
//! broadcast to the other devices before the next starts. The batch is not
//! atomic: a skipped or failed item never halts or rolls back the rest.
//!
//! Replay bypasses version checks, so buffered work always wins against
//! whatever happened on the server in the meantime.

use super::events::RecordChange;
use super::protocol::{OfflineOperation, OperationType, QueuedOperation};
use crate::devices::BroadcastHub;
use crate::error::AppError;
use crate::records::{RecordPatch, RecordStore};

/// Outcome of one offline operation
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyResult {
    /// The store changed and the change was broadcast
    Applied(RecordChange),
    /// Target record no longer exists; nothing to do
    Skipped { reason: String },
    /// Malformed operation or store failure
    Failed { reason: String },
}

/// Per-item results of one batch, in submission order
#[derive(Debug, Default)]
pub struct ReplayReport {
    pub results: Vec<ApplyResult>,
    /// Successful deliveries across all broadcasts of the batch
    pub deliveries: usize,
}

impl ReplayReport {
    pub fn applied(&self) -> usize {
        self.count(|r| matches!(r, ApplyResult::Applied(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, ApplyResult::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, ApplyResult::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ApplyResult) -> bool) -> usize {
        self.results.iter().filter(|r| pred(r)).count()
    }
}

/// Replays one device's offline batch against the store
pub struct OfflineReplay<'a> {
    store: &'a RecordStore,
    hub: &'a BroadcastHub,
    device_id: &'a str,
}

impl<'a> OfflineReplay<'a> {
    pub fn new(store: &'a RecordStore, hub: &'a BroadcastHub, device_id: &'a str) -> Self {
        Self {
            store,
            hub,
            device_id,
        }
    }

    pub async fn run<I>(&self, operations: I) -> ReplayReport
    where
        I: IntoIterator,
        I::Item: Into<QueuedOperation>,
    {
        let mut report = ReplayReport::default();

        for queued in operations {
            let result = match queued.into().decode() {
                Ok(operation) => self.apply(operation).await,
                Err(reason) => ApplyResult::Failed { reason },
            };

            match &result {
                ApplyResult::Applied(change) => {
                    match self.hub.broadcast(&change.to_event(), Some(self.device_id)).await {
                        Ok(delivered) => report.deliveries += delivered,
                        Err(e) => tracing::warn!(
                            device_id = %self.device_id,
                            record_id = %change.record_id(),
                            "Failed to broadcast replayed change: {}",
                            e
                        ),
                    }
                }
                ApplyResult::Skipped { reason } => {
                    tracing::debug!(device_id = %self.device_id, "Skipped offline operation: {}", reason);
                }
                ApplyResult::Failed { reason } => {
                    tracing::warn!(device_id = %self.device_id, "Offline operation failed: {}", reason);
                }
            }

            report.results.push(result);
        }

        report
    }

    async fn apply(&self, operation: OfflineOperation) -> ApplyResult {
        let data = operation.data.unwrap_or_default();

        match operation.operation_type {
            OperationType::Create => match self.store.create(data.into()).await {
                Ok(record) => ApplyResult::Applied(RecordChange::Created(record)),
                Err(e) => failed(e),
            },
            OperationType::Update => {
                let Some(record_id) = operation.record_id else {
                    return missing_id("update");
                };
                self.update(&record_id, &data).await
            }
            OperationType::Delete => {
                let Some(record_id) = operation.record_id else {
                    return missing_id("delete");
                };
                match self.store.delete(&record_id).await {
                    Ok(()) => ApplyResult::Applied(RecordChange::Deleted { record_id }),
                    Err(AppError::NotFound(reason)) => ApplyResult::Skipped { reason },
                    Err(e) => failed(e),
                }
            }
            OperationType::Unknown => ApplyResult::Failed {
                reason: "unknown operation type".to_string(),
            },
        }
    }

    async fn update(&self, record_id: &str, data: &RecordPatch) -> ApplyResult {
        match self.store.unconditional_update(record_id, data).await {
            Ok(record) => ApplyResult::Applied(RecordChange::Updated(record)),
            Err(AppError::NotFound(reason)) => ApplyResult::Skipped { reason },
            Err(e) => failed(e),
        }
    }
}

fn missing_id(operation: &str) -> ApplyResult {
    ApplyResult::Failed {
        reason: format!("{} operation without record_id", operation),
    }
}

fn failed(err: AppError) -> ApplyResult {
    ApplyResult::Failed {
        reason: err.to_string(),
    }
}
