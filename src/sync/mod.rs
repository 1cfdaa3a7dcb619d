//! Sync module for multi-device synchronization
//!
//! Provides:
//! - The WebSocket message protocol
//! - Domain events produced by record mutations
//! - Offline queue replay
//! - The per-connection session state machine
//!
//! # Sync Protocol
//!
//! 1. Device connects to `/ws/{device_id}`; everyone receives `device_status`
//! 2. Device optionally sends `register_device` with its type
//! 3. Device sends `sync_request` and receives the full record set
//! 4. Device sends `sync_offline_queue` with work buffered while offline;
//!    each applied operation is broadcast to the other devices
//! 5. Device sends `compute_request`; the result goes to the other devices
//!
//! # Conflict Policy
//!
//! - REST updates use optimistic concurrency and return `version_conflict`
//! - Offline replay and compute never check versions: last writer wins

mod events;
mod protocol;
mod replay;
mod session;

pub use events::RecordChange;
pub use protocol::{
    ClientMessage, CreatedData, OfflineOperation, OperationType, QueuedOperation, ServerEvent,
    UpdatedData,
};
pub use replay::{ApplyResult, OfflineReplay, ReplayReport};
pub use session::{SessionState, SyncSession};
