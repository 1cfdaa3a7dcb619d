//! Record store module
//!
//! Provides:
//! - The versioned `Record` model
//! - A keyed persistence contract (`RecordBackend`) with an in-memory implementation
//! - `RecordStore`, the sole writer of records, with optimistic concurrency
//!
//! # Versioning
//!
//! Records start at version 1 and every successful update or compute bumps
//! the version by exactly one. `conditional_update` rejects a stale expected
//! version with `VersionConflict`, echoing the current version so the caller
//! can retry. Offline replay and compute use the unconditional path.

mod backend;
mod store;
mod types;

pub use backend::{MemoryBackend, RecordBackend};
pub use store::RecordStore;
pub use types::{NewRecord, Record, RecordPatch};
