//! Route modules for the SyncApp server

pub mod health;
pub mod records;
pub mod ws;
