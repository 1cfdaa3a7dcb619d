//! Connected device tracking and live fan-out
//!
//! - `DeviceRegistry`: who is connected, declared type, connection and sync times
//! - `BroadcastHub`: one outbound handle per device, unicast and broadcast delivery

mod hub;
mod registry;

pub use hub::{BroadcastHub, DeviceHandle};
pub use registry::{DeviceInfo, DeviceRegistry, UNKNOWN_DEVICE_TYPE};
