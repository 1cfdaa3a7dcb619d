//! Connected device bookkeeping
//!
//! Plain map keyed by device id. It holds no lock of its own; the
//! [`BroadcastHub`](super::BroadcastHub) owns it behind the hub's lock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const UNKNOWN_DEVICE_TYPE: &str = "unknown";

/// What the server knows about one live connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub device_type: String,
    pub connected_at: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Registry of currently connected devices
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, DeviceInfo>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device with an unknown type, replacing any stale entry
    pub fn add(&mut self, device_id: &str) {
        self.devices.insert(
            device_id.to_string(),
            DeviceInfo {
                device_type: UNKNOWN_DEVICE_TYPE.to_string(),
                connected_at: Utc::now(),
                last_sync: None,
            },
        );
    }

    pub fn remove(&mut self, device_id: &str) -> Option<DeviceInfo> {
        self.devices.remove(device_id)
    }

    /// Record the type a device declared; ignored for unknown ids
    pub fn set_type(&mut self, device_id: &str, device_type: &str) -> bool {
        match self.devices.get_mut(device_id) {
            Some(info) => {
                info.device_type = device_type.to_string();
                true
            }
            None => false,
        }
    }

    /// Mark a successful sync exchange
    pub fn touch(&mut self, device_id: &str) -> bool {
        match self.devices.get_mut(device_id) {
            Some(info) => {
                info.last_sync = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// Ids of every connected device, sorted
    pub fn list_ids(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceInfo> {
        self.devices.get(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_defaults_to_unknown() {
        let mut registry = DeviceRegistry::new();
        registry.add("phone");

        let info = registry.get("phone").unwrap();
        assert_eq!(info.device_type, UNKNOWN_DEVICE_TYPE);
        assert!(info.last_sync.is_none());
    }

    #[test]
    fn test_set_type_and_touch() {
        let mut registry = DeviceRegistry::new();
        registry.add("desk");

        assert!(registry.set_type("desk", "desktop"));
        assert!(registry.touch("desk"));
        assert!(!registry.set_type("ghost", "mobile"));
        assert!(!registry.touch("ghost"));

        let info = registry.get("desk").unwrap();
        assert_eq!(info.device_type, "desktop");
        assert!(info.last_sync.is_some());
    }

    #[test]
    fn test_list_and_remove() {
        let mut registry = DeviceRegistry::new();
        registry.add("b");
        registry.add("a");
        assert_eq!(registry.list_ids(), vec!["a".to_string(), "b".to_string()]);

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(!registry.contains("a"));
        assert!(registry.contains("b"));
        assert_eq!(registry.list_ids(), vec!["b".to_string()]);
        assert_eq!(registry.len(), 1);

        registry.remove("b");
        assert!(registry.is_empty());
    }
}
