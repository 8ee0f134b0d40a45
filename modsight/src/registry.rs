//! Shared device registry.
//!
//! The registry is the single mutation surface for device management. The
//! poller never iterates it directly; it takes a snapshot at the start of
//! each pass, so edits between passes never touch an in-flight pass.

use parking_lot::RwLock;
use thiserror::Error;

use crate::config::DeviceConfig;

/// Registry errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("device index {index} out of range (registry holds {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Thread-safe, snapshot-readable list of devices to poll.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<Vec<DeviceConfig>>,
}

impl DeviceRegistry {
    /// Create a registry seeded with the configured devices.
    pub fn new(devices: Vec<DeviceConfig>) -> Self {
        Self {
            devices: RwLock::new(devices),
        }
    }

    /// Append a device.
    pub fn add(&self, device: DeviceConfig) {
        self.devices.write().push(device);
    }

    /// Replace the device at `index`.
    pub fn update(&self, index: usize, device: DeviceConfig) -> Result<(), RegistryError> {
        let mut devices = self.devices.write();
        let len = devices.len();
        match devices.get_mut(index) {
            Some(slot) => {
                *slot = device;
                Ok(())
            }
            None => Err(RegistryError::IndexOutOfRange { index, len }),
        }
    }

    /// Remove and return the device at `index`.
    pub fn remove(&self, index: usize) -> Result<DeviceConfig, RegistryError> {
        let mut devices = self.devices.write();
        if index >= devices.len() {
            return Err(RegistryError::IndexOutOfRange {
                index,
                len: devices.len(),
            });
        }
        Ok(devices.remove(index))
    }

    /// Copy of the current device list, in registration order.
    pub fn snapshot(&self) -> Vec<DeviceConfig> {
        self.devices.read().clone()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str) -> DeviceConfig {
        DeviceConfig {
            name: name.to_string(),
            host: "192.168.1.10".to_string(),
            port: 502,
            unit_id: 1,
        }
    }

    #[test]
    fn test_add_and_snapshot_order() {
        let registry = DeviceRegistry::default();
        registry.add(device("a"));
        registry.add(device("b"));

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "a");
        assert_eq!(snapshot[1].name, "b");
    }

    #[test]
    fn test_update() {
        let registry = DeviceRegistry::new(vec![device("a")]);
        registry.update(0, device("a2")).unwrap();
        assert_eq!(registry.snapshot()[0].name, "a2");

        let err = registry.update(5, device("x")).unwrap_err();
        assert_eq!(err, RegistryError::IndexOutOfRange { index: 5, len: 1 });
    }

    #[test]
    fn test_remove() {
        let registry = DeviceRegistry::new(vec![device("a"), device("b")]);
        let removed = registry.remove(0).unwrap();
        assert_eq!(removed.name, "a");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].name, "b");

        assert!(registry.remove(1).is_err());
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry = DeviceRegistry::new(vec![device("a")]);
        let snapshot = registry.snapshot();
        registry.add(device("b"));

        // The earlier snapshot is unaffected by later edits.
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }
}
