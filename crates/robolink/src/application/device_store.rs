//! Persisted "last used device" contract.
//!
//! The store holds a single string value, the address of the last device a
//! negotiation succeeded against.  It is written only on the success path of
//! negotiation and read only by the reconnect path.

use std::sync::Mutex;

use robolink_core::DeviceId;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Well-known key under which the device address is stored.
pub const KEY_LAST_DEVICE: &str = "last_device_addr";

/// Error type for device store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt store: {0}")]
    Corrupt(String),
    #[error("no storage location available")]
    Unavailable,
}

/// Key-value storage for the last successfully connected device.
#[cfg_attr(test, automock)]
pub trait DeviceStore: Send + Sync {
    /// Returns the stored device, if any.
    fn load_last_device(&self) -> Result<Option<DeviceId>, StoreError>;

    /// Overwrites the stored device.
    fn save_last_device(&self, device: &DeviceId) -> Result<(), StoreError>;
}

/// In-memory store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    last: Mutex<Option<DeviceId>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already remembers `device`.
    pub fn with_device(device: DeviceId) -> Self {
        Self {
            last: Mutex::new(Some(device)),
        }
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn load_last_device(&self) -> Result<Option<DeviceId>, StoreError> {
        let guard = self
            .last
            .lock()
            .map_err(|_| StoreError::Corrupt("store lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save_last_device(&self, device: &DeviceId) -> Result<(), StoreError> {
        let mut guard = self
            .last
            .lock()
            .map_err(|_| StoreError::Corrupt("store lock poisoned".into()))?;
        *guard = Some(device.clone());
        Ok(())
    }
}
