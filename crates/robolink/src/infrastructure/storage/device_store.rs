//! File-backed [`DeviceStore`].
//!
//! The last used device is kept in a small TOML file under a single key:
//!
//! ```toml
//! last_device_addr = "98:D3:31:F5:12:7A"
//! ```
//!
//! Writes go to a temporary file first and are then renamed over the real one,
//! so a crash mid-write never leaves a truncated file behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use robolink_core::DeviceId;
use tracing::debug;

use crate::application::device_store::{DeviceStore, StoreError, KEY_LAST_DEVICE};
use crate::infrastructure::storage::config::config_dir;

/// File name used next to `config.toml`.
pub const DEVICE_STORE_FILE: &str = "last_device.toml";

/// Persists the last device in a TOML file.
#[derive(Debug, Clone)]
pub struct FileDeviceStore {
    path: PathBuf,
}

impl FileDeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store located in the platform config directory.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if no config directory can be determined.
    pub fn in_config_dir() -> Result<Self, StoreError> {
        let dir = config_dir().map_err(|_| StoreError::Unavailable)?;
        Ok(Self::new(dir.join(DEVICE_STORE_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| StoreError::Corrupt(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

impl DeviceStore for FileDeviceStore {
    fn load_last_device(&self) -> Result<Option<DeviceId>, StoreError> {
        let entries = self.read_entries()?;
        match entries.get(KEY_LAST_DEVICE) {
            Some(addr) => DeviceId::new(addr)
                .map(Some)
                .map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    fn save_last_device(&self, device: &DeviceId) -> Result<(), StoreError> {
        let mut entries = self.read_entries().unwrap_or_default();
        entries.insert(KEY_LAST_DEVICE.to_string(), device.to_string());
        let content =
            toml::to_string(&entries).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("saved last device {device} to {}", self.path.display());
        Ok(())
    }
}
