//! TOML-based configuration for the RoboLink host.
//!
//! Reads and writes [`AppConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\RoboLink\config.toml`
//! - Linux:    `~/.config/robolink/config.toml`
//! - macOS:    `~/Library/Application Support/RoboLink/config.toml`
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [link]
//! auto_reconnect = false
//! reconnect_delay_ms = 3000
//!
//! [transport]
//! secure_port = 5001
//!
//! [[devices]]
//! address = "98:D3:31:F5:12:7A"
//! host = "192.168.4.1"
//! name = "MDP Robot"
//! ```
//!
//! Every field has a serde default, so the application works on first run
//! (no file) and with files written by older versions that lack newer fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::connection_manager::LinkSettings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Connection manager behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    /// Initial auto-reconnect flag.
    #[serde(default)]
    pub auto_reconnect: bool,
    /// Fixed delay before an automatic reconnect, in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Bytes per receive-loop read.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Channel used by the last negotiation strategy.
    #[serde(default = "default_fallback_channel")]
    pub fallback_channel: u8,
    /// Bound of the event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Endpoints of the serial-over-TCP bridge, one per negotiation strategy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    #[serde(default = "default_secure_port")]
    pub secure_port: u16,
    #[serde(default = "default_insecure_port")]
    pub insecure_port: u16,
    /// Raw channel `n` is reached on `fallback_port_base + n`.
    #[serde(default = "default_fallback_port_base")]
    pub fallback_port_base: u16,
}

/// A known device: maps a hardware address to a bridge host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    pub address: String,
    pub host: String,
    /// Display name; the address is shown when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    3000
}
fn default_read_buffer_size() -> usize {
    1024
}
fn default_fallback_channel() -> u8 {
    1
}
fn default_event_capacity() -> usize {
    128
}
fn default_secure_port() -> u16 {
    5001
}
fn default_insecure_port() -> u16 {
    5000
}
fn default_fallback_port_base() -> u16 {
    6000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: false,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            read_buffer_size: default_read_buffer_size(),
            fallback_channel: default_fallback_channel(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            secure_port: default_secure_port(),
            insecure_port: default_insecure_port(),
            fallback_port_base: default_fallback_port_base(),
        }
    }
}

impl AppConfig {
    /// Rejects values the connection manager cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.link.read_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "link.read_buffer_size must be greater than 0".into(),
            ));
        }
        if self.link.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "link.event_capacity must be greater than 0".into(),
            ));
        }
        if self.link.reconnect_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "link.reconnect_delay_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

impl From<&LinkConfig> for LinkSettings {
    fn from(cfg: &LinkConfig) -> Self {
        Self {
            auto_reconnect: cfg.auto_reconnect,
            reconnect_delay: Duration::from_millis(cfg.reconnect_delay_ms),
            read_buffer_size: cfg.read_buffer_size,
            fallback_channel: cfg.fallback_channel,
            event_capacity: cfg.event_capacity,
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for RoboLink files.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads and validates the config from the platform location.
///
/// Returns `AppConfig::default()` if the file does not exist yet.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads and validates the config at `path`, returning defaults when the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Parse`] if the TOML is malformed and
/// [`ConfigError::Invalid`] if a value is out of range.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let cfg = match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str::<AppConfig>(&content)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(e) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Persists `config` to the platform location.
///
/// # Errors
///
/// See [`save_config_to`].
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("RoboLink"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("robolink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("RoboLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
