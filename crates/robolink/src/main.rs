//! RoboLink host terminal: entry point.
//!
//! Opens a serial link to the robot through a serial-over-TCP bridge and
//! gives the user a line terminal on stdin/stdout.
//!
//! # Usage
//!
//! ```text
//! robolink [OPTIONS]
//!
//! Options:
//!   --config <PATH>              Config file [default: platform config dir]
//!   --device <ID>                Connect to this device at startup
//!   --reconnect                  Connect to the last used device at startup
//!   --auto-reconnect             Enable auto-reconnect at startup
//!   --reconnect-delay-ms <MS>    Override the auto-reconnect delay
//! ```
//!
//! | Variable                   | Description                        |
//! |----------------------------|------------------------------------|
//! | `ROBOLINK_CONFIG`          | Config file path                   |
//! | `ROBOLINK_DEVICE`          | Device to connect to at startup    |
//! | `ROBOLINK_RECONNECT_DELAY` | Auto-reconnect delay (ms)          |
//! | `RUST_LOG`                 | Log filter (overrides `log_level`) |
//!
//! Logs go to stderr so that stdout carries only terminal output.  Terminal
//! input is read on its own thread, so Ctrl+C exits even while a read of
//! stdin is pending.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use robolink::application::device_store::{DeviceStore, MemoryDeviceStore};
use robolink::infrastructure::storage::config::{
    load_config, load_config_from, AppConfig, ConfigError,
};
use robolink::infrastructure::storage::device_store::{FileDeviceStore, DEVICE_STORE_FILE};
use robolink::infrastructure::terminal::{run_terminal, spawn_line_reader, ConfigFile, ConsoleSink};
use robolink::infrastructure::transport::tcp::TcpBridgeTransport;
use robolink::{forward_events, ConnectionManager, LinkSettings};
use robolink_core::DeviceId;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// RoboLink serial link terminal.
#[derive(Debug, Parser)]
#[command(
    name = "robolink",
    about = "Line terminal for a mobile robot's serial link",
    version
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, env = "ROBOLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Device address (or bridge host) to connect to at startup.
    #[arg(long, env = "ROBOLINK_DEVICE", conflicts_with = "reconnect")]
    device: Option<String>,

    /// Connect to the last used device at startup.
    #[arg(long)]
    reconnect: bool,

    /// Enable auto-reconnect at startup.
    #[arg(long)]
    auto_reconnect: bool,

    /// Fixed delay before an automatic reconnect, in milliseconds.
    #[arg(long, env = "ROBOLINK_RECONNECT_DELAY")]
    reconnect_delay_ms: Option<u64>,
}

impl Cli {
    /// Loads the config file and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if an
    /// override makes it invalid.
    fn resolve_config(&self) -> anyhow::Result<AppConfig> {
        let mut cfg = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => match load_config() {
                Ok(cfg) => cfg,
                Err(ConfigError::NoPlatformConfigDir) => AppConfig::default(),
                Err(e) => return Err(anyhow::Error::new(e).context("failed to load config")),
            },
        };
        self.apply_overrides(&mut cfg);
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }

    fn apply_overrides(&self, cfg: &mut AppConfig) {
        if self.auto_reconnect {
            cfg.link.auto_reconnect = true;
        }
        if let Some(ms) = self.reconnect_delay_ms {
            cfg.link.reconnect_delay_ms = ms;
        }
    }

    /// Device store next to the config file in use.
    fn device_store(&self) -> Arc<dyn DeviceStore> {
        let store = match &self.config {
            Some(path) => Ok(FileDeviceStore::new(
                path.parent()
                    .map(|dir| dir.join(DEVICE_STORE_FILE))
                    .unwrap_or_else(|| PathBuf::from(DEVICE_STORE_FILE)),
            )),
            None => FileDeviceStore::in_config_dir(),
        };
        match store {
            Ok(store) => {
                info!("last device stored in {}", store.path().display());
                Arc::new(store)
            }
            Err(e) => {
                warn!("{e}; the last device will not survive a restart");
                Arc::new(MemoryDeviceStore::new())
            }
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.resolve_config()?;

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.general.log_level)),
        )
        .init();

    info!(
        "RoboLink starting (auto-reconnect {}, delay {} ms)",
        cfg.link.auto_reconnect, cfg.link.reconnect_delay_ms
    );

    let transport = Arc::new(TcpBridgeTransport::new(
        cfg.transport.clone(),
        cfg.devices.clone(),
    ));
    let (manager, events) =
        ConnectionManager::new(transport, cli.device_store(), LinkSettings::from(&cfg.link));
    let printer = tokio::spawn(forward_events(events, ConsoleSink::stdout()));

    if let Some(raw) = &cli.device {
        let device = DeviceId::new(raw).with_context(|| format!("invalid --device {raw:?}"))?;
        manager.connect(device);
    } else if cli.reconnect {
        manager.reconnect();
    }

    let input = spawn_line_reader(std::io::BufReader::new(std::io::stdin()))
        .context("failed to start the terminal input thread")?;
    let mut config = ConfigFile::new(cfg, cli.config.clone());
    let mut stdout = std::io::stdout();
    tokio::select! {
        result = run_terminal(&manager, &mut config, input, &mut stdout) => {
            result.context("terminal I/O failed")?;
        }
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => tracing::error!("failed to listen for Ctrl+C signal: {e}"),
        },
    }

    manager.shutdown().await;
    // The event channel closes once the coordinator has stopped.
    let _ = printer.await;
    info!("RoboLink stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["robolink"]);

        assert!(cli.config.is_none());
        assert!(cli.device.is_none());
        assert!(!cli.reconnect);
        assert!(!cli.auto_reconnect);
        assert!(cli.reconnect_delay_ms.is_none());
    }

    #[test]
    fn test_cli_device_and_flags() {
        let cli = Cli::parse_from([
            "robolink",
            "--device",
            "98:D3:31:F5:12:7A",
            "--auto-reconnect",
            "--reconnect-delay-ms",
            "500",
        ]);

        assert_eq!(cli.device.as_deref(), Some("98:D3:31:F5:12:7A"));
        assert!(cli.auto_reconnect);
        assert_eq!(cli.reconnect_delay_ms, Some(500));
    }

    #[test]
    fn test_cli_device_conflicts_with_reconnect() {
        let result = Cli::try_parse_from(["robolink", "--device", "robot", "--reconnect"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_apply_to_link_settings() {
        // Arrange
        let cli = Cli::parse_from(["robolink", "--auto-reconnect", "--reconnect-delay-ms", "750"]);
        let mut cfg = AppConfig::default();

        // Act
        cli.apply_overrides(&mut cfg);
        let settings = LinkSettings::from(&cfg.link);

        // Assert
        assert!(settings.auto_reconnect);
        assert_eq!(settings.reconnect_delay, Duration::from_millis(750));
    }

    #[test]
    fn test_zero_delay_override_is_rejected() {
        let dir = std::env::temp_dir().join(format!("robolink_main_{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.toml");
        let path_arg = path.to_string_lossy().to_string();
        let cli = Cli::parse_from([
            "robolink",
            "--config",
            path_arg.as_str(),
            "--reconnect-delay-ms",
            "0",
        ]);

        assert!(cli.resolve_config().is_err());
    }
}
