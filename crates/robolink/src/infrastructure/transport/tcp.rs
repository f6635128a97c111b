//! Serial-over-TCP bridge transport.
//!
//! The robot's serial port is exposed by a bridge that listens on one TCP
//! port per negotiation strategy.  A device identifier resolves to a bridge
//! host through the `[[devices]]` aliases in the config; an identifier with no
//! alias is used as the host name directly.
//!
//! | Strategy           | Port                          |
//! |--------------------|-------------------------------|
//! | secure service     | `secure_port`                 |
//! | insecure service   | `insecure_port`               |
//! | raw channel `n`    | `fallback_port_base + n`      |
//!
//! No timeout is added on top of what the OS applies to `connect`.

use std::io;

use async_trait::async_trait;
use robolink_core::DeviceId;
use tokio::net::TcpStream;
use tracing::debug;

use crate::application::transport::{Link, Strategy, Transport};
use crate::infrastructure::storage::config::{DeviceEntry, TransportConfig};

/// Where a device is reached and what it is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    pub host: String,
    pub display_name: String,
}

/// [`Transport`] that opens TCP connections to a serial bridge.
#[derive(Debug, Clone)]
pub struct TcpBridgeTransport {
    config: TransportConfig,
    devices: Vec<DeviceEntry>,
}

impl TcpBridgeTransport {
    pub fn new(config: TransportConfig, devices: Vec<DeviceEntry>) -> Self {
        Self { config, devices }
    }

    /// Looks `device` up in the aliases, falling back to the identifier itself.
    pub fn resolve(&self, device: &DeviceId) -> ResolvedDevice {
        let alias = self
            .devices
            .iter()
            .find(|entry| entry.address.eq_ignore_ascii_case(device.as_str()));

        match alias {
            Some(entry) => ResolvedDevice {
                host: entry.host.clone(),
                display_name: entry
                    .name
                    .clone()
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| device.to_string()),
            },
            None => ResolvedDevice {
                host: device.to_string(),
                display_name: device.to_string(),
            },
        }
    }

    /// TCP port serving `strategy`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if a raw channel would overflow the port range.
    pub fn port_for(&self, strategy: Strategy) -> io::Result<u16> {
        match strategy {
            Strategy::SecureService => Ok(self.config.secure_port),
            Strategy::InsecureService => Ok(self.config.insecure_port),
            Strategy::RawChannel(channel) => self
                .config
                .fallback_port_base
                .checked_add(u16::from(channel))
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("raw channel {channel} is outside the port range"),
                    )
                }),
        }
    }
}

#[async_trait]
impl Transport for TcpBridgeTransport {
    async fn open(&self, device: &DeviceId, strategy: Strategy) -> io::Result<Link> {
        let resolved = self.resolve(device);
        let port = self.port_for(strategy)?;
        debug!("opening {strategy} to {}:{port}", resolved.host);

        let stream = TcpStream::connect((resolved.host.as_str(), port)).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        Ok(Link::new(
            resolved.display_name,
            Box::new(read_half),
            Box::new(write_half),
        ))
    }
}
