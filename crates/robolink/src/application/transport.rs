//! Transport seam: how the application opens a byte stream to the robot.
//!
//! The application layer only knows the [`Transport`] trait.  Concrete
//! transports (a TCP serial bridge, the scripted mock used in tests) live in
//! the infrastructure layer and are injected at construction time.

use std::fmt;
use std::io;

use async_trait::async_trait;
use robolink_core::DeviceId;
use tokio::io::{AsyncRead, AsyncWrite};

/// Read half of an open link.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write half of an open link.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One way of opening a channel to the device's serial-profile service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Authenticated channel to the well-known serial service.
    SecureService,
    /// Unauthenticated channel to the same service.
    InsecureService,
    /// Raw channel number, for devices without the standard service record.
    RawChannel(u8),
}

impl Strategy {
    /// The fixed negotiation order, top to bottom.
    pub fn ordered(fallback_channel: u8) -> [Strategy; 3] {
        [
            Strategy::SecureService,
            Strategy::InsecureService,
            Strategy::RawChannel(fallback_channel),
        ]
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SecureService => f.write_str("secure service"),
            Self::InsecureService => f.write_str("insecure service"),
            Self::RawChannel(ch) => write!(f, "raw channel {ch}"),
        }
    }
}

/// An open bidirectional byte stream to the device.
pub struct Link {
    /// Human-readable peer name (device name when known, else its address).
    pub peer: String,
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl Link {
    /// Wraps an already split stream.
    pub fn new(peer: impl Into<String>, reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            peer: peer.into(),
            reader,
            writer,
        }
    }

    /// Splits a bidirectional stream into a link.
    pub fn from_stream<S>(peer: impl Into<String>, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(peer, Box::new(reader), Box::new(writer))
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").field("peer", &self.peer).finish_non_exhaustive()
    }
}

/// Opens links to a device with a given strategy.
///
/// `open` may block for as long as the underlying transport takes; callers
/// cancel it by dropping the future (aborting the task that polls it).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempts a single connection using `strategy`.
    async fn open(&self, device: &DeviceId, strategy: Strategy) -> io::Result<Link>;
}
