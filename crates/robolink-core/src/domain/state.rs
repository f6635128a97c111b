//! Connection state of the serial link.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three states of the link connection manager.
///
/// Exactly one value is active at any instant.  `Connected` implies that a
/// live transport is owned by exactly one session worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    /// No negotiation in flight and no live session.
    #[default]
    Idle,
    /// A transport negotiation is running.
    Connecting,
    /// A session worker owns a live transport.
    Connected,
}

impl ConnectionState {
    /// Returns `true` when a live session exists.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Short label used in terminal output and log lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Not connected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
