//! Error taxonomy for the serial link.
//!
//! None of these errors propagate to API callers.  Every failure is caught at
//! the boundary of the negotiation or session task and reported through the
//! event channel as [`LinkEvent::Error`](crate::application::events::LinkEvent::Error).

use std::io;

use robolink_core::{DeviceId, DeviceIdError};
use thiserror::Error;

use crate::application::device_store::StoreError;

/// Coarse classification of a [`LinkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// All transport strategies were exhausted.
    NegotiationFailure,
    /// The receive loop failed while connected.
    ReadFailure,
    /// A send failed.  Does not change the connection state.
    WriteFailure,
    /// The request could not be served (e.g. no persisted device).
    InvalidRequest,
    /// The persisted device store could not be read or written.
    Storage,
}

/// Errors reported by the link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("connection to {device} failed: {source}")]
    Negotiation {
        device: DeviceId,
        #[source]
        source: io::Error,
    },

    #[error("connection lost: {0}")]
    Read(#[source] io::Error),

    #[error("send failed: {0}")]
    Write(#[source] io::Error),

    #[error("no last device saved")]
    NoLastDevice,

    #[error("{0}")]
    InvalidDevice(#[from] DeviceIdError),

    #[error("device store error: {0}")]
    Store(#[from] StoreError),

    #[error("not connected")]
    NotConnected,
}

impl LinkError {
    /// Maps the error onto the link's failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Negotiation { .. } => ErrorKind::NegotiationFailure,
            Self::Read(_) => ErrorKind::ReadFailure,
            Self::Write(_) => ErrorKind::WriteFailure,
            Self::NoLastDevice | Self::InvalidDevice(_) | Self::NotConnected => {
                ErrorKind::InvalidRequest
            }
            Self::Store(_) => ErrorKind::Storage,
        }
    }
}
