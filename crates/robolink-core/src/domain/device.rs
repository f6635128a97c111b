//! Device identifiers.
//!
//! A [`DeviceId`] is an opaque transport-level address such as the
//! hardware address `98:D3:31:F5:12:7A` or a bridge host name.  It is
//! sufficient to attempt a connection but says nothing about whether the
//! device is reachable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a string is rejected as a device identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceIdError {
    #[error("device address is empty")]
    Empty,
    #[error("invalid device address: {0}")]
    Invalid(String),
}

/// Validated, trimmed device address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Parses and validates a device address.
    ///
    /// Leading and trailing whitespace is removed.  Hardware addresses are
    /// upper-cased so that `98:d3:..` and `98:D3:..` compare equal.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceIdError::Empty`] for blank input and
    /// [`DeviceIdError::Invalid`] when the address contains whitespace or
    /// control characters.
    pub fn new(raw: &str) -> Result<Self, DeviceIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DeviceIdError::Empty);
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(DeviceIdError::Invalid(trimmed.to_string()));
        }
        if is_hardware_address(trimmed) {
            return Ok(Self(trimmed.to_ascii_uppercase()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for a six-octet `XX:XX:XX:XX:XX:XX` hardware address.
    pub fn is_hardware_address(&self) -> bool {
        is_hardware_address(&self.0)
    }
}

fn is_hardware_address(s: &str) -> bool {
    let octets: Vec<&str> = s.split(':').collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = DeviceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DeviceIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
