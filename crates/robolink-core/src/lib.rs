//! # robolink-core
//!
//! Shared library for RoboLink containing the line framer, the outgoing line
//! normaliser, device identifiers, the connection state type, and the robot
//! message vocabulary.
//!
//! This crate has zero dependencies on sockets, async runtimes, or UI
//! frameworks.  Everything here is deterministic and can be tested with plain
//! `#[test]` functions.
//!
//! # Architecture overview
//!
//! RoboLink keeps a point-to-point serial link open to a mobile robot over an
//! unreliable radio transport and exchanges a line-oriented text protocol with
//! it.  This crate is the shared foundation:
//!
//! - **`protocol`** – How bytes become lines and lines become bytes.  The
//!   [`LineFramer`] turns arbitrary-sized reads into trimmed text lines;
//!   [`normalize_line`] gives every outgoing line a CRLF terminator; the
//!   `messages` module knows the robot's command and status vocabulary.
//!
//! - **`domain`** – Plain value types: the [`ConnectionState`] enumeration and
//!   the validated [`DeviceId`] address.

pub mod domain;
pub mod protocol;

pub use domain::device::{DeviceId, DeviceIdError};
pub use domain::state::ConnectionState;
pub use protocol::framer::{LineFramer, RawFrame};
pub use protocol::line::{normalize_line, LINE_TERMINATOR};
pub use protocol::messages::{parse_device_line, DeviceMessage, Heading, ProtocolError, RobotCommand};
