//! Protocol module: line framing, outgoing line normalisation, and the robot
//! message vocabulary.

pub mod framer;
pub mod line;
pub mod messages;

pub use framer::{LineFramer, RawFrame};
pub use line::{normalize_line, LINE_TERMINATOR};
pub use messages::{parse_device_line, DeviceMessage, Heading, ProtocolError, RobotCommand};
