//! robolink library crate.
//!
//! Keeps a point-to-point serial link to a mobile robot alive over an
//! unreliable transport: negotiates the connection with fallback strategies,
//! frames the incoming byte stream into lines, reports everything through one
//! ordered event stream, and optionally reconnects after the link drops.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! [robolink]
//!   ├── application/        Connection manager, negotiator, session worker,
//!   │                       and the Transport / DeviceStore / EventSink seams
//!   └── infrastructure/
//!         ├── transport/    TCP serial bridge, scripted mock
//!         ├── storage/      TOML config, last-device file
//!         └── terminal/     Interactive command line
//! ```
//!
//! Pure types (device identifiers, connection state, the line framer) live
//! in `robolink-core`.
//!
//! # Layer rules
//!
//! - `application` depends on `robolink-core`, `tokio` and its own traits only.
//! - `infrastructure` implements those traits and may depend on everything.

/// Application layer: the connection lifecycle.
pub mod application;

/// Infrastructure layer: transports, storage and the terminal.
pub mod infrastructure;

pub use application::connection_manager::{ConnectionManager, LinkSettings};
pub use application::error::{ErrorKind, LinkError};
pub use application::events::{forward_events, EventSink, LinkEvent};
