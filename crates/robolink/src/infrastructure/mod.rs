//! Infrastructure layer for the host application.
//!
//! Contains the OS-facing adapters: TCP transport, file-system storage, and
//! the interactive terminal.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `robolink_core`, but MUST NOT be imported by the `application` layer.

pub mod storage;
pub mod terminal;
pub mod transport;
