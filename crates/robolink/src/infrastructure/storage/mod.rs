//! Storage infrastructure: file persistence for the host.
//!
//! - [`config`] – the TOML configuration file, with defaults on first run.
//! - [`device_store`] – the persisted last-used device, kept next to the
//!   config file.

pub mod config;
pub mod device_store;
