//! Concrete [`Transport`](crate::application::transport::Transport) adapters.
//!
//! - [`tcp`] – serial-over-TCP bridge used by the binary.
//! - [`mock`] – scripted in-memory transport for tests.

pub mod mock;
pub mod tcp;
