//! Application layer: the connection lifecycle independent of any concrete
//! transport or storage.
//!
//! - [`connection_manager`] – state machine and coordinator task
//! - [`negotiator`] – ordered transport strategies
//! - [`session`] – receive loop and writer for one live link
//! - [`transport`], [`device_store`], [`events`] – the seams to the outside

pub mod connection_manager;
pub mod device_store;
pub mod error;
pub mod events;
pub mod negotiator;
pub mod session;
pub mod transport;
