//! Domain value types shared by every RoboLink component.

pub mod device;
pub mod state;
