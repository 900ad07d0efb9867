// src/hardware/mod.rs
pub mod fixed;
pub mod hardware_traits;
pub mod registry;
pub mod simulated;

pub use hardware_traits::{HeaterOutput, TemperatureSensor};
pub use registry::ObjectRegistry;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HardwareError {
    #[error("Unknown {kind} '{name}'")]
    UnknownObject { kind: &'static str, name: String },
    #[error("Heater '{heater}' is already driven by '{owner}'")]
    HeaterInUse { heater: String, owner: String },
    #[error("Hardware unavailable: {0}")]
    Unavailable(String),
}
