//! Lumped thermal plant used as the hardware backend for the chamber host.
//!
//! Heaters follow a commanded setpoint with a rate-limited first-order
//! response; sensors lag behind the heater they are coupled to. Everything
//! advances in fixed `dt` steps driven by the host scheduler.

pub mod plant;
pub mod rig;
pub mod trace;

pub use plant::{HeaterPlant, HeaterPlantConfig, SensorPlant, SensorPlantConfig};
pub use rig::{RigConfig, ThermalRig};
pub use trace::TraceRecorder;
