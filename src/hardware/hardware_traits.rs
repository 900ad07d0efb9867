// Capability interfaces bound by controllers once the host is ready.
//
// Both are single-threaded handles: setters take `&self` and implementations
// use interior mutability, so a heater can be read by one component while
// another owns the right to drive it.

use super::HardwareError;

pub trait TemperatureSensor {
    /// Most recent `(temperature, target)` sample. Plain sensors report a
    /// target of 0.
    fn get_temp(&self, eventtime: f64) -> Result<(f64, f64), HardwareError>;
}

pub trait HeaterOutput {
    /// Setpoint last commanded to the heater, 0 when off.
    fn target_temp(&self) -> f64;
    fn set_temp(&self, degrees: f64) -> Result<(), HardwareError>;
}
