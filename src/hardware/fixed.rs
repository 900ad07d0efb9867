//! Hand-driven sensor and heater doubles. Temperatures only change when set,
//! which makes control decisions reproducible in tests and benches.

use std::cell::{Cell, RefCell};

use super::{HardwareError, HeaterOutput, TemperatureSensor};

#[derive(Debug, Default)]
pub struct FixedSensor {
    temp: Cell<f64>,
    failed: Cell<bool>,
}

impl FixedSensor {
    pub fn new(temp: f64) -> Self {
        Self { temp: Cell::new(temp), failed: Cell::new(false) }
    }

    pub fn set(&self, temp: f64) {
        self.temp.set(temp);
    }

    /// Makes subsequent reads fail until cleared.
    pub fn set_failed(&self, failed: bool) {
        self.failed.set(failed);
    }
}

impl TemperatureSensor for FixedSensor {
    fn get_temp(&self, _eventtime: f64) -> Result<(f64, f64), HardwareError> {
        if self.failed.get() {
            return Err(HardwareError::Unavailable("sensor read failed".to_string()));
        }
        Ok((self.temp.get(), 0.0))
    }
}

/// Heater that records every setpoint written to it.
#[derive(Debug, Default)]
pub struct RecordingHeater {
    temp: Cell<f64>,
    target: Cell<f64>,
    writes: RefCell<Vec<f64>>,
    failed: Cell<bool>,
}

impl RecordingHeater {
    pub fn new(temp: f64) -> Self {
        Self { temp: Cell::new(temp), ..Default::default() }
    }

    pub fn set_current(&self, temp: f64) {
        self.temp.set(temp);
    }

    pub fn writes(&self) -> Vec<f64> {
        self.writes.borrow().clone()
    }

    pub fn last_write(&self) -> Option<f64> {
        self.writes.borrow().last().copied()
    }

    pub fn set_failed(&self, failed: bool) {
        self.failed.set(failed);
    }
}

impl HeaterOutput for RecordingHeater {
    fn target_temp(&self) -> f64 {
        self.target.get()
    }

    fn set_temp(&self, degrees: f64) -> Result<(), HardwareError> {
        if self.failed.get() {
            return Err(HardwareError::Unavailable("heater write failed".to_string()));
        }
        self.target.set(degrees);
        self.writes.borrow_mut().push(degrees);
        Ok(())
    }
}

impl TemperatureSensor for RecordingHeater {
    fn get_temp(&self, _eventtime: f64) -> Result<(f64, f64), HardwareError> {
        Ok((self.temp.get(), self.target.get()))
    }
}
