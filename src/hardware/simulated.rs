//! Host objects backed by the simulated thermal rig.

use std::cell::RefCell;
use std::fs::File;
use std::rc::{Rc, Weak};

use chamber_simulator::{ThermalRig, TraceRecorder};

use super::{HardwareError, HeaterOutput, ObjectRegistry, TemperatureSensor};
use crate::scheduler::{Reactor, TimerHandle, TimerOutcome};

pub type SharedRig = Rc<RefCell<ThermalRig>>;

pub struct SimulatedHeater {
    name: String,
    rig: SharedRig,
}

impl SimulatedHeater {
    pub fn new(name: &str, rig: SharedRig) -> Self {
        Self { name: name.to_string(), rig }
    }

    fn missing(&self) -> HardwareError {
        HardwareError::Unavailable(format!("simulated heater '{}' not present", self.name))
    }
}

impl HeaterOutput for SimulatedHeater {
    fn target_temp(&self) -> f64 {
        self.rig.borrow().heater(&self.name).map_or(0.0, |heater| heater.setpoint)
    }

    fn set_temp(&self, degrees: f64) -> Result<(), HardwareError> {
        let mut rig = self.rig.borrow_mut();
        let heater = rig.heater_mut(&self.name).ok_or_else(|| self.missing())?;
        heater.set_setpoint(degrees);
        tracing::debug!("Simulated heater {} setpoint {:.2}°C", self.name, degrees);
        Ok(())
    }
}

impl TemperatureSensor for SimulatedHeater {
    fn get_temp(&self, _eventtime: f64) -> Result<(f64, f64), HardwareError> {
        let rig = self.rig.borrow();
        let heater = rig.heater(&self.name).ok_or_else(|| self.missing())?;
        Ok((heater.temperature, heater.setpoint))
    }
}

pub struct SimulatedSensor {
    name: String,
    rig: SharedRig,
}

impl SimulatedSensor {
    pub fn new(name: &str, rig: SharedRig) -> Self {
        Self { name: name.to_string(), rig }
    }
}

impl TemperatureSensor for SimulatedSensor {
    fn get_temp(&self, _eventtime: f64) -> Result<(f64, f64), HardwareError> {
        let rig = self.rig.borrow();
        let sensor = rig.sensor(&self.name).ok_or_else(|| {
            HardwareError::Unavailable(format!("simulated sensor '{}' not present", self.name))
        })?;
        Ok((sensor.measured, 0.0))
    }
}

/// Registers every plant of `rig` under its own name.
pub fn register_rig(registry: &mut ObjectRegistry, rig: &SharedRig) {
    let (heaters, sensors): (Vec<String>, Vec<String>) = {
        let rig = rig.borrow();
        (
            rig.heaters().map(|heater| heater.name.clone()).collect(),
            rig.sensors().map(|sensor| sensor.name.clone()).collect(),
        )
    };
    for name in heaters {
        registry.add_heater(&name, Rc::new(SimulatedHeater::new(&name, rig.clone())));
    }
    for name in sensors {
        registry.add_sensor(&name, Rc::new(SimulatedSensor::new(&name, rig.clone())));
    }
}

/// Advances the rig on the scheduler every `step` seconds, optionally
/// appending each step to a CSV trace.
pub fn start_plant_timer(
    reactor: &mut Reactor,
    rig: &SharedRig,
    step: f64,
    mut trace: Option<TraceRecorder<File>>,
) -> TimerHandle {
    let weak: Weak<RefCell<ThermalRig>> = Rc::downgrade(rig);
    let mut last = reactor.monotonic();
    reactor.register_timer(last + step, move |eventtime| {
        let Some(rig) = weak.upgrade() else {
            return TimerOutcome::Done;
        };
        let dt = eventtime - last;
        last = eventtime;
        let mut rig = rig.borrow_mut();
        if dt > 0.0 {
            rig.advance(dt);
        }
        let trace_failed = trace.as_mut().is_some_and(|recorder| match recorder.record(eventtime, &rig) {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!("Dropping plant trace after write error: {}", e);
                true
            }
        });
        if trace_failed {
            trace = None;
        }
        TimerOutcome::Reschedule(eventtime + step)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;
    use chamber_simulator::{HeaterPlantConfig, RigConfig, SensorPlantConfig};

    fn rig() -> SharedRig {
        let mut config = RigConfig::default();
        config.ambient = 20.0;
        config.heaters.insert("chamber_heater".to_string(), HeaterPlantConfig::default());
        config.sensors.insert(
            "chamber".to_string(),
            SensorPlantConfig { follows: Some("chamber_heater".to_string()), ..Default::default() },
        );
        Rc::new(RefCell::new(ThermalRig::new(&config)))
    }

    #[test]
    fn registered_objects_reach_the_rig() {
        let rig = rig();
        let mut registry = ObjectRegistry::new();
        register_rig(&mut registry, &rig);
        let heater = registry.claim_heater("chamber_heater", "chamber").unwrap();
        heater.set_temp(80.0).unwrap();
        assert_eq!(heater.target_temp(), 80.0);
        assert_eq!(rig.borrow().heater("chamber_heater").unwrap().setpoint, 80.0);
        let sensor = registry.lookup_sensor("chamber").unwrap();
        assert_eq!(sensor.get_temp(0.0).unwrap(), (20.0, 0.0));
    }

    #[test]
    fn plant_timer_advances_rig() {
        let rig = rig();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut reactor = Reactor::new(clock.clone());
        rig.borrow_mut().heater_mut("chamber_heater").unwrap().set_setpoint(100.0);
        start_plant_timer(&mut reactor, &rig, 0.5, None);
        for _ in 0..4 {
            clock.advance(0.5);
            reactor.run_pending();
        }
        let rig = rig.borrow();
        assert!((rig.elapsed - 2.0).abs() < 1e-9);
        assert!(rig.heater("chamber_heater").unwrap().temperature > 20.0);
    }

    #[test]
    fn plant_timer_stops_when_rig_dropped() {
        let clock = Rc::new(ManualClock::new(0.0));
        let mut reactor = Reactor::new(clock.clone());
        {
            let rig = rig();
            start_plant_timer(&mut reactor, &rig, 0.5, None);
        }
        clock.advance(0.5);
        reactor.run_pending();
        assert_eq!(reactor.timer_count(), 0);
    }
}
