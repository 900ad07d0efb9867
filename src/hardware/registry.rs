//! Lookup table of host objects, resolved by components when the host
//! signals readiness.

use std::collections::HashMap;
use std::rc::Rc;

use super::{HardwareError, HeaterOutput, TemperatureSensor};

struct RegisteredHeater {
    output: Rc<dyn HeaterOutput>,
    sensor: Rc<dyn TemperatureSensor>,
    owner: Option<String>,
}

#[derive(Default)]
pub struct ObjectRegistry {
    sensors: HashMap<String, Rc<dyn TemperatureSensor>>,
    heaters: HashMap<String, RegisteredHeater>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sensor<S>(&mut self, name: &str, sensor: Rc<S>)
    where
        S: TemperatureSensor + 'static,
    {
        self.sensors.insert(name.to_string(), sensor);
    }

    pub fn add_heater<H>(&mut self, name: &str, heater: Rc<H>)
    where
        H: HeaterOutput + TemperatureSensor + 'static,
    {
        self.heaters.insert(
            name.to_string(),
            RegisteredHeater {
                output: heater.clone(),
                sensor: heater,
                owner: None,
            },
        );
    }

    pub fn lookup_sensor(&self, name: &str) -> Result<Rc<dyn TemperatureSensor>, HardwareError> {
        self.sensors
            .get(name)
            .cloned()
            .ok_or_else(|| HardwareError::UnknownObject { kind: "temperature sensor", name: name.to_string() })
    }

    /// Read-only view of a heater's own temperature. Does not claim it.
    pub fn heater_sensor(&self, name: &str) -> Result<Rc<dyn TemperatureSensor>, HardwareError> {
        self.heaters
            .get(name)
            .map(|heater| heater.sensor.clone())
            .ok_or_else(|| HardwareError::UnknownObject { kind: "heater", name: name.to_string() })
    }

    /// Grants `owner` the exclusive right to drive heater `name`.
    pub fn claim_heater(&mut self, name: &str, owner: &str) -> Result<Rc<dyn HeaterOutput>, HardwareError> {
        let heater = self
            .heaters
            .get_mut(name)
            .ok_or_else(|| HardwareError::UnknownObject { kind: "heater", name: name.to_string() })?;
        match &heater.owner {
            Some(current) if current != owner => Err(HardwareError::HeaterInUse {
                heater: name.to_string(),
                owner: current.clone(),
            }),
            _ => {
                heater.owner = Some(owner.to_string());
                Ok(heater.output.clone())
            }
        }
    }

    pub fn release_heater(&mut self, name: &str) {
        if let Some(heater) = self.heaters.get_mut(name) {
            heater.owner = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::fixed::{FixedSensor, RecordingHeater};

    #[test]
    fn heater_claims_are_exclusive() {
        let mut registry = ObjectRegistry::new();
        registry.add_heater("chamber_heater", Rc::new(RecordingHeater::new(20.0)));
        assert!(registry.claim_heater("chamber_heater", "chamber").is_ok());
        assert!(registry.claim_heater("chamber_heater", "chamber").is_ok());
        assert_eq!(
            registry.claim_heater("chamber_heater", "other").err(),
            Some(HardwareError::HeaterInUse {
                heater: "chamber_heater".to_string(),
                owner: "chamber".to_string(),
            })
        );
        registry.release_heater("chamber_heater");
        assert!(registry.claim_heater("chamber_heater", "other").is_ok());
    }

    #[test]
    fn heater_can_be_read_without_claim() {
        let mut registry = ObjectRegistry::new();
        registry.add_heater("heater_bed", Rc::new(RecordingHeater::new(55.5)));
        let sensor = registry.heater_sensor("heater_bed").unwrap();
        assert_eq!(sensor.get_temp(0.0).unwrap().0, 55.5);
        assert!(registry.claim_heater("heater_bed", "bed").is_ok());
    }

    #[test]
    fn unknown_objects_are_reported() {
        let mut registry = ObjectRegistry::new();
        registry.add_sensor("chamber", Rc::new(FixedSensor::new(30.0)));
        assert!(registry.lookup_sensor("chamber").is_ok());
        assert!(matches!(
            registry.lookup_sensor("nope"),
            Err(HardwareError::UnknownObject { kind: "temperature sensor", .. })
        ));
        assert!(matches!(
            registry.claim_heater("nope", "x"),
            Err(HardwareError::UnknownObject { kind: "heater", .. })
        ));
    }
}
