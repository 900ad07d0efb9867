//! Collection of named plants advanced together.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::plant::{HeaterPlant, HeaterPlantConfig, SensorPlant, SensorPlantConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct RigConfig {
    #[serde(default = "default_ambient")]
    pub ambient: f64,
    /// Plant integration step, seconds of logical time.
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default)]
    pub heaters: BTreeMap<String, HeaterPlantConfig>,
    #[serde(default)]
    pub sensors: BTreeMap<String, SensorPlantConfig>,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            ambient: default_ambient(),
            step: default_step(),
            heaters: BTreeMap::new(),
            sensors: BTreeMap::new(),
        }
    }
}

fn default_ambient() -> f64 { 22.0 }
fn default_step() -> f64 { 0.5 }

#[derive(Debug, Clone)]
pub struct ThermalRig {
    pub ambient: f64,
    pub elapsed: f64,
    heaters: BTreeMap<String, HeaterPlant>,
    sensors: BTreeMap<String, SensorPlant>,
}

impl ThermalRig {
    pub fn new(config: &RigConfig) -> Self {
        let heaters = config
            .heaters
            .iter()
            .map(|(name, cfg)| (name.clone(), HeaterPlant::new(name, config.ambient, cfg)))
            .collect();
        let sensors = config
            .sensors
            .iter()
            .map(|(name, cfg)| (name.clone(), SensorPlant::new(name, config.ambient, cfg)))
            .collect();
        tracing::info!(
            "Thermal rig initialized: {} heaters, {} sensors, ambient {:.1}°C",
            config.heaters.len(),
            config.sensors.len(),
            config.ambient
        );
        Self {
            ambient: config.ambient,
            elapsed: 0.0,
            heaters,
            sensors,
        }
    }

    pub fn heater(&self, name: &str) -> Option<&HeaterPlant> {
        self.heaters.get(name)
    }

    pub fn heater_mut(&mut self, name: &str) -> Option<&mut HeaterPlant> {
        self.heaters.get_mut(name)
    }

    pub fn sensor(&self, name: &str) -> Option<&SensorPlant> {
        self.sensors.get(name)
    }

    pub fn heaters(&self) -> impl Iterator<Item = &HeaterPlant> {
        self.heaters.values()
    }

    pub fn sensors(&self) -> impl Iterator<Item = &SensorPlant> {
        self.sensors.values()
    }

    /// Heaters first, then sensors sample the updated element temperatures.
    pub fn advance(&mut self, dt: f64) {
        let ambient = self.ambient;
        for heater in self.heaters.values_mut() {
            heater.advance(dt, ambient);
        }
        for sensor in self.sensors.values_mut() {
            let source = sensor
                .follows
                .as_ref()
                .and_then(|name| self.heaters.get(name))
                .map(|heater| heater.temperature);
            sensor.advance(dt, source, ambient);
        }
        self.elapsed += dt;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chamber_rig() -> ThermalRig {
        let mut config = RigConfig::default();
        config.heaters.insert("chamber_heater".to_string(), HeaterPlantConfig::default());
        config.sensors.insert(
            "chamber".to_string(),
            SensorPlantConfig { follows: Some("chamber_heater".to_string()), ..Default::default() },
        );
        ThermalRig::new(&config)
    }

    #[test]
    fn sensor_follows_heater() {
        let mut rig = chamber_rig();
        rig.heater_mut("chamber_heater").unwrap().set_setpoint(110.0);
        for _ in 0..200 {
            rig.advance(0.5);
        }
        let heater = rig.heater("chamber_heater").unwrap().temperature;
        let chamber = rig.sensor("chamber").unwrap().measured;
        assert!(chamber > rig.ambient);
        assert!(chamber < heater);
        assert!((rig.elapsed - 100.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_names_resolve_to_none() {
        let rig = chamber_rig();
        assert!(rig.heater("extruder").is_none());
        assert!(rig.sensor("bed").is_none());
    }
}
