//! # Host configuration
//!
//! ```toml
//! [printer]
//! name = "voron-2.4"
//!
//! [chamber_heater.chamber]
//! sensor = "chamber"
//! heater = "chamber_heater"
//! period = 5.0
//! max_temp = 110.0
//!
//! [heat_soak]
//! chamber_sensor = "chamber"
//!
//! [simulation]
//! ambient = 22.0
//!
//! [simulation.heaters.chamber_heater]
//! max_rate = 1.5
//!
//! [simulation.sensors.chamber]
//! follows = "chamber_heater"
//! ```
//!
//! Each `[chamber_heater.<name>]` table creates one controller. The presence
//! of `[heat_soak]`, even empty, enables the estimator.

use std::collections::{BTreeMap, HashMap};

use chamber_simulator::RigConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub chamber_heater: BTreeMap<String, ChamberHeaterConfig>,
    #[serde(default)]
    pub heat_soak: Option<HeatSoakConfig>,
    #[serde(default)]
    pub simulation: RigConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrinterConfig {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChamberHeaterConfig {
    pub sensor: String,
    pub heater: String,
    #[serde(default = "default_period")]
    pub period: f64,
    pub max_temp: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeatSoakConfig {
    #[serde(default)]
    pub chamber_sensor: Option<String>,
    #[serde(default = "default_bed_heater")]
    pub bed_heater: String,
    #[serde(default = "default_extruder_heater")]
    pub extruder_heater: String,
}

impl Default for HeatSoakConfig {
    fn default() -> Self {
        Self {
            chamber_sensor: None,
            bed_heater: default_bed_heater(),
            extruder_heater: default_extruder_heater(),
        }
    }
}

fn default_period() -> f64 { 5.0 }
fn default_bed_heater() -> String { "heater_bed".to_string() }
fn default_extruder_heater() -> String { "extruder".to_string() }

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut heater_owners: HashMap<&str, &str> = HashMap::new();
        for (name, heater) in &self.chamber_heater {
            if !(heater.period.is_finite() && heater.period > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "chamber_heater '{}': period must be finite and > 0",
                    name
                )));
            }
            if !(heater.max_temp.is_finite() && heater.max_temp > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "chamber_heater '{}': max_temp must be finite and > 0",
                    name
                )));
            }
            if let Some(other) = heater_owners.insert(heater.heater.as_str(), name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "heater '{}' is assigned to both '{}' and '{}'",
                    heater.heater, other, name
                )));
            }
        }
        if !(self.simulation.step.is_finite() && self.simulation.step > 0.0) {
            return Err(ConfigError::Invalid("simulation step must be finite and > 0".to_string()));
        }
        Ok(())
    }

    pub fn printer_name(&self) -> &str {
        self.printer.name.as_deref().unwrap_or("chamber-host")
    }
}

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match Config::from_toml_str(&contents) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::error!("Failed to load config '{}': {}", path, e);
                Err(e)
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            Err(ConfigError::Io(e))
        }
    }
}
