//! Heater and sensor plant models.

use serde::Deserialize;

/// Width of the proportional band (°C) below the setpoint in which the
/// simulated heater element throttles its power.
const POWER_BAND: f64 = 10.0;

#[derive(Debug, Clone, Deserialize)]
pub struct HeaterPlantConfig {
    #[serde(default)]
    pub initial_temp: Option<f64>,
    /// Maximum heating rate at full power, °C/s.
    #[serde(default = "default_max_rate")]
    pub max_rate: f64,
    /// Newtonian loss coefficient towards ambient, 1/s.
    #[serde(default = "default_heater_loss")]
    pub loss: f64,
}

impl Default for HeaterPlantConfig {
    fn default() -> Self {
        Self {
            initial_temp: None,
            max_rate: default_max_rate(),
            loss: default_heater_loss(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorPlantConfig {
    /// Heater whose element temperature this sensor tracks. `None` reads ambient.
    #[serde(default)]
    pub follows: Option<String>,
    #[serde(default)]
    pub initial_temp: Option<f64>,
    /// Coupling towards the followed heater, 1/s.
    #[serde(default = "default_lag")]
    pub lag: f64,
    /// Leak towards ambient, 1/s.
    #[serde(default = "default_leak")]
    pub leak: f64,
    /// Peak-to-peak uniform noise added per sample, °C.
    #[serde(default)]
    pub noise: f64,
}

impl Default for SensorPlantConfig {
    fn default() -> Self {
        Self {
            follows: None,
            initial_temp: None,
            lag: default_lag(),
            leak: default_leak(),
            noise: 0.0,
        }
    }
}

fn default_max_rate() -> f64 { 2.0 }
fn default_heater_loss() -> f64 { 0.02 }
fn default_lag() -> f64 { 0.02 }
fn default_leak() -> f64 { 0.005 }

#[derive(Debug, Clone)]
pub struct HeaterPlant {
    pub name: String,
    pub temperature: f64,
    pub setpoint: f64,
    pub power: f64,
    max_rate: f64,
    loss: f64,
}

impl HeaterPlant {
    pub fn new(name: &str, ambient: f64, config: &HeaterPlantConfig) -> Self {
        Self {
            name: name.to_string(),
            temperature: config.initial_temp.unwrap_or(ambient),
            setpoint: 0.0,
            power: 0.0,
            max_rate: config.max_rate,
            loss: config.loss,
        }
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint.max(0.0);
    }

    pub fn advance(&mut self, dt: f64, ambient: f64) {
        self.power = if self.setpoint <= 0.0 {
            0.0
        } else {
            ((self.setpoint - self.temperature) / POWER_BAND).clamp(0.0, 1.0)
        };
        let heat_gain = self.power * self.max_rate * dt;
        let heat_loss = self.loss * (self.temperature - ambient) * dt;
        self.temperature += heat_gain - heat_loss;
    }
}

#[derive(Debug, Clone)]
pub struct SensorPlant {
    pub name: String,
    pub follows: Option<String>,
    pub measured: f64,
    lag: f64,
    leak: f64,
    noise: f64,
}

impl SensorPlant {
    pub fn new(name: &str, ambient: f64, config: &SensorPlantConfig) -> Self {
        Self {
            name: name.to_string(),
            follows: config.follows.clone(),
            measured: config.initial_temp.unwrap_or(ambient),
            lag: config.lag,
            leak: config.leak,
            noise: config.noise,
        }
    }

    /// `source` is the followed heater's element temperature, if any.
    pub fn advance(&mut self, dt: f64, source: Option<f64>, ambient: f64) {
        if let Some(source) = source {
            self.measured += self.lag * (source - self.measured) * dt;
        }
        self.measured -= self.leak * (self.measured - ambient) * dt;
        if self.noise > 0.0 {
            self.measured += self.noise * (rand::random::<f64>() - 0.5);
        }
    }
}
