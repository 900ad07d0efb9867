//! Chamber heater controller.
//!
//! Drives one heater from one sensor towards an operator target. Until the
//! zone first reaches its target the heater is pinned at `max_temp`; after
//! that each periodic tick picks a setpoint from the hysteresis bands in
//! [`policy::setpoint_for`].
//!
//! The controller's mutable state lives behind an `Rc<RefCell<_>>` shared
//! with its scheduler callbacks, which hold it weakly.

pub mod policy;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::config::ChamberHeaterConfig;
use crate::hardware::{HardwareError, HeaterOutput, ObjectRegistry, TemperatureSensor};
use crate::lifecycle::LifecycleHandler;
use crate::scheduler::{Reactor, TimerHandle, TimerOutcome, WaitHandle, WaitPoll};
use policy::{MIN_WAIT_TEMP, round2, setpoint_for};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    #[error("chamber heater '{0}' is not ready, sensor and heater are bound on host ready")]
    NotReady(String),
    #[error("chamber heater '{0}' has no target, turn it on first")]
    NotActive(String),
    #[error("target {target} is outside [0, {max_temp}]")]
    TargetOutOfRange { target: f64, max_temp: f64 },
    #[error("wait temperature {threshold} is outside [{min}, {max}]")]
    ThresholdOutOfRange { threshold: f64, min: f64, max: f64 },
    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Point-in-time view of a controller for status reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub name: String,
    pub target: Option<f64>,
    pub reached: bool,
    pub temperature: Option<f64>,
    pub setpoint: Option<f64>,
    pub active: bool,
}

struct ZoneState {
    name: String,
    period: f64,
    max_temp: f64,
    sensor: Option<Rc<dyn TemperatureSensor>>,
    heater: Option<Rc<dyn HeaterOutput>>,
    target_temp: Option<f64>,
    reached: bool,
    timer: Option<TimerHandle>,
    last_temp: Option<f64>,
    last_setpoint: Option<f64>,
}

impl ZoneState {
    fn bound(&self) -> Result<(Rc<dyn TemperatureSensor>, Rc<dyn HeaterOutput>), ControlError> {
        match (&self.sensor, &self.heater) {
            (Some(sensor), Some(heater)) => Ok((sensor.clone(), heater.clone())),
            _ => Err(ControlError::NotReady(self.name.clone())),
        }
    }

    fn read_temp(&mut self, sensor: &dyn TemperatureSensor, eventtime: f64) -> Result<f64, HardwareError> {
        let (temp, _) = sensor.get_temp(eventtime)?;
        let temp = round2(temp);
        self.last_temp = Some(temp);
        Ok(temp)
    }

    /// Writes only when the heater's setpoint actually changes.
    fn apply_setpoint(&mut self, heater: &dyn HeaterOutput, degrees: f64) -> Result<(), HardwareError> {
        if heater.target_temp() != degrees {
            heater.set_temp(degrees)?;
        }
        self.last_setpoint = Some(degrees);
        Ok(())
    }

    fn tick(&mut self, eventtime: f64) -> TimerOutcome {
        let Some(target) = self.target_temp else {
            self.timer = None;
            return TimerOutcome::Done;
        };
        match self.adjust(eventtime, target) {
            Ok(()) => TimerOutcome::Reschedule(eventtime + self.period),
            Err(e) => {
                tracing::error!("[chamber_heater {}] control tick failed, turning heater off: {}", self.name, e);
                self.fail_safe();
                TimerOutcome::Done
            }
        }
    }

    fn adjust(&mut self, eventtime: f64, target: f64) -> Result<(), ControlError> {
        let (sensor, heater) = self.bound()?;
        let current = self.read_temp(sensor.as_ref(), eventtime)?;
        if !self.reached && current >= target {
            self.reached = true;
            tracing::info!("[chamber_heater {}] target {:.2}°C reached", self.name, target);
        }

        let difference = round2(current - target);
        let setpoint = if self.reached {
            setpoint_for(difference, target, self.max_temp)
        } else {
            self.max_temp
        };
        self.apply_setpoint(heater.as_ref(), setpoint)?;
        tracing::debug!(
            "[chamber_heater {}] tick: reached={}, current={}, target={}, difference={}, set={}",
            self.name, self.reached, current, target, difference, setpoint
        );
        Ok(())
    }

    /// Abandons the active cycle: no target, no timer, heater commanded off.
    fn fail_safe(&mut self) {
        self.target_temp = None;
        self.reached = false;
        self.timer = None;
        if let Some(heater) = self.heater.clone() {
            if let Err(e) = self.apply_setpoint(heater.as_ref(), 0.0) {
                tracing::error!("[chamber_heater {}] could not turn heater off: {}", self.name, e);
            }
        }
    }
}

pub struct ThermalController {
    name: String,
    sensor_name: String,
    heater_name: String,
    state: Rc<RefCell<ZoneState>>,
}

impl ThermalController {
    pub fn new(name: &str, config: &ChamberHeaterConfig) -> Self {
        tracing::info!(
            "[chamber_heater {}] sensor={}, heater={}, period={}, max_temp={}",
            name, config.sensor, config.heater, config.period, config.max_temp
        );
        Self {
            name: name.to_string(),
            sensor_name: config.sensor.clone(),
            heater_name: config.heater.clone(),
            state: Rc::new(RefCell::new(ZoneState {
                name: name.to_string(),
                period: config.period,
                max_temp: config.max_temp,
                sensor: None,
                heater: None,
                target_temp: None,
                reached: false,
                timer: None,
                last_temp: None,
                last_setpoint: None,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_temp(&self) -> Option<f64> {
        self.state.borrow().target_temp
    }

    pub fn reached(&self) -> bool {
        self.state.borrow().reached
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().timer.is_some()
    }

    /// Starts regulating towards `target`, replacing any previous cycle.
    ///
    /// The heater is driven to `max_temp` immediately when the zone is below
    /// target; otherwise the first tick, one period from now, decides.
    pub fn activate(&mut self, reactor: &mut Reactor, target: f64) -> Result<(), ControlError> {
        let mut state = self.state.borrow_mut();
        if !(0.0..=state.max_temp).contains(&target) {
            return Err(ControlError::TargetOutOfRange { target, max_temp: state.max_temp });
        }
        let (sensor, heater) = state.bound()?;
        let now = reactor.monotonic();
        let current = state.read_temp(sensor.as_ref(), now)?;
        let reached = current >= target;
        if !reached {
            let max_temp = state.max_temp;
            state.apply_setpoint(heater.as_ref(), max_temp)?;
        }

        if let Some(previous) = state.timer.take() {
            reactor.unregister_timer(previous);
        }
        state.target_temp = Some(target);
        state.reached = reached;
        let weak = Rc::downgrade(&self.state);
        let waketime = now + state.period;
        let timer = reactor.register_timer(waketime, move |eventtime| tick_shared(&weak, eventtime));
        state.timer = Some(timer);
        tracing::info!(
            "[chamber_heater {}] on: target={}, current={}, reached={}",
            self.name, target, current, reached
        );
        Ok(())
    }

    /// Stops regulating and commands the heater off. No-op when already off.
    pub fn deactivate(&mut self, reactor: &mut Reactor) -> Result<(), ControlError> {
        let mut state = self.state.borrow_mut();
        if state.target_temp.is_none() && state.timer.is_none() {
            return Ok(());
        }
        if let Some(timer) = state.timer.take() {
            reactor.unregister_timer(timer);
        }
        state.target_temp = None;
        state.reached = false;
        tracing::info!("[chamber_heater {}] off", self.name);
        if let Some(heater) = state.heater.clone() {
            state.apply_setpoint(heater.as_ref(), 0.0)?;
        }
        Ok(())
    }

    /// Registers a wait satisfied once the zone is at or above `threshold`
    /// (default: the current target). Returns the handle and the threshold.
    ///
    /// The wait fails if the controller stops regulating before the zone
    /// gets there.
    pub fn wait_until_reached(
        &self,
        reactor: &mut Reactor,
        threshold: Option<f64>,
    ) -> Result<(WaitHandle, f64), ControlError> {
        let (sensor, target) = {
            let state = self.state.borrow();
            let target = state.target_temp.ok_or_else(|| ControlError::NotActive(self.name.clone()))?;
            let (sensor, _) = state.bound()?;
            (sensor, target)
        };
        let threshold = threshold.unwrap_or(target);
        if !(MIN_WAIT_TEMP..=target).contains(&threshold) {
            return Err(ControlError::ThresholdOutOfRange { threshold, min: MIN_WAIT_TEMP, max: target });
        }

        let name = self.name.clone();
        let state = Rc::downgrade(&self.state);
        let handle = reactor.register_wait(move |eventtime| {
            let regulating = state.upgrade().is_some_and(|state| state.borrow().target_temp.is_some());
            if !regulating {
                return WaitPoll::Failed(format!(
                    "chamber heater '{}' turned off before reaching {}",
                    name, threshold
                ));
            }
            match sensor.get_temp(eventtime) {
                Ok((temp, _)) if round2(temp) >= threshold => WaitPoll::Satisfied,
                Ok(_) => WaitPoll::Pending,
                Err(e) => WaitPoll::Failed(format!("chamber heater '{}': {}", name, e)),
            }
        });
        tracing::info!("[chamber_heater {}] waiting for chamber temp to reach {}", self.name, threshold);
        Ok((handle, threshold))
    }

    pub fn status(&self) -> ControllerStatus {
        let state = self.state.borrow();
        ControllerStatus {
            name: self.name.clone(),
            target: state.target_temp,
            reached: state.reached,
            temperature: state.last_temp,
            setpoint: state.last_setpoint,
            active: state.timer.is_some(),
        }
    }
}

fn tick_shared(state: &Weak<RefCell<ZoneState>>, eventtime: f64) -> TimerOutcome {
    match state.upgrade() {
        Some(state) => state.borrow_mut().tick(eventtime),
        None => TimerOutcome::Done,
    }
}

impl LifecycleHandler for ThermalController {
    fn on_ready(&mut self, registry: &mut ObjectRegistry) -> Result<(), HardwareError> {
        let sensor = registry.lookup_sensor(&self.sensor_name)?;
        let heater = registry.claim_heater(&self.heater_name, &self.name)?;
        let mut state = self.state.borrow_mut();
        state.sensor = Some(sensor);
        state.heater = Some(heater);
        tracing::info!("[chamber_heater {}] ready", self.name);
        Ok(())
    }

    fn on_shutdown(&mut self, reactor: &mut Reactor) {
        tracing::info!("[chamber_heater {}] shutdown", self.name);
        let mut state = self.state.borrow_mut();
        if let Some(timer) = state.timer.take() {
            reactor.unregister_timer(timer);
        }
        state.fail_safe();
    }
}
