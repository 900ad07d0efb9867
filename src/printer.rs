// src/printer.rs - Host core: owns the scheduler, hardware and command queue
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::fs::File;
use std::rc::Rc;

use chamber_simulator::{ThermalRig, TraceRecorder};
use thiserror::Error;

use crate::config::Config;
use crate::control::{ControllerStatus, ThermalController};
use crate::gcode::{COMMAND_HELP, CommandError, GCodeCommand};
use crate::hardware::simulated::{SharedRig, register_rig, start_plant_timer};
use crate::hardware::{HardwareError, ObjectRegistry};
use crate::lifecycle::LifecycleHandler;
use crate::scheduler::{Reactor, TimeSource, TimerHandle, WaitHandle, WaitStatus};
use crate::soak::{HeatSoakEstimator, SoakOutcome, SoakZone};
use crate::status::DisplayStatus;

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Printer is already running")]
    AlreadyStarted,
    #[error("Simulation error: {0}")]
    Simulation(String),
}

/// One line of output produced while processing commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Info(String),
    Ok,
    Error(String),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Info(message) => write!(f, "// {}", message),
            Reply::Ok => f.write_str("ok"),
            Reply::Error(message) => write!(f, "!! {}", message),
        }
    }
}

/// A blocking command waiting on the scheduler.
struct PendingWait {
    command: String,
    handle: WaitHandle,
}

pub struct Printer {
    config: Config,
    reactor: Reactor,
    registry: ObjectRegistry,
    controllers: BTreeMap<String, ThermalController>,
    heat_soak: Option<HeatSoakEstimator>,
    status: Rc<DisplayStatus>,
    rig: Option<SharedRig>,
    plant_timer: Option<TimerHandle>,
    queue: VecDeque<String>,
    pending: Option<PendingWait>,
    ready: bool,
}

impl Printer {
    pub fn new(config: Config, clock: Rc<dyn TimeSource>) -> Self {
        let status = Rc::new(DisplayStatus::new());
        let controllers = config
            .chamber_heater
            .iter()
            .map(|(name, section)| (name.clone(), ThermalController::new(name, section)))
            .collect();
        let heat_soak = config
            .heat_soak
            .as_ref()
            .map(|section| HeatSoakEstimator::new(section).with_status(status.clone()));
        Self {
            config,
            reactor: Reactor::new(clock),
            registry: ObjectRegistry::new(),
            controllers,
            heat_soak,
            status,
            rig: None,
            plant_timer: None,
            queue: VecDeque::new(),
            pending: None,
            ready: false,
        }
    }

    /// Backs the registry with the simulated rig described by `[simulation]`
    /// and advances it on the scheduler.
    pub fn attach_simulation(&mut self, trace: Option<TraceRecorder<File>>) -> Result<(), PrinterError> {
        if self.rig.is_some() {
            return Err(PrinterError::Simulation("simulation already attached".to_string()));
        }
        let rig: SharedRig = Rc::new(RefCell::new(ThermalRig::new(&self.config.simulation)));
        register_rig(&mut self.registry, &rig);
        let step = self.config.simulation.step;
        self.plant_timer = Some(start_plant_timer(&mut self.reactor, &rig, step, trace));
        tracing::info!(
            "Simulation attached: {} heaters, {} sensors, step {}s",
            self.config.simulation.heaters.len(),
            self.config.simulation.sensors.len(),
            step
        );
        self.rig = Some(rig);
        Ok(())
    }

    /// Fires the ready notification: every component resolves its hardware.
    pub fn start(&mut self) -> Result<(), PrinterError> {
        if self.ready {
            return Err(PrinterError::AlreadyStarted);
        }
        for controller in self.controllers.values_mut() {
            controller.on_ready(&mut self.registry)?;
        }
        if let Some(heat_soak) = self.heat_soak.as_mut() {
            heat_soak.on_ready(&mut self.registry)?;
        }
        self.ready = true;
        tracing::info!("Printer '{}' ready", self.config.printer_name());
        Ok(())
    }

    pub fn shutdown(&mut self) {
        tracing::info!("Shutting down printer '{}'", self.config.printer_name());
        for controller in self.controllers.values_mut() {
            controller.on_shutdown(&mut self.reactor);
        }
        if let Some(heat_soak) = self.heat_soak.as_mut() {
            heat_soak.on_shutdown(&mut self.reactor);
        }
        if let Some(timer) = self.plant_timer.take() {
            self.reactor.unregister_timer(timer);
        }
        if let Some(pending) = self.pending.take() {
            tracing::warn!("Abandoning '{}' on shutdown", pending.command);
        }
        self.queue.clear();
        self.reactor.shutdown();
        self.ready = false;
    }

    pub fn submit(&mut self, line: impl Into<String>) {
        self.queue.push_back(line.into());
    }

    /// Fires due timers, then runs queued commands until one blocks.
    pub fn pump(&mut self) -> Vec<Reply> {
        let mut replies = Vec::new();
        self.reactor.run_pending();
        loop {
            if let Some(pending) = &self.pending {
                match pending.handle.status() {
                    WaitStatus::Pending => break,
                    WaitStatus::Satisfied => replies.push(Reply::Ok),
                    WaitStatus::Failed(message) => replies.push(Reply::Error(message)),
                    WaitStatus::Cancelled => {
                        replies.push(Reply::Error(format!("{} was cancelled", pending.command)))
                    }
                }
                self.pending = None;
            }
            let Some(line) = self.queue.pop_front() else {
                break;
            };
            match self.execute(&line, &mut replies) {
                Ok(None) => {}
                Ok(Some(pending)) => {
                    self.pending = Some(pending);
                    // A fresh wait polls at the current time.
                    self.reactor.run_pending();
                }
                Err(e) => {
                    tracing::warn!("Command '{}' rejected: {}", line.trim(), e);
                    replies.push(Reply::Error(e.to_string()));
                }
            }
        }
        replies
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.pending.is_none()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn next_deadline(&mut self) -> Option<f64> {
        self.reactor.next_deadline()
    }

    pub fn monotonic(&self) -> f64 {
        self.reactor.monotonic()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.registry
    }

    pub fn controller(&self, name: &str) -> Option<&ThermalController> {
        self.controllers.get(name)
    }

    pub fn heat_soak(&self) -> Option<&HeatSoakEstimator> {
        self.heat_soak.as_ref()
    }

    pub fn status_message(&self) -> String {
        self.status.message()
    }

    pub fn rig(&self) -> Option<&SharedRig> {
        self.rig.as_ref()
    }

    fn execute(&mut self, line: &str, replies: &mut Vec<Reply>) -> Result<Option<PendingWait>, CommandError> {
        let Some(command) = GCodeCommand::parse(line)? else {
            return Ok(None);
        };
        tracing::info!("Processing: {}", command);
        let wait = self.handle_command(&command, replies)?;
        match wait {
            Some(handle) => Ok(Some(PendingWait { command: command.command, handle })),
            None => {
                replies.push(Reply::Ok);
                Ok(None)
            }
        }
    }

    fn handle_command(
        &mut self,
        command: &GCodeCommand,
        replies: &mut Vec<Reply>,
    ) -> Result<Option<WaitHandle>, CommandError> {
        match command.command.as_str() {
            "CHAMBER_HEAT_ON" => {
                let target = command.require_float("TEMP")?;
                let controller = select_controller(&mut self.controllers, command)?;
                controller.activate(&mut self.reactor, target)?;
                replies.push(Reply::Info(format!("{} target {:.1}", controller.name(), target)));
                Ok(None)
            }
            "CHAMBER_HEAT_OFF" => {
                let controller = select_controller(&mut self.controllers, command)?;
                controller.deactivate(&mut self.reactor)?;
                Ok(None)
            }
            "CHAMBER_HEAT_WAIT" => {
                let threshold = command.get_float("TEMP")?;
                let controller = select_controller(&mut self.controllers, command)?;
                let (handle, threshold) = controller.wait_until_reached(&mut self.reactor, threshold)?;
                replies.push(Reply::Info(format!("Waiting for chamber temp to reach {:.1}", threshold)));
                Ok(Some(handle))
            }
            "CHAMBER_HEAT_STATUS" => {
                match command.get("HEATER") {
                    Some(_) => {
                        let controller = select_controller(&mut self.controllers, command)?;
                        replies.push(Reply::Info(describe_controller(&controller.status())));
                    }
                    None => {
                        if self.controllers.is_empty() {
                            return Err(CommandError::NoHeaters);
                        }
                        for controller in self.controllers.values() {
                            replies.push(Reply::Info(describe_controller(&controller.status())));
                        }
                    }
                }
                Ok(None)
            }
            "HEAT_SOAK_BASELINE" => {
                let heat_soak = self.heat_soak.as_mut().ok_or(CommandError::EstimatorDisabled)?;
                for (zone, temp) in heat_soak.capture_baseline(&self.reactor)? {
                    replies.push(Reply::Info(format!("baseline_{}_temp: {}", zone, temp)));
                }
                Ok(None)
            }
            "HEAT_SOAK_WAIT" => {
                let heat_soak = self.heat_soak.as_mut().ok_or(CommandError::EstimatorDisabled)?;
                let zone: SoakZone = command.require("FOR")?.parse()?;
                let target = command.require_float("TEMP")?;
                let start_temp = command.get_float("START_TEMP")?;
                match heat_soak.wait(&mut self.reactor, zone, target, start_temp)? {
                    SoakOutcome::AlreadySoaked { .. } => {
                        replies.push(Reply::Info(format!(
                            "Soak time for {} is <= 0, no heat soak necessary",
                            zone
                        )));
                        Ok(None)
                    }
                    SoakOutcome::Waiting { handle, estimated_sec } => {
                        replies.push(Reply::Info(format!("Heat soaking {} for {}s", zone, estimated_sec)));
                        Ok(Some(handle))
                    }
                }
            }
            "HEAT_SOAK_STATUS" => {
                let heat_soak = self.heat_soak.as_ref().ok_or(CommandError::EstimatorDisabled)?;
                describe_heat_soak(heat_soak, replies);
                Ok(None)
            }
            "STATUS" => {
                let message = self.status.message();
                replies.push(Reply::Info(if message.is_empty() {
                    format!("{}: {}", self.config.printer_name(), if self.ready { "ready" } else { "not ready" })
                } else {
                    message
                }));
                for controller in self.controllers.values() {
                    replies.push(Reply::Info(describe_controller(&controller.status())));
                }
                if let Some(heat_soak) = &self.heat_soak {
                    describe_heat_soak(heat_soak, replies);
                }
                Ok(None)
            }
            "HELP" => {
                for (name, help) in COMMAND_HELP {
                    replies.push(Reply::Info(format!("{:<20} {}", name, help)));
                }
                Ok(None)
            }
            _ => Err(CommandError::UnknownCommand(command.command.clone())),
        }
    }
}

/// Resolves `HEATER=`, which may be omitted when only one controller exists.
fn select_controller<'a>(
    controllers: &'a mut BTreeMap<String, ThermalController>,
    command: &GCodeCommand,
) -> Result<&'a mut ThermalController, CommandError> {
    match command.get("HEATER") {
        Some(name) => controllers
            .get_mut(name)
            .ok_or_else(|| CommandError::UnknownHeater(name.to_string())),
        None => match controllers.len() {
            0 => Err(CommandError::NoHeaters),
            1 => Ok(controllers.values_mut().next().ok_or(CommandError::NoHeaters)?),
            _ => Err(CommandError::AmbiguousHeater(
                controllers.keys().cloned().collect::<Vec<_>>().join(", "),
            )),
        },
    }
}

fn describe_controller(status: &ControllerStatus) -> String {
    let fmt_temp = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v));
    format!(
        "{}: target={} temp={} setpoint={} reached={} active={}",
        status.name,
        fmt_temp(status.target),
        fmt_temp(status.temperature),
        fmt_temp(status.setpoint),
        status.reached,
        status.active
    )
}

fn describe_heat_soak(heat_soak: &HeatSoakEstimator, replies: &mut Vec<Reply>) {
    let baselines = SoakZone::ALL
        .iter()
        .filter(|zone| **zone != SoakZone::Chamber || heat_soak.chamber_enabled())
        .map(|zone| match heat_soak.baseline(*zone) {
            Some(temp) => format!("{}={}", zone, temp),
            None => format!("{}=-", zone),
        })
        .collect::<Vec<_>>()
        .join(" ");
    replies.push(Reply::Info(format!("heat_soak baselines: {}", baselines)));
    if let Some(progress) = heat_soak.progress() {
        let remaining = progress
            .remaining_sec
            .map_or_else(|| format!("{}", progress.estimated_sec), |sec| sec.to_string());
        replies.push(Reply::Info(format!("Heat soaking {}: {}s left", progress.zone, remaining)));
    }
}
