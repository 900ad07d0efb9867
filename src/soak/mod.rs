//! Heat-soak estimator.
//!
//! Captures baseline temperatures for bed, extruder and (optionally) chamber,
//! then turns a requested target into a soak duration with a linear
//! per-zone rate and waits it out cooperatively on the scheduler.

pub mod zone;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::config::HeatSoakConfig;
use crate::control::policy::round2;
use crate::hardware::{HardwareError, ObjectRegistry, TemperatureSensor};
use crate::lifecycle::LifecycleHandler;
use crate::scheduler::{Reactor, WaitHandle, WaitPoll};
use crate::status::StatusSink;
pub use zone::SoakZone;

/// Remaining time is reported whenever it lands on a multiple of this.
const REPORT_EVERY_SEC: i64 = 10;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SoakError {
    #[error("HEAT_SOAK_BASELINE should be called when starting a print, baseline was not collected")]
    BaselineMissing,
    #[error("FOR is invalid, '{0}' must be bed|extruder|chamber")]
    UnknownZone(String),
    #[error("can't heat soak using 'chamber' because no chamber sensor was configured")]
    ChamberDisabled,
    #[error("heat soak is not ready, sensors are bound on host ready")]
    NotReady,
    #[error("a heat soak wait is already in progress")]
    WaitInProgress,
    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Result of a successfully accepted soak request.
#[derive(Debug, Clone)]
pub enum SoakOutcome {
    /// Estimate was zero or negative; nothing to wait for.
    AlreadySoaked { estimated_sec: f64 },
    Waiting { handle: WaitHandle, estimated_sec: f64 },
}

/// Snapshot of an in-flight soak.
#[derive(Debug, Clone, PartialEq)]
pub struct SoakProgress {
    pub zone: SoakZone,
    pub estimated_sec: f64,
    pub start_time: Option<f64>,
    pub remaining_sec: Option<i64>,
}

#[derive(Debug)]
struct WaitState {
    zone: SoakZone,
    estimated_sec: f64,
    start_time: Option<f64>,
    remaining_sec: Option<i64>,
    last_report: Option<i64>,
}

pub struct HeatSoakEstimator {
    config: HeatSoakConfig,
    bed: Option<Rc<dyn TemperatureSensor>>,
    extruder: Option<Rc<dyn TemperatureSensor>>,
    chamber: Option<Rc<dyn TemperatureSensor>>,
    baseline: [Option<f64>; 3],
    wait_state: Rc<RefCell<Option<WaitState>>>,
    wait: Option<WaitHandle>,
    status: Option<Rc<dyn StatusSink>>,
}

impl HeatSoakEstimator {
    pub fn new(config: &HeatSoakConfig) -> Self {
        Self {
            config: config.clone(),
            bed: None,
            extruder: None,
            chamber: None,
            baseline: [None; 3],
            wait_state: Rc::new(RefCell::new(None)),
            wait: None,
            status: None,
        }
    }

    pub fn with_status(mut self, status: Rc<dyn StatusSink>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn chamber_enabled(&self) -> bool {
        self.config.chamber_sensor.is_some()
    }

    pub fn baseline(&self, zone: SoakZone) -> Option<f64> {
        self.baseline[zone.index()]
    }

    pub fn progress(&self) -> Option<SoakProgress> {
        self.wait_state.borrow().as_ref().map(|state| SoakProgress {
            zone: state.zone,
            estimated_sec: state.estimated_sec,
            start_time: state.start_time,
            remaining_sec: state.remaining_sec,
        })
    }

    pub fn is_waiting(&self) -> bool {
        self.wait_state.borrow().is_some()
    }

    /// Reads and stores the current temperature of every enabled zone.
    pub fn capture_baseline(&mut self, reactor: &Reactor) -> Result<Vec<(SoakZone, f64)>, SoakError> {
        let (Some(bed), Some(extruder)) = (&self.bed, &self.extruder) else {
            return Err(SoakError::NotReady);
        };
        let eventtime = reactor.monotonic();
        let mut readings = vec![
            (SoakZone::Bed, round2(bed.get_temp(eventtime)?.0)),
            (SoakZone::Extruder, round2(extruder.get_temp(eventtime)?.0)),
        ];
        if let Some(chamber) = &self.chamber {
            readings.push((SoakZone::Chamber, round2(chamber.get_temp(eventtime)?.0)));
        }
        for (zone, temp) in &readings {
            self.baseline[zone.index()] = Some(*temp);
            tracing::info!("[heat_soak] baseline_{}_temp: {}", zone, temp);
        }
        Ok(readings)
    }

    /// Starts a soak of `zone` from `start_temp` (default: its baseline) up
    /// to `target`. Every enabled zone must have a baseline.
    pub fn wait(
        &mut self,
        reactor: &mut Reactor,
        zone: SoakZone,
        target: f64,
        start_temp: Option<f64>,
    ) -> Result<SoakOutcome, SoakError> {
        if self.is_waiting() {
            return Err(SoakError::WaitInProgress);
        }
        let chamber_enabled = self.chamber_enabled();
        let missing = SoakZone::ALL
            .iter()
            .filter(|zone| **zone != SoakZone::Chamber || chamber_enabled)
            .any(|zone| self.baseline(*zone).is_none());
        if missing {
            return Err(SoakError::BaselineMissing);
        }
        if zone == SoakZone::Chamber && !chamber_enabled {
            return Err(SoakError::ChamberDisabled);
        }

        let start = match start_temp.or(self.baseline(zone)) {
            Some(start) => start,
            None => return Err(SoakError::BaselineMissing),
        };
        let estimated_sec = zone.estimate_sec(target - start);
        if estimated_sec <= 0.0 {
            tracing::info!("[heat_soak] soak time for {} is <= 0, no heat soak necessary", zone);
            return Ok(SoakOutcome::AlreadySoaked { estimated_sec });
        }

        *self.wait_state.borrow_mut() = Some(WaitState {
            zone,
            estimated_sec,
            start_time: None,
            remaining_sec: None,
            last_report: None,
        });
        let slot = Rc::downgrade(&self.wait_state);
        let status = self.status.clone();
        let handle = reactor.register_wait(move |eventtime| poll_soak(&slot, status.as_deref(), eventtime));
        self.wait = Some(handle.clone());
        tracing::info!(
            "[heat_soak] soaking {} from {} to {}: {}s",
            zone, start, target, estimated_sec
        );
        Ok(SoakOutcome::Waiting { handle, estimated_sec })
    }

    /// Abandons an in-flight soak, if any.
    pub fn cancel(&mut self, reactor: &mut Reactor) {
        if let Some(handle) = self.wait.take() {
            reactor.cancel_wait(&handle);
        }
        if self.wait_state.borrow_mut().take().is_some() {
            tracing::info!("[heat_soak] wait cancelled");
            if let Some(status) = &self.status {
                status.set_status_text("");
            }
        }
    }
}

/// One poll of the soak predicate. The first poll only records the start
/// time, so a soak never completes on the poll that starts it.
fn poll_soak(slot: &Weak<RefCell<Option<WaitState>>>, status: Option<&dyn StatusSink>, eventtime: f64) -> WaitPoll {
    let Some(slot) = slot.upgrade() else {
        return WaitPoll::Failed("heat soak estimator is gone".to_string());
    };
    let mut slot = slot.borrow_mut();
    let Some(state) = slot.as_mut() else {
        return WaitPoll::Failed("heat soak state was cleared".to_string());
    };
    let Some(start_time) = state.start_time else {
        state.start_time = Some(eventtime);
        return WaitPoll::Pending;
    };

    let remaining = (state.estimated_sec - (eventtime - start_time)).round_ties_even() as i64;
    state.remaining_sec = Some(remaining);
    if remaining <= 0 {
        tracing::info!("[heat_soak] {} soak complete", state.zone);
        *slot = None;
        if let Some(status) = status {
            status.set_status_text("");
        }
        return WaitPoll::Satisfied;
    }
    if remaining % REPORT_EVERY_SEC == 0 && state.last_report != Some(remaining) {
        state.last_report = Some(remaining);
        tracing::info!("[heat_soak] heat soak {}", remaining);
        if let Some(status) = status {
            status.set_status_text(&format!("Heat soaking {}: {}s left", state.zone, remaining));
        }
    }
    WaitPoll::Pending
}

impl LifecycleHandler for HeatSoakEstimator {
    fn on_ready(&mut self, registry: &mut ObjectRegistry) -> Result<(), HardwareError> {
        tracing::info!("[heat_soak] ready, chamber_sensor={:?}", self.config.chamber_sensor);
        self.bed = Some(registry.heater_sensor(&self.config.bed_heater)?);
        self.extruder = Some(registry.heater_sensor(&self.config.extruder_heater)?);
        if let Some(name) = &self.config.chamber_sensor {
            self.chamber = Some(registry.lookup_sensor(name)?);
        }
        Ok(())
    }

    fn on_shutdown(&mut self, reactor: &mut Reactor) {
        tracing::info!("[heat_soak] shutdown");
        self.cancel(reactor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::fixed::{FixedSensor, RecordingHeater};
    use crate::scheduler::{ManualClock, WaitStatus};
    use crate::status::DisplayStatus;

    struct Fixture {
        clock: Rc<ManualClock>,
        reactor: Reactor,
        bed: Rc<RecordingHeater>,
        chamber: Rc<FixedSensor>,
        status: Rc<DisplayStatus>,
        soak: HeatSoakEstimator,
    }

    fn fixture(chamber: bool) -> Fixture {
        let clock = Rc::new(ManualClock::new(0.0));
        let reactor = Reactor::new(clock.clone());
        let bed = Rc::new(RecordingHeater::new(20.0));
        let chamber_sensor = Rc::new(FixedSensor::new(25.0));
        let mut registry = ObjectRegistry::new();
        registry.add_heater("heater_bed", bed.clone());
        registry.add_heater("extruder", Rc::new(RecordingHeater::new(30.0)));
        registry.add_sensor("chamber", chamber_sensor.clone());
        let config = HeatSoakConfig {
            chamber_sensor: chamber.then(|| "chamber".to_string()),
            ..Default::default()
        };
        let status = Rc::new(DisplayStatus::new());
        let mut soak = HeatSoakEstimator::new(&config).with_status(status.clone());
        soak.on_ready(&mut registry).unwrap();
        Fixture { clock, reactor, bed, chamber: chamber_sensor, status, soak }
    }

    fn at(fixture: &mut Fixture, time: f64) {
        fixture.clock.set(time);
        fixture.reactor.run_pending();
    }

    #[test]
    fn wait_requires_baseline() {
        let mut f = fixture(false);
        assert_eq!(
            f.soak.wait(&mut f.reactor, SoakZone::Bed, 60.0, None).err(),
            Some(SoakError::BaselineMissing)
        );
        assert!(!f.soak.is_waiting());
        assert_eq!(f.reactor.timer_count(), 0);
    }

    #[test]
    fn baseline_captures_enabled_zones() {
        let mut f = fixture(false);
        let readings = f.soak.capture_baseline(&f.reactor).unwrap();
        assert_eq!(readings, vec![(SoakZone::Bed, 20.0), (SoakZone::Extruder, 30.0)]);
        assert_eq!(f.soak.baseline(SoakZone::Chamber), None);

        let mut f = fixture(true);
        f.soak.capture_baseline(&f.reactor).unwrap();
        assert_eq!(f.soak.baseline(SoakZone::Chamber), Some(25.0));
    }

    #[test]
    fn chamber_requires_sensor() {
        let mut f = fixture(false);
        f.soak.capture_baseline(&f.reactor).unwrap();
        assert_eq!(
            f.soak.wait(&mut f.reactor, SoakZone::Chamber, 60.0, None).err(),
            Some(SoakError::ChamberDisabled)
        );
    }

    #[test]
    fn zero_baseline_counts_as_captured() {
        let mut f = fixture(false);
        f.bed.set_current(0.0);
        f.soak.capture_baseline(&f.reactor).unwrap();
        assert!(f.soak.wait(&mut f.reactor, SoakZone::Bed, 1.0, None).is_ok());
    }

    #[test]
    fn non_positive_estimate_returns_immediately() {
        let mut f = fixture(false);
        f.soak.capture_baseline(&f.reactor).unwrap();
        let outcome = f.soak.wait(&mut f.reactor, SoakZone::Bed, 20.0, None).unwrap();
        assert!(matches!(outcome, SoakOutcome::AlreadySoaked { estimated_sec } if estimated_sec == 0.0));
        assert!(!f.soak.is_waiting());
        assert_eq!(f.reactor.timer_count(), 0);
    }

    #[test]
    fn bed_soak_takes_estimated_time() {
        let mut f = fixture(false);
        f.soak.capture_baseline(&f.reactor).unwrap();
        let SoakOutcome::Waiting { handle, estimated_sec } =
            f.soak.wait(&mut f.reactor, SoakZone::Bed, 60.0, None).unwrap()
        else {
            panic!("expected a wait");
        };
        assert_eq!(estimated_sec, 640.0);

        at(&mut f, 0.0);
        assert_eq!(f.soak.progress().unwrap().start_time, Some(0.0));
        assert_eq!(handle.status(), WaitStatus::Pending);
        at(&mut f, 639.0);
        assert_eq!(handle.status(), WaitStatus::Pending);
        assert_eq!(f.soak.progress().unwrap().remaining_sec, Some(1));
        at(&mut f, 640.0);
        assert_eq!(handle.status(), WaitStatus::Satisfied);
        assert!(!f.soak.is_waiting());
        assert_eq!(f.status.message(), "");
    }

    #[test]
    fn first_poll_never_completes() {
        let mut f = fixture(false);
        f.soak.capture_baseline(&f.reactor).unwrap();
        let SoakOutcome::Waiting { handle, .. } =
            f.soak.wait(&mut f.reactor, SoakZone::Extruder, 30.002, None).unwrap()
        else {
            panic!("expected a wait");
        };
        at(&mut f, 50.0);
        assert_eq!(handle.status(), WaitStatus::Pending);
        at(&mut f, 51.0);
        assert_eq!(handle.status(), WaitStatus::Satisfied);
    }

    #[test]
    fn start_temp_overrides_baseline() {
        let mut f = fixture(true);
        f.soak.capture_baseline(&f.reactor).unwrap();
        let outcome = f.soak.wait(&mut f.reactor, SoakZone::Chamber, 50.0, Some(40.0)).unwrap();
        assert!(matches!(outcome, SoakOutcome::Waiting { estimated_sec, .. } if estimated_sec == 100.0));
    }

    #[test]
    fn reports_on_ten_second_boundaries() {
        let mut f = fixture(false);
        f.soak.capture_baseline(&f.reactor).unwrap();
        f.soak.wait(&mut f.reactor, SoakZone::Extruder, 70.0, None).unwrap();
        at(&mut f, 0.0);
        at(&mut f, 1.0);
        assert_eq!(f.status.message(), "");
        at(&mut f, 10.0);
        assert_eq!(f.status.message(), "Heat soaking extruder: 10s left");
        at(&mut f, 15.0);
        assert_eq!(f.status.message(), "Heat soaking extruder: 10s left");
    }

    #[test]
    fn second_wait_runs_after_first_completes() {
        let mut f = fixture(false);
        f.soak.capture_baseline(&f.reactor).unwrap();
        f.soak.wait(&mut f.reactor, SoakZone::Extruder, 32.0, None).unwrap();
        assert_eq!(
            f.soak.wait(&mut f.reactor, SoakZone::Extruder, 32.0, None).err(),
            Some(SoakError::WaitInProgress)
        );
        at(&mut f, 0.0);
        at(&mut f, 1.0);
        assert!(!f.soak.is_waiting());
        assert!(f.soak.wait(&mut f.reactor, SoakZone::Extruder, 32.0, None).is_ok());
    }

    #[test]
    fn shutdown_cancels_wait() {
        let mut f = fixture(true);
        f.chamber.set(25.0);
        f.soak.capture_baseline(&f.reactor).unwrap();
        let SoakOutcome::Waiting { handle, .. } =
            f.soak.wait(&mut f.reactor, SoakZone::Chamber, 60.0, None).unwrap()
        else {
            panic!("expected a wait");
        };
        f.soak.on_shutdown(&mut f.reactor);
        assert_eq!(handle.status(), WaitStatus::Cancelled);
        assert!(!f.soak.is_waiting());
        assert_eq!(f.reactor.timer_count(), 0);
    }
}
