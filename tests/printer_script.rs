// End-to-end runs: config file on disk, scripted commands, CSV trace

mod common;

use std::fs::File;
use std::io::Write;
use std::rc::Rc;

use chamber_rs::config::ConfigError;
use chamber_rs::driver::{DriverError, run_fast};
use chamber_rs::scheduler::ManualClock;
use chamber_rs::{Printer, Reply, load_config};
use chamber_simulator::TraceRecorder;
use common::RIG_CONFIG;

const SCRIPT: &str = "
; warm the enclosure and let the bed soak
HEAT_SOAK_BASELINE
chamber_heat_on temp=40
CHAMBER_HEAT_WAIT
HEAT_SOAK_WAIT FOR=extruder TEMP=30
STATUS
CHAMBER_HEAT_OFF
";

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_script_runs_to_completion_with_trace() {
    let config_file = write_config(RIG_CONFIG);
    let config = load_config(config_file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.printer_name(), "test-rig");

    let dir = tempfile::tempdir().unwrap();
    let trace_path = dir.path().join("trace.csv");
    let trace = TraceRecorder::new(File::create(&trace_path).unwrap()).unwrap();

    let clock = Rc::new(ManualClock::new(0.0));
    let mut printer = Printer::new(config, clock.clone());
    printer.attach_simulation(Some(trace)).unwrap();
    printer.start().unwrap();
    for line in SCRIPT.lines() {
        printer.submit(line);
    }
    let mut replies = Vec::new();
    let finished = run_fast(&mut printer, &clock, 3600.0, |reply| replies.push(reply.clone())).unwrap();
    printer.shutdown();

    assert!(finished > 4.0);
    assert_eq!(replies.iter().filter(|reply| **reply == Reply::Ok).count(), 6);
    assert!(replies.iter().all(|reply| !matches!(reply, Reply::Error(_))));

    let trace = std::fs::read_to_string(&trace_path).unwrap();
    let mut lines = trace.lines();
    assert_eq!(lines.next(), Some("time,name,kind,temperature,setpoint"));
    assert!(trace.contains(",chamber_heater,heater,"));
    assert!(trace.contains(",chamber,sensor,"));
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("printer.toml");
    let err = load_config(missing.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_invalid_config_file() {
    let config_file = write_config("[chamber_heater.chamber]\nsensor = \"c\"\nheater = \"h\"\nmax_temp = -5.0\n");
    let err = load_config(config_file.path().to_str().unwrap()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_unknown_sensor_fails_start() {
    let config = chamber_rs::Config::from_toml_str(&RIG_CONFIG.replace("sensor = \"chamber\"", "sensor = \"attic\"")).unwrap();
    let mut printer = Printer::new(config, Rc::new(ManualClock::new(0.0)));
    printer.attach_simulation(None).unwrap();
    let err = printer.start().unwrap_err();
    assert!(err.to_string().contains("attic"));
    assert!(!printer.is_ready());
}

#[test]
fn test_unsatisfiable_wait_hits_time_limit() {
    let (mut printer, clock) = common::simulated_printer(RIG_CONFIG);
    printer.submit("CHAMBER_HEAT_ON TEMP=105");
    printer.submit("CHAMBER_HEAT_WAIT");
    let result = run_fast(&mut printer, &clock, 600.0, |_| {});
    assert_eq!(result, Err(DriverError::TimeLimit { limit: 600.0 }));
}
