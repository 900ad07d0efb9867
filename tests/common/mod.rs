// Shared setup for integration tests: a printer backed by the simulated rig.
#![allow(dead_code)]

use std::rc::Rc;

use chamber_rs::scheduler::ManualClock;
use chamber_rs::{Config, Printer, Reply};

pub const RIG_CONFIG: &str = r#"
[printer]
name = "test-rig"

[chamber_heater.chamber]
sensor = "chamber"
heater = "chamber_heater"
max_temp = 110.0

[heat_soak]
chamber_sensor = "chamber"

[simulation]
ambient = 22.0

[simulation.heaters.chamber_heater]
[simulation.heaters.heater_bed]
[simulation.heaters.extruder]

[simulation.sensors.chamber]
follows = "chamber_heater"
"#;

pub fn simulated_printer(config: &str) -> (Printer, Rc<ManualClock>) {
    let config = Config::from_toml_str(config).unwrap();
    let clock = Rc::new(ManualClock::new(0.0));
    let mut printer = Printer::new(config, clock.clone());
    printer.attach_simulation(None).unwrap();
    printer.start().unwrap();
    (printer, clock)
}

pub fn chamber_temp(printer: &Printer) -> f64 {
    printer.rig().unwrap().borrow().sensor("chamber").unwrap().measured
}

pub fn heater_setpoint(printer: &Printer, name: &str) -> f64 {
    printer.rig().unwrap().borrow().heater(name).unwrap().setpoint
}

/// Steps simulated time to `until`, firing every timer on the way.
pub fn advance_to(printer: &mut Printer, clock: &ManualClock, until: f64) -> Vec<Reply> {
    let mut replies = Vec::new();
    while let Some(deadline) = printer.next_deadline() {
        if deadline > until {
            break;
        }
        clock.set(deadline);
        replies.extend(printer.pump());
    }
    clock.set(until);
    replies.extend(printer.pump());
    replies
}

pub fn command(printer: &mut Printer, line: &str) -> Vec<Reply> {
    printer.submit(line);
    printer.pump()
}

pub fn infos(replies: &[Reply]) -> Vec<String> {
    replies
        .iter()
        .filter_map(|reply| match reply {
            Reply::Info(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn errors(replies: &[Reply]) -> Vec<String> {
    replies
        .iter()
        .filter_map(|reply| match reply {
            Reply::Error(message) => Some(message.clone()),
            _ => None,
        })
        .collect()
}
