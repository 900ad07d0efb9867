//! Drives a [`Printer`] either in fast-forwarded simulated time or against
//! the wall clock on a tokio current-thread runtime.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::printer::{Printer, Reply};
use crate::scheduler::{ManualClock, TimeSource};

/// Longest the real-time loop sleeps when nothing is scheduled.
const IDLE_SLEEP: Duration = Duration::from_secs(3600);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    #[error("Commands still pending at {time:.1}s with nothing scheduled")]
    Stalled { time: f64 },
    #[error("Simulated time limit of {limit:.1}s reached with commands pending")]
    TimeLimit { limit: f64 },
}

/// Runs queued commands to completion, jumping `clock` straight to each
/// scheduler deadline. Returns the simulated time at which the queue drained.
pub fn run_fast<F>(printer: &mut Printer, clock: &ManualClock, max_time: f64, mut emit: F) -> Result<f64, DriverError>
where
    F: FnMut(&Reply),
{
    loop {
        for reply in printer.pump() {
            emit(&reply);
        }
        if printer.is_idle() {
            return Ok(clock.monotonic());
        }
        match printer.next_deadline() {
            Some(deadline) if deadline <= max_time => clock.set(deadline),
            Some(_) => return Err(DriverError::TimeLimit { limit: max_time }),
            None => return Err(DriverError::Stalled { time: clock.monotonic() }),
        }
    }
}

/// Real-time loop: sleeps until the next scheduler deadline, feeds incoming
/// lines to the printer and stops on ctrl-c, or once input is closed and
/// every command has finished. The printer is shut down on the way out.
pub async fn run_realtime<F>(printer: &mut Printer, mut lines: mpsc::Receiver<String>, mut emit: F)
where
    F: FnMut(&Reply),
{
    let mut input_open = true;
    loop {
        for reply in printer.pump() {
            emit(&reply);
        }
        if !input_open && printer.is_idle() {
            tracing::info!("Input closed, all commands finished");
            break;
        }

        let sleep_for = printer
            .next_deadline()
            .map(|deadline| Duration::from_secs_f64((deadline - printer.monotonic()).max(0.0)))
            .unwrap_or(IDLE_SLEEP);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
            line = lines.recv(), if input_open => match line {
                Some(line) => printer.submit(line),
                None => input_open = false,
            },
            _ = tokio::time::sleep(sleep_for) => {}
        }
    }
    printer.shutdown();
}
