use std::cell::Cell;
use std::time::Instant;

/// Source of the scheduler's monotonic time, in seconds.
pub trait TimeSource {
    fn monotonic(&self) -> f64;
}

/// Wall-clock backed time source, zero at construction.
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn monotonic(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Logical clock stepped explicitly; used for fast-forward runs and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { now: Cell::new(start) }
    }

    pub fn set(&self, now: f64) {
        if now > self.now.get() {
            self.now.set(now);
        }
    }

    pub fn advance(&self, dt: f64) {
        self.set(self.now.get() + dt);
    }
}

impl TimeSource for ManualClock {
    fn monotonic(&self) -> f64 {
        self.now.get()
    }
}
