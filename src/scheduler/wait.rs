//! Cooperative waits: predicates re-polled on the scheduler thread.

use std::cell::RefCell;
use std::rc::Rc;

use super::TimerHandle;

/// Pause between predicate polls, seconds.
pub const WAIT_POLL_INTERVAL: f64 = 1.0;

/// Result of a single predicate evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitPoll {
    Pending,
    Satisfied,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitStatus {
    Pending,
    Satisfied,
    Failed(String),
    Cancelled,
}

impl WaitStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, WaitStatus::Pending)
    }
}

/// Caller-side view of a registered wait.
#[derive(Debug, Clone)]
pub struct WaitHandle {
    pub(super) timer: TimerHandle,
    pub(super) status: Rc<RefCell<WaitStatus>>,
}

impl WaitHandle {
    pub fn status(&self) -> WaitStatus {
        self.status.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.status.borrow().is_finished()
    }
}
