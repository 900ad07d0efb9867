//! Single-threaded timer scheduler.
//!
//! Timers live in a min-heap keyed by wake time. A callback receives the
//! event time it fired at and either asks to be woken again or finishes.
//! Cooperative waits are timers that poll a predicate every
//! [`WAIT_POLL_INTERVAL`] seconds until it is satisfied.
//!
//! Callbacks never receive the scheduler itself: anything they need is
//! captured, and owners hand out only weak references so a torn-down
//! component is never called back into.

pub mod time_interface;
pub mod wait;

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::rc::Rc;

pub use time_interface::{ManualClock, MonotonicClock, TimeSource};
pub use wait::{WAIT_POLL_INTERVAL, WaitHandle, WaitPoll, WaitStatus};

/// What a timer callback wants next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimerOutcome {
    Reschedule(f64),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

type TimerCallback = Box<dyn FnMut(f64) -> TimerOutcome>;

struct TimerEntry {
    seq: u64,
    waketime: f64,
    callback: TimerCallback,
}

#[derive(Debug)]
struct Scheduled {
    waketime: f64,
    seq: u64,
    handle: TimerHandle,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Scheduled {}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Scheduled {
    // Reversed so the BinaryHeap pops the earliest wake time first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .waketime
            .total_cmp(&self.waketime)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

pub struct Reactor {
    clock: Rc<dyn TimeSource>,
    queue: BinaryHeap<Scheduled>,
    timers: HashMap<TimerHandle, TimerEntry>,
    waits: HashMap<TimerHandle, Rc<RefCell<WaitStatus>>>,
    next_id: u64,
    next_seq: u64,
}

impl Reactor {
    pub fn new(clock: Rc<dyn TimeSource>) -> Self {
        Self {
            clock,
            queue: BinaryHeap::new(),
            timers: HashMap::new(),
            waits: HashMap::new(),
            next_id: 0,
            next_seq: 0,
        }
    }

    pub fn monotonic(&self) -> f64 {
        self.clock.monotonic()
    }

    pub fn register_timer<F>(&mut self, waketime: f64, callback: F) -> TimerHandle
    where
        F: FnMut(f64) -> TimerOutcome + 'static,
    {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        let seq = self.push(handle, waketime);
        self.timers.insert(
            handle,
            TimerEntry {
                seq,
                waketime,
                callback: Box::new(callback),
            },
        );
        handle
    }

    /// Stale or unknown handles are ignored.
    pub fn unregister_timer(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle);
        if let Some(status) = self.waits.remove(&handle) {
            cancel_status(&status);
        }
    }

    pub fn is_registered(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Registers `predicate` for polling, first at the next dispatch and then
    /// every [`WAIT_POLL_INTERVAL`] seconds until it stops returning `Pending`.
    pub fn register_wait<F>(&mut self, mut predicate: F) -> WaitHandle
    where
        F: FnMut(f64) -> WaitPoll + 'static,
    {
        let status = Rc::new(RefCell::new(WaitStatus::Pending));
        let slot = status.clone();
        let now = self.monotonic();
        let timer = self.register_timer(now, move |eventtime| match predicate(eventtime) {
            WaitPoll::Pending => TimerOutcome::Reschedule(eventtime + WAIT_POLL_INTERVAL),
            WaitPoll::Satisfied => {
                *slot.borrow_mut() = WaitStatus::Satisfied;
                TimerOutcome::Done
            }
            WaitPoll::Failed(message) => {
                *slot.borrow_mut() = WaitStatus::Failed(message);
                TimerOutcome::Done
            }
        });
        self.waits.insert(timer, status.clone());
        WaitHandle { timer, status }
    }

    pub fn cancel_wait(&mut self, handle: &WaitHandle) {
        self.unregister_timer(handle.timer);
        cancel_status(&handle.status);
    }

    /// Earliest wake time among live timers.
    pub fn next_deadline(&mut self) -> Option<f64> {
        while let Some(top) = self.queue.peek() {
            if self.is_current(top) {
                return Some(top.waketime);
            }
            self.queue.pop();
        }
        None
    }

    /// Fires every timer due at the current time, each at most once, in
    /// wake-time order. Returns the number of callbacks run.
    pub fn run_pending(&mut self) -> usize {
        let now = self.monotonic();
        let mut due = Vec::new();
        while let Some(top) = self.queue.peek() {
            if top.waketime > now {
                break;
            }
            if let Some(item) = self.queue.pop() {
                if self.is_current(&item) {
                    due.push(item.handle);
                }
            }
        }

        let mut fired = 0;
        for handle in due {
            let Some(mut entry) = self.timers.remove(&handle) else {
                continue;
            };
            fired += 1;
            match (entry.callback)(now) {
                TimerOutcome::Reschedule(waketime) => {
                    entry.seq = self.push(handle, waketime);
                    entry.waketime = waketime;
                    self.timers.insert(handle, entry);
                }
                TimerOutcome::Done => {
                    self.waits.remove(&handle);
                }
            }
        }
        fired
    }

    /// Drops every timer; outstanding waits end as cancelled.
    pub fn shutdown(&mut self) {
        tracing::info!("Scheduler shutting down, dropping {} timers", self.timers.len());
        for status in self.waits.values() {
            cancel_status(status);
        }
        self.waits.clear();
        self.timers.clear();
        self.queue.clear();
    }

    fn push(&mut self, handle: TimerHandle, waketime: f64) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Scheduled { waketime, seq, handle });
        seq
    }

    fn is_current(&self, item: &Scheduled) -> bool {
        self.timers
            .get(&item.handle)
            .is_some_and(|entry| entry.seq == item.seq)
    }
}

fn cancel_status(status: &Rc<RefCell<WaitStatus>>) {
    let mut status = status.borrow_mut();
    if !status.is_finished() {
        *status = WaitStatus::Cancelled;
    }
}
