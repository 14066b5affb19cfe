#![forbid(unsafe_code)]

//! Timer schedulers.
//!
//! A [`Scheduler`] runs a callback once a duration has elapsed. It is the only
//! asynchronous primitive the signal layer depends on, and it is injected
//! rather than global so tests can drive time by hand.
//!
//! - [`VirtualScheduler`]: deterministic clock advanced manually.
//! - [`LoopScheduler`]: wall-clock timer queue pumped by the host event loop.
//!
//! # Invariants
//!
//! 1. Timers fire in due-time order; equal due times fire in scheduling order.
//! 2. A cancelled timer never fires and its action is dropped immediately.
//! 3. Actions run with no internal borrow held, so they may schedule or cancel
//!    other timers.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use web_time::{Duration, Instant};

use crate::disposable::Disposable;
use crate::logging::trace;

/// Runs actions after a delay.
pub trait Scheduler {
    /// Current time according to this scheduler.
    fn now(&self) -> Instant;

    /// Run `action` once `delay` has elapsed. Disposing the returned handle
    /// cancels the timer.
    fn schedule_after(&self, delay: Duration, action: Box<dyn FnOnce()>) -> Disposable;
}

// ---------------------------------------------------------------------------
// Timer queue shared by both schedulers
// ---------------------------------------------------------------------------

type TimerKey = (Instant, u64);

#[derive(Default)]
struct TimerQueueInner {
    entries: RefCell<BTreeMap<TimerKey, Box<dyn FnOnce()>>>,
    next_seq: Cell<u64>,
}

#[derive(Clone, Default)]
struct TimerQueue {
    inner: Rc<TimerQueueInner>,
}

impl TimerQueue {
    fn insert(&self, due: Instant, action: Box<dyn FnOnce()>) -> Disposable {
        let seq = self.inner.next_seq.get();
        self.inner.next_seq.set(seq.wrapping_add(1));
        let key = (due, seq);
        self.inner.entries.borrow_mut().insert(key, action);

        let queue: Weak<TimerQueueInner> = Rc::downgrade(&self.inner);
        Disposable::from_fn(move || {
            if let Some(queue) = queue.upgrade() {
                let removed = queue.entries.borrow_mut().remove(&key);
                drop(removed);
            }
        })
    }

    /// Remove and return the earliest entry due at or before `now`.
    fn pop_due(&self, now: Instant) -> Option<(Instant, Box<dyn FnOnce()>)> {
        let mut entries = self.inner.entries.borrow_mut();
        let key = *entries.keys().next()?;
        if key.0 > now {
            return None;
        }
        entries.remove(&key).map(|action| (key.0, action))
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.inner.entries.borrow().keys().next().map(|key| key.0)
    }

    fn len(&self) -> usize {
        self.inner.entries.borrow().len()
    }
}

// ---------------------------------------------------------------------------
// VirtualScheduler
// ---------------------------------------------------------------------------

/// A manually-advanced scheduler for deterministic tests.
///
/// Time only moves in [`advance`](Self::advance) /
/// [`advance_to`](Self::advance_to) / [`run_until_idle`](Self::run_until_idle).
/// While advancing, the clock steps to each timer's due time before running
/// it, so actions observe the exact time they were scheduled for.
pub struct VirtualScheduler {
    epoch: Instant,
    now: Cell<Instant>,
    queue: TimerQueue,
}

impl VirtualScheduler {
    /// Create a scheduler whose clock starts at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        let epoch = Instant::now();
        Self {
            epoch,
            now: Cell::new(epoch),
            queue: TimerQueue::default(),
        }
    }

    /// Time elapsed on the virtual clock since creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.now.get().duration_since(self.epoch)
    }

    /// Advance the clock by `delta`, firing every timer that falls due.
    ///
    /// Returns the number of timers fired.
    pub fn advance(&self, delta: Duration) -> usize {
        self.advance_to(self.now.get() + delta)
    }

    /// Advance the clock to `target`, firing every timer due at or before it.
    ///
    /// Timers scheduled by fired actions also run if they fall due before
    /// `target`. A `target` in the past leaves the clock unchanged.
    pub fn advance_to(&self, target: Instant) -> usize {
        let mut fired = 0;
        while let Some((due, action)) = self.queue.pop_due(target) {
            if due > self.now.get() {
                self.now.set(due);
            }
            action();
            fired += 1;
        }
        if target > self.now.get() {
            self.now.set(target);
        }
        if fired > 0 {
            trace!(fired, elapsed_us = self.elapsed().as_micros() as u64, "virtual timers fired");
        }
        fired
    }

    /// Fire timers until none remain, jumping the clock to each deadline.
    ///
    /// Does not return if actions keep rescheduling themselves forever.
    pub fn run_until_idle(&self) -> usize {
        let mut fired = 0;
        while let Some(deadline) = self.queue.next_deadline() {
            fired += self.advance_to(deadline);
        }
        fired
    }

    /// Number of timers waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Due time of the earliest pending timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.next_deadline()
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for VirtualScheduler {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn schedule_after(&self, delay: Duration, action: Box<dyn FnOnce()>) -> Disposable {
        self.queue.insert(self.now.get() + delay, action)
    }
}

impl fmt::Debug for VirtualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualScheduler")
            .field("elapsed", &self.elapsed())
            .field("pending", &self.pending())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// LoopScheduler
// ---------------------------------------------------------------------------

/// Wall-clock scheduler pumped by the host event loop.
///
/// The host calls [`run_due`](Self::run_due) on every loop iteration and may
/// sleep until [`next_deadline`](Self::next_deadline) in between.
pub struct LoopScheduler {
    queue: TimerQueue,
}

thread_local! {
    static MAIN_LOOP: Rc<LoopScheduler> = Rc::new(LoopScheduler::new());
}

impl LoopScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            queue: TimerQueue::default(),
        }
    }

    /// The scheduler shared by everything on the current thread.
    ///
    /// View models built without an explicit scheduler use this one; the
    /// thread's event loop is expected to pump it.
    #[must_use]
    pub fn main() -> Rc<LoopScheduler> {
        MAIN_LOOP.with(Rc::clone)
    }

    /// Fire every timer that is due now. Returns the number fired.
    pub fn run_due(&self) -> usize {
        let mut fired = 0;
        let now = Instant::now();
        while let Some((_, action)) = self.queue.pop_due(now) {
            action();
            fired += 1;
        }
        if fired > 0 {
            trace!(fired, "loop timers fired");
        }
        fired
    }

    /// Due time of the earliest pending timer.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.next_deadline()
    }

    /// Time the host may sleep before the next timer is due.
    #[must_use]
    pub fn time_until_next(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Number of timers waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Default for LoopScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for LoopScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule_after(&self, delay: Duration, action: Box<dyn FnOnce()>) -> Disposable {
        self.queue.insert(Instant::now() + delay, action)
    }
}

impl fmt::Debug for LoopScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
