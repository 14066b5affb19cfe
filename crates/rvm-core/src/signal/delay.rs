#![forbid(unsafe_code)]

//! Order-preserving time delay for events.
//!
//! [`DelayQueue`] holds events for a fixed interval before delivering them to
//! an observer. It never drops, samples or coalesces: every pushed event is
//! eventually delivered, in push order, unless the queue is cancelled.
//!
//! # Invariants
//!
//! 1. Delivery order equals push order.
//! 2. At most one timer is armed at a time, for the head of the queue.
//! 3. [`flush`](DelayQueue::flush) delivers everything pending immediately and
//!    disarms the timer.
//! 4. [`cancel`](DelayQueue::cancel) drops everything pending and disarms the
//!    timer; nothing is delivered afterwards.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use web_time::{Duration, Instant};

use super::{Event, Observer};
use crate::disposable::Disposable;
use crate::scheduler::Scheduler;

struct DelayState<T, E> {
    pending: VecDeque<(Instant, Event<T, E>)>,
    timer: Option<Disposable>,
    cancelled: bool,
}

struct DelayInner<T, E> {
    state: RefCell<DelayState<T, E>>,
    observer: Observer<T, E>,
    scheduler: Rc<dyn Scheduler>,
    interval: Duration,
}

/// A FIFO of events released to an observer after a fixed interval.
///
/// Cloning creates a new handle to the **same** queue.
pub struct DelayQueue<T, E> {
    inner: Rc<DelayInner<T, E>>,
}

impl<T, E> Clone for DelayQueue<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static, E: 'static> DelayQueue<T, E> {
    /// Create a queue delivering into `observer` after `interval`.
    pub fn new(observer: Observer<T, E>, scheduler: Rc<dyn Scheduler>, interval: Duration) -> Self {
        Self {
            inner: Rc::new(DelayInner {
                state: RefCell::new(DelayState {
                    pending: VecDeque::new(),
                    timer: None,
                    cancelled: false,
                }),
                observer,
                scheduler,
                interval,
            }),
        }
    }

    /// The fixed delay applied to every event.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Number of events waiting for delivery.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    /// Whether nothing is waiting for delivery.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().pending.is_empty()
    }

    /// Enqueue `event`, due one interval from now.
    pub fn push(&self, event: Event<T, E>) {
        let due = self.inner.scheduler.now() + self.inner.interval;
        let arm = {
            let mut state = self.inner.state.borrow_mut();
            if state.cancelled {
                return;
            }
            state.pending.push_back((due, event));
            state.timer.is_none()
        };
        if arm {
            self.arm(self.inner.interval);
        }
    }

    /// Deliver everything pending now, in order.
    pub fn flush(&self) {
        self.disarm();
        while let Some(event) = self.pop_if(|_| true) {
            self.inner.observer.send(event);
        }
    }

    /// Drop everything pending and disarm the timer. Permanent.
    pub fn cancel(&self) {
        let dropped = {
            let mut state = self.inner.state.borrow_mut();
            state.cancelled = true;
            std::mem::take(&mut state.pending)
        };
        drop(dropped);
        self.disarm();
    }

    fn pop_if(&self, due: impl Fn(Instant) -> bool) -> Option<Event<T, E>> {
        let mut state = self.inner.state.borrow_mut();
        match state.pending.front() {
            Some((at, _)) if due(*at) => state.pending.pop_front().map(|(_, event)| event),
            _ => None,
        }
    }

    fn disarm(&self) {
        let timer = self.inner.state.borrow_mut().timer.take();
        if let Some(timer) = timer {
            timer.dispose();
        }
    }

    fn arm(&self, after: Duration) {
        let weak: Weak<DelayInner<T, E>> = Rc::downgrade(&self.inner);
        let timer = self.inner.scheduler.schedule_after(
            after,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    DelayQueue { inner }.fire();
                }
            }),
        );
        let mut state = self.inner.state.borrow_mut();
        if state.cancelled {
            drop(state);
            timer.dispose();
            return;
        }
        state.timer = Some(timer);
    }

    fn fire(&self) {
        self.inner.state.borrow_mut().timer = None;
        let now = self.inner.scheduler.now();
        while let Some(event) = self.pop_if(|at| at <= now) {
            self.inner.observer.send(event);
        }
        let next_due = {
            let state = self.inner.state.borrow();
            if state.timer.is_some() || state.cancelled {
                None
            } else {
                state.pending.front().map(|(at, _)| *at)
            }
        };
        if let Some(at) = next_due {
            self.arm(at.saturating_duration_since(now));
        }
    }
}

impl<T, E> fmt::Debug for DelayQueue<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("DelayQueue")
            .field("interval", &self.inner.interval)
            .field("pending", &state.pending.len())
            .field("armed", &state.timer.is_some())
            .field("cancelled", &state.cancelled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disposable::Disposable;
    use crate::scheduler::VirtualScheduler;
    use std::convert::Infallible;

    fn setup(
        interval_ms: u64,
    ) -> (
        Rc<VirtualScheduler>,
        DelayQueue<u32, Infallible>,
        Rc<RefCell<Vec<(u64, Event<u32, Infallible>)>>>,
    ) {
        let scheduler = Rc::new(VirtualScheduler::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        let (clock, sink) = (Rc::clone(&scheduler), Rc::clone(&log));
        let observer = Observer::new(
            move |e| {
                sink.borrow_mut()
                    .push((clock.elapsed().as_millis() as u64, e));
            },
            Disposable::new(),
        );
        let queue = DelayQueue::new(
            observer,
            Rc::clone(&scheduler) as Rc<dyn Scheduler>,
            Duration::from_millis(interval_ms),
        );
        (scheduler, queue, log)
    }

    #[test]
    fn events_released_after_interval_in_order() {
        let (s, q, log) = setup(100);
        q.push(Event::Next(1));
        s.advance(Duration::from_millis(10));
        q.push(Event::Next(2));
        s.advance(Duration::from_millis(89));
        assert!(log.borrow().is_empty());
        s.advance(Duration::from_millis(1));
        assert_eq!(*log.borrow(), vec![(100, Event::Next(1))]);
        s.advance(Duration::from_millis(10));
        assert_eq!(
            *log.borrow(),
            vec![(100, Event::Next(1)), (110, Event::Next(2))]
        );
        assert!(q.is_empty());
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn flush_delivers_immediately_and_disarms() {
        let (s, q, log) = setup(1000);
        q.push(Event::Next(1));
        q.push(Event::Next(2));
        assert_eq!(q.len(), 2);
        q.flush();
        assert_eq!(
            *log.borrow(),
            vec![(0, Event::Next(1)), (0, Event::Next(2))]
        );
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn cancel_drops_pending() {
        let (s, q, log) = setup(100);
        q.push(Event::Next(1));
        q.cancel();
        q.push(Event::Next(2));
        s.advance(Duration::from_secs(1));
        assert!(log.borrow().is_empty());
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn completion_is_delayed_behind_values() {
        let (s, q, log) = setup(50);
        q.push(Event::Next(7));
        q.push(Event::Completed);
        s.advance(Duration::from_millis(50));
        assert_eq!(
            *log.borrow(),
            vec![(50, Event::Next(7)), (50, Event::Completed)]
        );
    }
}
