#![forbid(unsafe_code)]

//! The push side of a subscription.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use super::Event;
use crate::disposable::{Disposable, Subscription};

type Sink<T, E> = Box<dyn FnMut(Event<T, E>)>;

struct ObserverInner<T, E> {
    sink: RefCell<Option<Sink<T, E>>>,
    queue: RefCell<VecDeque<Event<T, E>>>,
    delivering: Cell<bool>,
    terminated: Cell<bool>,
    disposable: Disposable,
}

/// The sink a producer pushes events into.
///
/// Cloning creates a new handle to the **same** subscriber.
///
/// # Invariants
///
/// 1. Delivery is serialized: an event sent while the sink is already running
///    (a re-entrant send) is queued and delivered right after the current
///    one, so events arrive in send order and the sink is never re-entered.
/// 2. At most one terminal event (`Error` or `Completed`) is delivered;
///    everything sent after it is ignored.
/// 3. Delivering a terminal event disposes the subscription.
/// 4. Once the subscription is disposed nothing more is delivered and the
///    sink (with everything it captured) is dropped.
pub struct Observer<T, E> {
    inner: Rc<ObserverInner<T, E>>,
}

impl<T, E> Clone for Observer<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static, E: 'static> Observer<T, E> {
    pub(crate) fn new(sink: impl FnMut(Event<T, E>) + 'static, disposable: Disposable) -> Self {
        let observer = Self {
            inner: Rc::new(ObserverInner {
                sink: RefCell::new(Some(Box::new(sink))),
                queue: RefCell::new(VecDeque::new()),
                delivering: Cell::new(false),
                terminated: Cell::new(false),
                disposable,
            }),
        };

        // Release the sink's captures as soon as the subscription goes away.
        // If the sink is running right now, the delivery loop drops it instead.
        let weak = Rc::downgrade(&observer.inner);
        observer.inner.disposable.add(move || {
            if let Some(inner) = weak.upgrade() {
                let queued = std::mem::take(&mut *inner.queue.borrow_mut());
                drop(queued);
                let sink = inner.sink.try_borrow_mut().ok().and_then(|mut s| s.take());
                drop(sink);
            }
        });
        observer
    }

    /// Deliver an event.
    pub fn send(&self, event: Event<T, E>) {
        let inner = &*self.inner;
        if inner.terminated.get() || inner.disposable.is_disposed() {
            return;
        }
        if event.is_terminal() {
            inner.terminated.set(true);
        }
        inner.queue.borrow_mut().push_back(event);
        if inner.delivering.replace(true) {
            return;
        }

        loop {
            let next = inner.queue.borrow_mut().pop_front();
            let Some(event) = next else { break };
            let terminal = event.is_terminal();
            {
                let mut sink = inner.sink.borrow_mut();
                if let Some(sink) = sink.as_mut() {
                    sink(event);
                }
            }
            if terminal || inner.disposable.is_disposed() {
                let queued = std::mem::take(&mut *inner.queue.borrow_mut());
                drop(queued);
                let sink = inner.sink.borrow_mut().take();
                drop(sink);
                if terminal {
                    inner.disposable.dispose();
                }
                break;
            }
        }
        inner.delivering.set(false);
    }

    /// Deliver a value.
    pub fn send_next(&self, value: T) {
        self.send(Event::Next(value));
    }

    /// Terminate with an error.
    pub fn send_error(&self, error: E) {
        self.send(Event::Error(error));
    }

    /// Terminate successfully.
    pub fn send_completed(&self) {
        self.send(Event::Completed);
    }

    /// Whether this subscriber will ignore further events.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.terminated.get() || self.inner.disposable.is_disposed()
    }

    /// The subscription's cancellation handle.
    #[must_use]
    pub fn disposable(&self) -> &Disposable {
        &self.inner.disposable
    }

    /// Run `teardown` when the subscription ends.
    pub fn add_teardown(&self, teardown: impl FnOnce() + 'static) {
        self.inner.disposable.add(teardown);
    }

    /// Tie an upstream subscription to this subscriber's lifetime.
    pub fn adopt(&self, subscription: Subscription) {
        self.inner.disposable.add_child(subscription.forget());
    }
}

impl<T, E> fmt::Debug for Observer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("terminated", &self.inner.terminated.get())
            .field("disposed", &self.inner.disposable.is_disposed())
            .finish()
    }
}
