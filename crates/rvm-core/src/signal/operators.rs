#![forbid(unsafe_code)]

//! Signal operators.
//!
//! Every operator returns a new cold [`Signal`]; per-subscription state (the
//! last value seen, the current inner subscription, pending delayed events)
//! lives inside the producer closure, so independent subscribers never share
//! it.

use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::rc::Rc;

use web_time::Duration;

use super::{DelayQueue, Event, Signal};
use crate::disposable::Disposable;
use crate::scheduler::Scheduler;

impl<T: 'static, E: 'static> Signal<T, E> {
    /// Transform every value.
    pub fn map<U: 'static>(&self, f: impl Fn(T) -> U + 'static) -> Signal<U, E> {
        let source = self.clone();
        let f = Rc::new(f);
        Signal::new(move |observer| {
            let (downstream, f) = (observer.clone(), Rc::clone(&f));
            observer.adopt(source.subscribe(move |event| downstream.send(event.map(|v| f(v)))));
        })
    }

    /// Keep only values for which `predicate` holds.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool + 'static) -> Signal<T, E> {
        let source = self.clone();
        let predicate = Rc::new(predicate);
        Signal::new(move |observer| {
            let (downstream, predicate) = (observer.clone(), Rc::clone(&predicate));
            observer.adopt(source.subscribe(move |event| match event {
                Event::Next(value) if !predicate(&value) => {}
                event => downstream.send(event),
            }));
        })
    }

    /// Drop values equal to the previous value of the same subscription.
    pub fn distinct_until_changed(&self) -> Signal<T, E>
    where
        T: Clone + PartialEq,
    {
        let source = self.clone();
        Signal::new(move |observer| {
            let downstream = observer.clone();
            let mut last: Option<T> = None;
            observer.adopt(source.subscribe(move |event| match event {
                Event::Next(value) => {
                    if last.as_ref() != Some(&value) {
                        last = Some(value.clone());
                        downstream.send_next(value);
                    }
                }
                event => downstream.send(event),
            }));
        })
    }

    /// Send `value` to each subscriber before anything from this signal.
    pub fn start_with(&self, value: T) -> Signal<T, E>
    where
        T: Clone,
    {
        self.start_with_fn(move || Some(value.clone()))
    }

    /// Send the value computed by `initial`, if any, to each subscriber at
    /// the moment it subscribes, before anything from this signal.
    pub fn start_with_fn(&self, initial: impl Fn() -> Option<T> + 'static) -> Signal<T, E> {
        let source = self.clone();
        Signal::new(move |observer| {
            if let Some(value) = initial() {
                observer.send_next(value);
            }
            if !observer.is_closed() {
                source.forward_to(observer);
            }
        })
    }

    /// Forward events until `trigger` sends a value or completes, then
    /// complete.
    ///
    /// The trigger is subscribed first, so a trigger that fires synchronously
    /// prevents this signal from being subscribed at all. Trigger errors are
    /// ignored.
    pub fn take_until<U: 'static, F: 'static>(&self, trigger: &Signal<U, F>) -> Signal<T, E> {
        let source = self.clone();
        let trigger = trigger.clone();
        Signal::new(move |observer| {
            let done = observer.clone();
            observer.adopt(trigger.subscribe(move |event| match event {
                Event::Next(_) | Event::Completed => done.send_completed(),
                Event::Error(_) => {}
            }));
            if !observer.is_closed() {
                source.forward_to(observer);
            }
        })
    }

    /// Map each value to a signal and forward only the latest one.
    ///
    /// On every value the previous inner subscription is disposed **before**
    /// the next one is made, so at most one inner subscription is ever live.
    /// Inner completion is not terminal; the result completes once this
    /// signal has completed and no inner subscription is live. Errors from
    /// either side are terminal.
    pub fn switch_map_latest<U: 'static>(
        &self,
        f: impl Fn(T) -> Signal<U, E> + 'static,
    ) -> Signal<U, E> {
        let source = self.clone();
        let f = Rc::new(f);
        Signal::new(move |observer| {
            let current: Rc<RefCell<Option<Disposable>>> = Rc::new(RefCell::new(None));
            let outer_done = Rc::new(Cell::new(false));

            let slot = Rc::clone(&current);
            observer.add_teardown(move || {
                let inner = slot.borrow_mut().take();
                if let Some(inner) = inner {
                    inner.dispose();
                }
            });

            let downstream = observer.clone();
            let f = Rc::clone(&f);
            let slot = Rc::clone(&current);
            let done = Rc::clone(&outer_done);
            observer.adopt(source.subscribe(move |event| match event {
                Event::Next(value) => {
                    let previous = slot.borrow_mut().take();
                    if let Some(previous) = previous {
                        previous.dispose();
                    }
                    let inner_signal = f(value);
                    let forward = downstream.clone();
                    let outer_done = Rc::clone(&done);
                    let inner = inner_signal
                        .subscribe(move |event| match event {
                            Event::Next(v) => forward.send_next(v),
                            Event::Error(e) => forward.send_error(e),
                            Event::Completed => {
                                if outer_done.get() {
                                    forward.send_completed();
                                }
                            }
                        })
                        .forget();
                    if !inner.is_disposed() {
                        *slot.borrow_mut() = Some(inner);
                    }
                }
                Event::Error(e) => downstream.send_error(e),
                Event::Completed => {
                    done.set(true);
                    let live = slot.borrow().as_ref().is_some_and(|d| !d.is_disposed());
                    if !live {
                        downstream.send_completed();
                    }
                }
            }));
        })
    }

    /// Shift every value and the completion by `interval`. Errors are
    /// delivered immediately and discard anything still pending.
    pub fn delay(&self, interval: Duration, scheduler: Rc<dyn Scheduler>) -> Signal<T, E> {
        let source = self.clone();
        Signal::new(move |observer| {
            let queue = DelayQueue::new(observer.clone(), Rc::clone(&scheduler), interval);
            let on_teardown = queue.clone();
            observer.add_teardown(move || on_teardown.cancel());
            let downstream = observer.clone();
            observer.adopt(source.subscribe(move |event| match event {
                Event::Error(e) => {
                    queue.cancel();
                    downstream.send_error(e);
                }
                event => queue.push(event),
            }));
        })
    }

    /// Run `action` once whenever a subscription ends, whether by
    /// termination or disposal.
    pub fn on_dispose(&self, action: impl Fn() + 'static) -> Signal<T, E> {
        let source = self.clone();
        let action = Rc::new(action);
        Signal::new(move |observer| {
            let action = Rc::clone(&action);
            observer.add_teardown(move || action());
            source.forward_to(observer);
        })
    }
}

impl<T: 'static> Signal<T, Infallible> {
    /// Widen a signal that cannot fail to any error type.
    pub fn promote_err<E: 'static>(&self) -> Signal<T, E> {
        let source = self.clone();
        Signal::new(move |observer| {
            let downstream = observer.clone();
            observer.adopt(source.subscribe(move |event| {
                downstream.send(event.map_err(|never| match never {}));
            }));
        })
    }
}
