#![forbid(unsafe_code)]

//! Hot multicast source.

use std::cell::RefCell;
use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

use super::{Event, Observer, Signal};

struct SubjectInner<T, E> {
    observers: RefCell<Vec<Observer<T, E>>>,
    terminal: RefCell<Option<Event<T, E>>>,
}

/// A hot source that multicasts every event to its current subscribers.
///
/// Subscribers only see events sent after they subscribed. Subscribing after
/// the subject terminated delivers the terminal event immediately.
///
/// Closed subscribers are pruned lazily, on the next send or subscribe.
pub struct Subject<T, E = Infallible> {
    inner: Rc<SubjectInner<T, E>>,
}

impl<T, E> Clone for Subject<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Subject<T, E> {
    /// Create a subject with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SubjectInner {
                observers: RefCell::new(Vec::new()),
                terminal: RefCell::new(None),
            }),
        }
    }

    /// The subscribable side of this subject.
    #[must_use]
    pub fn signal(&self) -> Signal<T, E> {
        let inner = Rc::clone(&self.inner);
        Signal::new(move |observer| {
            let terminal = inner.terminal.borrow().clone();
            if let Some(terminal) = terminal {
                observer.send(terminal);
                return;
            }
            let mut observers = inner.observers.borrow_mut();
            observers.retain(|o| !o.is_closed());
            observers.push(observer.clone());
        })
    }

    /// Multicast a value.
    pub fn send_next(&self, value: T) {
        for observer in self.live_observers() {
            observer.send_next(value.clone());
        }
    }

    /// Multicast an error and terminate.
    pub fn send_error(&self, error: E) {
        self.terminate(Event::Error(error));
    }

    /// Multicast completion and terminate.
    pub fn send_completed(&self) {
        self.terminate(Event::Completed);
    }

    /// Number of subscribers that can still receive events.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .observers
            .borrow()
            .iter()
            .filter(|o| !o.is_closed())
            .count()
    }

    /// Whether the subject has terminated.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.inner.terminal.borrow().is_some()
    }

    fn live_observers(&self) -> Vec<Observer<T, E>> {
        let mut observers = self.inner.observers.borrow_mut();
        observers.retain(|o| !o.is_closed());
        observers.clone()
    }

    fn terminate(&self, event: Event<T, E>) {
        if self.is_terminated() {
            return;
        }
        *self.inner.terminal.borrow_mut() = Some(event.clone());
        let observers = std::mem::take(&mut *self.inner.observers.borrow_mut());
        for observer in observers {
            observer.send(event.clone());
        }
    }
}

impl<T: Clone + 'static, E: Clone + 'static> Default for Subject<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for Subject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("observers", &self.inner.observers.borrow().len())
            .field("terminated", &self.inner.terminal.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::record;
    use super::*;

    #[test]
    fn multicasts_to_all_subscribers() {
        let subject: Subject<u8> = Subject::new();
        let (a, _sa) = record(&subject.signal());
        let (b, _sb) = record(&subject.signal());
        subject.send_next(1);
        assert_eq!(*a.borrow(), vec![Event::Next(1)]);
        assert_eq!(*b.borrow(), vec![Event::Next(1)]);
    }

    #[test]
    fn late_subscriber_misses_earlier_values() {
        let subject: Subject<u8> = Subject::new();
        subject.send_next(1);
        let (log, _sub) = record(&subject.signal());
        subject.send_next(2);
        assert_eq!(*log.borrow(), vec![Event::Next(2)]);
    }

    #[test]
    fn terminal_replayed_to_late_subscribers() {
        let subject: Subject<u8, String> = Subject::new();
        subject.send_error("gone".to_string());
        let (log, sub) = record(&subject.signal());
        assert_eq!(*log.borrow(), vec![Event::Error("gone".to_string())]);
        assert!(sub.is_closed());
        subject.send_completed();
        assert!(subject.is_terminated());
    }

    #[test]
    fn disposed_subscribers_are_pruned() {
        let subject: Subject<u8> = Subject::new();
        let (_log, sub) = record(&subject.signal());
        assert_eq!(subject.subscriber_count(), 1);
        drop(sub);
        assert_eq!(subject.subscriber_count(), 0);
        subject.send_next(1);
        assert!(subject.inner.observers.borrow().is_empty());
    }

    #[test]
    fn subscriber_added_during_send_waits_for_next_value() {
        let subject: Subject<u8> = Subject::new();
        let late = Rc::new(RefCell::new(Vec::new()));
        let held = Rc::new(RefCell::new(Vec::new()));
        let (src, late_log, keep) = (subject.clone(), Rc::clone(&late), Rc::clone(&held));
        let _sub = subject.signal().subscribe_next(move |v| {
            if v == 1 {
                let log = Rc::clone(&late_log);
                keep.borrow_mut()
                    .push(src.signal().subscribe_next(move |v| log.borrow_mut().push(v)));
            }
        });
        subject.send_next(1);
        subject.send_next(2);
        assert_eq!(*late.borrow(), vec![2]);
        held.borrow_mut().clear();
    }
}
