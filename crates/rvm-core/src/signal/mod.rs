#![forbid(unsafe_code)]

//! Push-based signals.
//!
//! A [`Signal<T, E>`] is a cold description of a stream: every
//! [`subscribe`](Signal::subscribe) runs its producer anew against a fresh
//! [`Observer`]. A stream delivers any number of `Next` values followed by at
//! most one terminal event (`Error` or `Completed`).
//!
//! # Architecture
//!
//! Signals use `Rc` for single-threaded shared ownership. A producer registers
//! its cleanup on the observer's [`Disposable`]; operators subscribe upstream
//! and [`adopt`](Observer::adopt) the upstream subscription, so disposing the
//! outermost subscription tears down the whole chain.
//!
//! # Invariants
//!
//! 1. Events reach a subscriber in the order they were sent.
//! 2. Nothing is delivered after a terminal event or after disposal.
//! 3. A terminal event disposes the subscription and everything it adopted.
//! 4. Dropping the [`Subscription`] returned by `subscribe` disposes it.

mod delay;
mod observer;
mod operators;
mod subject;

use std::convert::Infallible;
use std::fmt;
use std::rc::Rc;

pub use delay::DelayQueue;
pub use observer::Observer;
pub use subject::Subject;

use crate::disposable::{Disposable, Subscription};

/// A single notification on a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T, E> {
    /// A value.
    Next(T),
    /// Terminal failure.
    Error(E),
    /// Terminal success.
    Completed,
}

impl<T, E> Event<T, E> {
    /// Whether this event ends the stream.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Next(_))
    }

    /// Transform the value of a `Next` event.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U, E> {
        match self {
            Self::Next(value) => Event::Next(f(value)),
            Self::Error(error) => Event::Error(error),
            Self::Completed => Event::Completed,
        }
    }

    /// Transform the error of an `Error` event.
    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> Event<T, F> {
        match self {
            Self::Next(value) => Event::Next(value),
            Self::Error(error) => Event::Error(f(error)),
            Self::Completed => Event::Completed,
        }
    }

    /// The value of a `Next` event.
    #[must_use]
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Next(value) => Some(value),
            _ => None,
        }
    }
}

type Producer<T, E> = dyn Fn(&Observer<T, E>);

/// A cold, clonable stream description.
///
/// Cloning shares the producer; each subscription still runs it separately.
pub struct Signal<T, E = Infallible> {
    producer: Rc<Producer<T, E>>,
    name: Option<Rc<str>>,
}

impl<T, E> Clone for Signal<T, E> {
    fn clone(&self) -> Self {
        Self {
            producer: Rc::clone(&self.producer),
            name: self.name.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Signal<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name.as_deref().unwrap_or("<anonymous>"))
            .finish()
    }
}

impl<T: 'static, E: 'static> Signal<T, E> {
    /// Create a signal from a producer.
    ///
    /// The producer runs once per subscription. It pushes events into the
    /// observer (synchronously or later) and registers any cleanup with
    /// [`Observer::add_teardown`] or [`Observer::adopt`].
    pub fn new(producer: impl Fn(&Observer<T, E>) + 'static) -> Self {
        Self {
            producer: Rc::new(producer),
            name: None,
        }
    }

    /// A signal that never sends anything.
    #[must_use]
    pub fn never() -> Self {
        Self::new(|_| {})
    }

    /// A signal that completes immediately.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(|observer| observer.send_completed())
    }

    /// A signal that sends `value` and completes.
    pub fn single(value: T) -> Self
    where
        T: Clone,
    {
        Self::new(move |observer| {
            observer.send_next(value.clone());
            observer.send_completed();
        })
    }

    /// A signal that fails immediately with `error`.
    pub fn error(error: E) -> Self
    where
        E: Clone,
    {
        Self::new(move |observer| observer.send_error(error.clone()))
    }

    /// A signal that sends every item of `items` and completes.
    pub fn from_values<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Clone,
    {
        let items: Rc<[T]> = items.into_iter().collect();
        Self::new(move |observer| {
            for item in items.iter() {
                if observer.is_closed() {
                    return;
                }
                observer.send_next(item.clone());
            }
            observer.send_completed();
        })
    }

    /// Attach a name used in log output.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Rc::from(name.into()));
        self
    }

    /// The name attached with [`named`](Self::named).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Subscribe with a callback receiving every event.
    pub fn subscribe(&self, sink: impl FnMut(Event<T, E>) + 'static) -> Subscription {
        let disposable = Disposable::new();
        let observer = Observer::new(sink, disposable.clone());
        (self.producer)(&observer);
        Subscription::new(disposable)
    }

    /// Subscribe to values only, ignoring termination.
    pub fn subscribe_next(&self, mut on_next: impl FnMut(T) + 'static) -> Subscription {
        self.subscribe(move |event| {
            if let Event::Next(value) = event {
                on_next(value);
            }
        })
    }

    /// Subscribe `downstream` to every event of this signal, tying the
    /// upstream subscription to `downstream`'s lifetime.
    pub fn forward_to(&self, downstream: &Observer<T, E>) {
        let target = downstream.clone();
        downstream.adopt(self.subscribe(move |event| target.send(event)));
    }
}
