//! Activation state machine.
//!
//! Holds the `active` flag and the subscribers of the two edge streams plus
//! the deallocation stream. Emission is driven by [`ViewModel::set_active`];
//! this module only does the bookkeeping.
//!
//! # Invariants
//!
//! 1. [`Activation::set`] reports an edge only when the value changes.
//! 2. Subscribers are notified in registration order, from a snapshot taken
//!    when the edge happens; a subscriber registered later is not notified
//!    of that edge (it saw the new state through its own subscribe-time
//!    replay).
//! 3. An edge raised from inside a callback is queued and dispatched after
//!    the edge in flight has reached every subscriber, so all subscribers
//!    see edges in the order they happened.
//! 4. [`Activation::terminate`] completes every subscriber exactly once.
//!
//! [`ViewModel::set_active`]: super::ViewModel::set_active

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;

use rvm_core::Observer;

/// Which stream an observer listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edge {
    BecameActive,
    BecameInactive,
}

impl Edge {
    pub(crate) fn of(active: bool) -> Self {
        if active {
            Self::BecameActive
        } else {
            Self::BecameInactive
        }
    }

    /// Whether a subscriber to this stream gets a replay in state `active`.
    pub(crate) fn replays_when(self, active: bool) -> bool {
        self == Self::of(active)
    }
}

type Observers<T> = RefCell<Vec<Observer<T, Infallible>>>;

pub(crate) struct Activation<T> {
    active: Cell<bool>,
    became_active: Observers<T>,
    became_inactive: Observers<T>,
    deallocated: Observers<()>,
    dispatching: Cell<bool>,
    queued: RefCell<VecDeque<Vec<Observer<T, Infallible>>>>,
}

impl<T: 'static> Activation<T> {
    pub(crate) fn new() -> Self {
        Self {
            active: Cell::new(false),
            became_active: RefCell::new(Vec::new()),
            became_inactive: RefCell::new(Vec::new()),
            deallocated: RefCell::new(Vec::new()),
            dispatching: Cell::new(false),
            queued: RefCell::new(VecDeque::new()),
        }
    }

    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.get()
    }

    /// Store `active`, returning the edge if the value changed.
    pub(crate) fn set(&self, active: bool) -> Option<Edge> {
        (self.active.replace(active) != active).then(|| Edge::of(active))
    }

    fn list(&self, edge: Edge) -> &Observers<T> {
        match edge {
            Edge::BecameActive => &self.became_active,
            Edge::BecameInactive => &self.became_inactive,
        }
    }

    pub(crate) fn register(&self, edge: Edge, observer: Observer<T, Infallible>) {
        let mut list = self.list(edge).borrow_mut();
        list.retain(|o| !o.is_closed());
        list.push(observer);
    }

    pub(crate) fn register_deallocated(&self, observer: Observer<(), Infallible>) {
        let mut list = self.deallocated.borrow_mut();
        list.retain(|o| !o.is_closed());
        list.push(observer);
    }

    /// Live subscribers of `edge`, pruning closed ones.
    pub(crate) fn snapshot(&self, edge: Edge) -> Vec<Observer<T, Infallible>> {
        let mut list = self.list(edge).borrow_mut();
        list.retain(|o| !o.is_closed());
        list.clone()
    }

    /// Queue the subscribers of `edge` for notification. Returns `true` when
    /// the caller must drain the queue with [`next_batch`](Self::next_batch);
    /// `false` when a dispatch further up the stack will deliver it.
    pub(crate) fn enqueue(&self, edge: Edge) -> bool {
        let batch = self.snapshot(edge);
        self.queued.borrow_mut().push_back(batch);
        !self.dispatching.replace(true)
    }

    /// The next queued batch, ending the dispatch once the queue is empty.
    pub(crate) fn next_batch(&self) -> Option<Vec<Observer<T, Infallible>>> {
        let next = self.queued.borrow_mut().pop_front();
        if next.is_none() {
            self.dispatching.set(false);
        }
        next
    }

    /// Number of live subscribers across all three streams.
    pub(crate) fn subscriber_count(&self) -> usize {
        let live = |list: &Observers<T>| list.borrow().iter().filter(|o| !o.is_closed()).count();
        live(&self.became_active)
            + live(&self.became_inactive)
            + self
                .deallocated
                .borrow()
                .iter()
                .filter(|o| !o.is_closed())
                .count()
    }

    /// Complete every subscriber. Deallocation watchers go first so gated
    /// outputs finish before their activation inputs do.
    pub(crate) fn terminate(&self) {
        drop(std::mem::take(&mut *self.queued.borrow_mut()));
        let deallocated = std::mem::take(&mut *self.deallocated.borrow_mut());
        for observer in deallocated {
            observer.send_completed();
        }
        for edge in [Edge::BecameActive, Edge::BecameInactive] {
            let observers = std::mem::take(&mut *self.list(edge).borrow_mut());
            for observer in observers {
                observer.send_completed();
            }
        }
    }
}
