#![forbid(unsafe_code)]

//! Cancellation handles.
//!
//! - [`Disposable`]: a shared, clonable handle that runs registered teardown
//!   actions exactly once when disposed.
//! - [`Subscription`]: RAII owner of a `Disposable`. Dropping it disposes.
//!
//! # Invariants
//!
//! 1. `dispose()` is idempotent; teardowns run once, in registration order.
//! 2. A teardown added to an already-disposed handle runs immediately.
//! 3. Teardowns run with no internal borrow held, so they may freely add to
//!    or dispose other handles (including this one).

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

type Teardown = Box<dyn FnOnce()>;

struct DisposableInner {
    disposed: Cell<bool>,
    teardowns: RefCell<Vec<Teardown>>,
}

/// Shared cancellation handle.
///
/// Cloning creates a new handle to the **same** state.
#[derive(Clone)]
pub struct Disposable {
    inner: Rc<DisposableInner>,
}

impl Disposable {
    /// Create a live handle with no teardowns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DisposableInner {
                disposed: Cell::new(false),
                teardowns: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Create a live handle that runs `teardown` when disposed.
    #[must_use]
    pub fn from_fn(teardown: impl FnOnce() + 'static) -> Self {
        let disposable = Self::new();
        disposable.add(teardown);
        disposable
    }

    /// Create a handle that is already disposed.
    #[must_use]
    pub fn disposed() -> Self {
        let disposable = Self::new();
        disposable.inner.disposed.set(true);
        disposable
    }

    /// Whether `dispose()` has been called.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Dispose the handle, running every registered teardown.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let teardowns = std::mem::take(&mut *self.inner.teardowns.borrow_mut());
        for teardown in teardowns {
            teardown();
        }
    }

    /// Register a teardown action.
    pub fn add(&self, teardown: impl FnOnce() + 'static) {
        if self.is_disposed() {
            teardown();
            return;
        }
        self.inner.teardowns.borrow_mut().push(Box::new(teardown));
    }

    /// Dispose `child` when this handle is disposed.
    pub fn add_child(&self, child: Disposable) {
        if child.is_disposed() {
            return;
        }
        self.add(move || child.dispose());
    }

    /// Whether two handles share the same state.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Disposable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .field("teardowns", &self.inner.teardowns.borrow().len())
            .finish()
    }
}

/// RAII guard around a [`Disposable`].
///
/// Dropping the guard disposes the subscription. Call [`forget`](Self::forget)
/// to keep the subscription running until its signal terminates.
#[must_use = "dropping a Subscription disposes it immediately"]
pub struct Subscription {
    disposable: Option<Disposable>,
}

impl Subscription {
    /// Take ownership of `disposable`.
    pub fn new(disposable: Disposable) -> Self {
        Self {
            disposable: Some(disposable),
        }
    }

    /// Whether the subscription has ended, either by disposal or because its
    /// signal terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.disposable
            .as_ref()
            .is_none_or(Disposable::is_disposed)
    }

    /// Dispose now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Release the guard without disposing, returning the underlying handle.
    pub fn forget(mut self) -> Disposable {
        self.disposable.take().unwrap_or_else(Disposable::disposed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(disposable) = self.disposable.take() {
            disposable.dispose();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}
