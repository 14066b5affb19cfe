//! The view model handle, its hierarchy and its activation streams.
//!
//! # Design
//!
//! [`ViewModel`] is a cheap handle around shared, reference-counted state.
//! Cloning shares the same view model; the view model is dropped with its last
//! handle. Nothing derived from it (activation streams, gated signals, pending
//! timers) holds a strong reference, so subscriptions never keep it alive.
//!
//! Parent links are `Weak`. A child never keeps its parent alive and a parent
//! never learns about its children, so no reference cycle can form through
//! the hierarchy.
//!
//! # Invariants
//!
//! 1. `model` and `parent` are fixed at construction.
//! 2. Setting `active` to its current value emits nothing.
//! 3. Each genuine edge emits exactly once, on exactly one of
//!    [`became_active`](ViewModel::became_active) /
//!    [`became_inactive`](ViewModel::became_inactive), before the setter
//!    returns.
//! 4. Each subscription to an edge stream receives one immediate event when
//!    the current state matches the stream, computed at subscribe time.
//! 5. Dropping the last handle completes every derived stream.
//!
//! # Failure Modes
//!
//! - **Parent dropped first**: the link reads as absent; the child becomes
//!   the root of what remains of its chain.
//! - **Parent cycle**: cannot be built through the public constructors (a
//!   parent must exist before its child). A cycle would make
//!   [`root`](ViewModel::root) and
//!   [`view_model_passing_test`](ViewModel::view_model_passing_test) loop
//!   forever.

mod activation;
mod gating;

use std::any::Any;
use std::fmt;
use std::iter::FusedIterator;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use rvm_core::{LoopScheduler, Scheduler, Signal};
use tracing::{debug, trace};

use crate::config::ViewModelConfig;
use activation::{Activation, Edge};

static NEXT_VIEW_MODEL_ID: AtomicU64 = AtomicU64::new(1);

fn next_view_model_id() -> u64 {
    NEXT_VIEW_MODEL_ID.fetch_add(1, Ordering::Relaxed)
}

struct ViewModelInner {
    id: u64,
    model: Option<Rc<dyn Any>>,
    parent: Option<Weak<ViewModelInner>>,
    activation: Activation<ViewModel>,
    scheduler: Rc<dyn Scheduler>,
    config: ViewModelConfig,
}

impl Drop for ViewModelInner {
    fn drop(&mut self) {
        debug!(view_model = self.id, "view model dropped");
        self.activation.terminate();
    }
}

/// Adapts a domain model for presentation and tracks view visibility.
///
/// Cloning creates a new handle to the **same** view model. Equality is
/// identity.
#[derive(Clone)]
pub struct ViewModel {
    inner: Rc<ViewModelInner>,
}

/// Non-owning handle to a [`ViewModel`].
#[derive(Clone, Default)]
pub struct WeakViewModel {
    inner: Weak<ViewModelInner>,
}

impl WeakViewModel {
    /// The view model, if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<ViewModel> {
        self.inner.upgrade().map(|inner| ViewModel { inner })
    }

    /// Whether the view model has been dropped.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.inner.strong_count() == 0
    }
}

impl fmt::Debug for WeakViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakViewModel")
            .field("dropped", &self.is_dropped())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Builder for [`ViewModel`].
///
/// A child inherits its parent's scheduler and configuration unless they are
/// set explicitly. A root without an explicit scheduler uses
/// [`LoopScheduler::main`]; without an explicit configuration it reads
/// [`ViewModelConfig::from_env_or_default`].
#[derive(Default)]
#[must_use]
pub struct ViewModelBuilder {
    model: Option<Rc<dyn Any>>,
    parent: Option<ViewModel>,
    scheduler: Option<Rc<dyn Scheduler>>,
    config: Option<ViewModelConfig>,
}

impl ViewModelBuilder {
    /// Start with no model, no parent and default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// The model to adapt.
    pub fn model<M: Any>(self, model: M) -> Self {
        self.shared_model(Rc::new(model))
    }

    /// A model already shared elsewhere.
    pub fn shared_model<M: Any>(mut self, model: Rc<M>) -> Self {
        self.model = Some(model);
        self
    }

    /// The parent view model. Only a weak link is kept.
    pub fn parent(mut self, parent: &ViewModel) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Scheduler for time-based operators.
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Settings for this view model.
    pub fn config(mut self, config: ViewModelConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Create the view model. It starts inactive.
    #[must_use]
    pub fn build(self) -> ViewModel {
        let parent = self.parent.as_ref();
        let scheduler = self
            .scheduler
            .or_else(|| parent.map(|p| Rc::clone(&p.inner.scheduler)))
            .unwrap_or_else(|| LoopScheduler::main() as Rc<dyn Scheduler>);
        let config = self
            .config
            .or_else(|| parent.map(|p| p.inner.config))
            .unwrap_or_else(ViewModelConfig::from_env_or_default);

        let inner = Rc::new(ViewModelInner {
            id: next_view_model_id(),
            model: self.model,
            parent: parent.map(|p| Rc::downgrade(&p.inner)),
            activation: Activation::new(),
            scheduler,
            config,
        });
        debug!(
            view_model = inner.id,
            parent = ?parent.map(ViewModel::id),
            has_model = inner.model.is_some(),
            "view model created"
        );
        ViewModel { inner }
    }
}

impl fmt::Debug for ViewModelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModelBuilder")
            .field("has_model", &self.model.is_some())
            .field("parent", &self.parent.as_ref().map(ViewModel::id))
            .field("config", &self.config)
            .finish()
    }
}

impl ViewModel {
    /// A root view model with no model.
    #[must_use]
    pub fn new() -> Self {
        ViewModelBuilder::new().build()
    }

    /// A root view model adapting `model`.
    #[must_use]
    pub fn with_model<M: Any>(model: M) -> Self {
        ViewModelBuilder::new().model(model).build()
    }

    /// Start building a view model.
    pub fn builder() -> ViewModelBuilder {
        ViewModelBuilder::new()
    }

    /// Start building a child of this view model.
    pub fn child(&self) -> ViewModelBuilder {
        ViewModelBuilder::new().parent(self)
    }

    /// Process-unique identifier, used in log output.
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// A non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakViewModel {
        WeakViewModel {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Whether two handles refer to the same view model.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Model ────────────────────────────────────────────────────────

    /// The model, if present and of type `M`.
    #[must_use]
    pub fn model<M: Any>(&self) -> Option<Rc<M>> {
        Rc::clone(self.inner.model.as_ref()?).downcast::<M>().ok()
    }

    /// The model without a type check.
    #[must_use]
    pub fn model_any(&self) -> Option<&Rc<dyn Any>> {
        self.inner.model.as_ref()
    }

    /// Whether a model was supplied.
    #[must_use]
    pub fn has_model(&self) -> bool {
        self.inner.model.is_some()
    }

    // ── Hierarchy ────────────────────────────────────────────────────

    /// The parent, if one was given and it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<ViewModel> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| ViewModel { inner })
    }

    /// This view model followed by each ancestor, nearest first.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    /// The topmost ancestor; a view model without a parent is its own root.
    #[must_use]
    pub fn root(&self) -> ViewModel {
        self.ancestors().last().unwrap_or_else(|| self.clone())
    }

    /// The nearest of this view model and its ancestors satisfying
    /// `predicate`.
    pub fn view_model_passing_test(
        &self,
        mut predicate: impl FnMut(&ViewModel) -> bool,
    ) -> Option<ViewModel> {
        self.ancestors().find(|vm| predicate(vm))
    }

    // ── Activation ───────────────────────────────────────────────────

    /// Whether the view is currently visible. Defaults to `false`.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.activation.is_active()
    }

    /// Update the activation flag.
    ///
    /// Emits on the matching edge stream, synchronously, only if the value
    /// changed. Called from inside an edge callback, the new edge is
    /// delivered once the current one has reached every subscriber.
    pub fn set_active(&self, active: bool) {
        let Some(edge) = self.inner.activation.set(active) else {
            return;
        };
        trace!(view_model = self.inner.id, active, "activation edge");
        if !self.inner.activation.enqueue(edge) {
            return;
        }
        while let Some(batch) = self.inner.activation.next_batch() {
            for observer in batch {
                observer.send_next(self.clone());
            }
        }
    }

    /// Sends this view model on every change from inactive to active, and
    /// once immediately upon subscription if currently active.
    ///
    /// Completes when the view model is dropped.
    #[must_use]
    pub fn became_active(&self) -> Signal<ViewModel> {
        self.edge_signal(Edge::BecameActive)
    }

    /// Sends this view model on every change from active to inactive, and
    /// once immediately upon subscription if currently inactive.
    ///
    /// Completes when the view model is dropped.
    #[must_use]
    pub fn became_inactive(&self) -> Signal<ViewModel> {
        self.edge_signal(Edge::BecameInactive)
    }

    /// Completes, without sending anything, when the view model is dropped.
    #[must_use]
    pub fn deallocated(&self) -> Signal<()> {
        let weak = Rc::downgrade(&self.inner);
        Signal::new(move |observer| match weak.upgrade() {
            Some(inner) => inner.activation.register_deallocated(observer.clone()),
            None => observer.send_completed(),
        })
        .named(format!("view_model[{}].deallocated", self.inner.id))
    }

    fn edge_signal(&self, edge: Edge) -> Signal<ViewModel> {
        let weak = Rc::downgrade(&self.inner);
        let name = match edge {
            Edge::BecameActive => "became_active",
            Edge::BecameInactive => "became_inactive",
        };
        Signal::new(move |observer| {
            let Some(inner) = weak.upgrade() else {
                observer.send_completed();
                return;
            };
            inner.activation.register(edge, observer.clone());
            if edge.replays_when(inner.activation.is_active()) {
                observer.send_next(ViewModel { inner });
            }
        })
        .named(format!("view_model[{}].{name}", self.inner.id))
    }

    /// Live subscribers of the activation and deallocation streams.
    #[must_use]
    pub fn activation_subscriber_count(&self) -> usize {
        self.inner.activation.subscriber_count()
    }

    // ── Settings ─────────────────────────────────────────────────────

    /// The scheduler used by time-based operators.
    #[must_use]
    pub fn scheduler(&self) -> &Rc<dyn Scheduler> {
        &self.inner.scheduler
    }

    /// This view model's settings.
    #[must_use]
    pub fn config(&self) -> &ViewModelConfig {
        &self.inner.config
    }
}

impl Default for ViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ViewModel {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ViewModel {}

impl fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModel")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .field("has_model", &self.has_model())
            .field("parent", &self.parent().map(|p| p.id()))
            .finish()
    }
}

/// Iterator over a view model and its ancestors. See
/// [`ViewModel::ancestors`].
#[derive(Debug, Clone)]
pub struct Ancestors {
    next: Option<ViewModel>,
}

impl Iterator for Ancestors {
    type Item = ViewModel;

    fn next(&mut self) -> Option<ViewModel> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

impl FusedIterator for Ancestors {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use std::convert::Infallible;

    use rvm_core::{Event, Subscription};

    type Log<T> = Rc<RefCell<Vec<Event<T, Infallible>>>>;

    /// Record edge events as view model ids, so the log holds no handles.
    fn record_ids(signal: &Signal<ViewModel>) -> (Log<u64>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let sub = signal.subscribe(move |e| sink.borrow_mut().push(e.map(|vm| vm.id())));
        (log, sub)
    }

    fn nexts(log: &Log<u64>) -> usize {
        log.borrow().iter().filter(|e| matches!(e, Event::Next(_))).count()
    }

    #[test]
    fn defaults() {
        let vm = ViewModel::new();
        assert!(!vm.is_active());
        assert!(!vm.has_model());
        assert!(vm.parent().is_none());
        assert!(vm.root().ptr_eq(&vm));
    }

    #[test]
    fn root_config_comes_from_environment() {
        let root = ViewModel::new();
        assert_eq!(root.config(), &ViewModelConfig::from_env_or_default());

        let pinned = ViewModelConfig::new().with_inactive_throttle(web_time::Duration::from_millis(7));
        let explicit = ViewModel::builder().config(pinned).build();
        assert_eq!(explicit.config(), &pinned);
        assert_eq!(explicit.child().build().config(), &pinned);
    }

    #[test]
    fn typed_model_access() {
        let vm = ViewModel::with_model(String::from("repo"));
        assert_eq!(vm.model::<String>().as_deref().map(String::as_str), Some("repo"));
        assert!(vm.model::<u32>().is_none());
        assert!(vm.model_any().is_some());
    }

    #[test]
    fn shared_model_is_not_copied() {
        let model = Rc::new(42u32);
        let vm = ViewModel::builder().shared_model(Rc::clone(&model)).build();
        let back = vm.model::<u32>().expect("u32 model");
        assert!(Rc::ptr_eq(&model, &back));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(ViewModel::new().id(), ViewModel::new().id());
    }

    #[test]
    fn repeated_value_emits_nothing() {
        let vm = ViewModel::new();
        let (active, _a) = record_ids(&vm.became_active());
        let (inactive, _i) = record_ids(&vm.became_inactive());
        assert_eq!(nexts(&inactive), 1); // replay
        vm.set_active(false);
        assert_eq!(nexts(&inactive), 1);
        vm.set_active(true);
        vm.set_active(true);
        assert_eq!(nexts(&active), 1);
        assert_eq!(nexts(&inactive), 1);
    }

    #[test]
    fn each_edge_fires_once_on_one_stream() {
        let vm = ViewModel::new();
        let (active, _a) = record_ids(&vm.became_active());
        let (inactive, _i) = record_ids(&vm.became_inactive());
        for round in 1..=3 {
            vm.set_active(true);
            assert_eq!(nexts(&active), round);
            assert_eq!(nexts(&inactive), round);
            vm.set_active(false);
            assert_eq!(nexts(&active), round);
            assert_eq!(nexts(&inactive), round + 1);
        }
    }

    #[test]
    fn replay_is_per_subscription() {
        let vm = ViewModel::new();
        vm.set_active(true);
        let (first, _a) = record_ids(&vm.became_active());
        assert_eq!(nexts(&first), 1);
        let (second, _b) = record_ids(&vm.became_active());
        assert_eq!(nexts(&second), 1);
        assert_eq!(nexts(&first), 1);
        let (inactive, _c) = record_ids(&vm.became_inactive());
        assert_eq!(nexts(&inactive), 0);
    }

    #[test]
    fn events_carry_the_view_model() {
        let vm = ViewModel::new();
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let _sub = vm
            .became_active()
            .subscribe_next(move |v| *sink.borrow_mut() = Some(v.id()));
        vm.set_active(true);
        assert_eq!(*seen.borrow(), Some(vm.id()));
    }

    #[test]
    fn streams_complete_on_drop() {
        let vm = ViewModel::new();
        let became_active = vm.became_active();
        let (active, a) = record_ids(&became_active);
        let (inactive, i) = record_ids(&vm.became_inactive());
        let gone = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&gone);
        let d = vm.deallocated().subscribe(move |e| sink.borrow_mut().push(e));
        drop(vm);
        assert_eq!(active.borrow().last(), Some(&Event::Completed));
        assert_eq!(inactive.borrow().last(), Some(&Event::Completed));
        assert_eq!(*gone.borrow(), vec![Event::Completed]);
        assert!(a.is_closed() && i.is_closed() && d.is_closed());

        // Subscribing after the drop completes immediately.
        let (late, _l) = record_ids(&became_active);
        assert_eq!(*late.borrow(), vec![Event::Completed]);
    }

    #[test]
    fn subscriptions_do_not_keep_view_model_alive() {
        let vm = ViewModel::new();
        let weak = vm.downgrade();
        let _a = vm.became_active().subscribe(|_| {});
        let _d = vm.deallocated().subscribe(|_| {});
        drop(vm);
        assert!(weak.is_dropped());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn disposed_subscribers_are_pruned() {
        let vm = ViewModel::new();
        let a = vm.became_active().subscribe(|_| {});
        let _b = vm.became_inactive().subscribe(|_| {});
        assert_eq!(vm.activation_subscriber_count(), 2);
        drop(a);
        assert_eq!(vm.activation_subscriber_count(), 1);
    }

    #[test]
    fn subscriber_toggling_inside_handler_sees_every_edge() {
        let vm = ViewModel::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let _watch = vm
            .became_inactive()
            .subscribe_next(move |_| sink.borrow_mut().push("inactive"));
        let sink = Rc::clone(&log);
        let _bounce = vm.became_active().subscribe_next(move |v| {
            sink.borrow_mut().push("active");
            v.set_active(false);
        });
        vm.set_active(true);
        assert!(!vm.is_active());
        assert_eq!(*log.borrow(), vec!["inactive", "active", "inactive"]);
    }

    #[test]
    fn nested_toggle_keeps_edge_order_for_later_subscribers() {
        let vm = ViewModel::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let _bounce = vm.became_active().subscribe_next(move |v| {
            sink.borrow_mut().push("first:active");
            v.set_active(false);
        });
        let sink = Rc::clone(&log);
        let _on = vm
            .became_active()
            .subscribe_next(move |_| sink.borrow_mut().push("second:active"));
        let sink = Rc::clone(&log);
        let _off = vm
            .became_inactive()
            .subscribe_next(move |_| sink.borrow_mut().push("second:inactive"));
        log.borrow_mut().clear();

        vm.set_active(true);
        assert!(!vm.is_active());
        assert_eq!(
            *log.borrow(),
            vec!["first:active", "second:active", "second:inactive"]
        );

        log.borrow_mut().clear();
        vm.set_active(true);
        assert_eq!(
            *log.borrow(),
            vec!["first:active", "second:active", "second:inactive"]
        );
    }

    #[test]
    fn parent_chain_and_root() {
        let c = ViewModel::new();
        let b = c.child().build();
        let a = b.child().build();
        assert!(a.parent().expect("a has parent").ptr_eq(&b));
        assert!(a.root().ptr_eq(&c));
        assert!(b.root().ptr_eq(&c));
        let ids: Vec<u64> = a.ancestors().map(|vm| vm.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);
    }

    #[test]
    fn passing_test_walks_up() {
        let c = ViewModel::with_model("c");
        let b = c.child().model("b").build();
        let a = b.child().model("a").build();
        let is_c = |vm: &ViewModel| vm.model::<&str>().is_some_and(|m| *m == "c");
        let found = a.view_model_passing_test(is_c).expect("c is an ancestor");
        assert!(found.ptr_eq(&c));
        assert!(a.view_model_passing_test(|vm| vm.ptr_eq(&a)).is_some());
        assert!(a.view_model_passing_test(|_| false).is_none());
    }

    #[test]
    fn child_does_not_keep_parent_alive() {
        let parent = ViewModel::new();
        let weak = parent.downgrade();
        let child = parent.child().build();
        drop(parent);
        assert!(weak.is_dropped());
        assert!(child.parent().is_none());
        assert!(child.root().ptr_eq(&child));
    }

    #[test]
    fn child_inherits_scheduler_and_config() {
        let scheduler: Rc<dyn Scheduler> = Rc::new(rvm_core::VirtualScheduler::new());
        let config = ViewModelConfig::new().with_inactive_throttle(web_time::Duration::from_millis(5));
        let parent = ViewModel::builder()
            .scheduler(Rc::clone(&scheduler))
            .config(config)
            .build();
        let child = parent.child().build();
        assert!(Rc::ptr_eq(child.scheduler(), &scheduler));
        assert_eq!(child.config(), &config);

        let own = ViewModelConfig::new();
        let other = parent.child().config(own).build();
        assert_eq!(other.config(), &own);
    }

    #[test]
    fn debug_output() {
        let vm = ViewModel::with_model(1u8);
        let dbg = format!("{vm:?}");
        assert!(dbg.contains("ViewModel"));
        assert!(dbg.contains("has_model: true"));
    }
}
