//! Activation-gated signal combinators.
//!
//! - [`ViewModel::forward_while_active`]: subscribe while active, dispose
//!   while inactive.
//! - [`ViewModel::throttle_while_inactive`]: stay subscribed, delay values
//!   while inactive.
//!
//! Both outputs complete when the view model is dropped and hold only weak
//! references to it.

use std::rc::Rc;

use rvm_core::{DelayQueue, Event, Signal};
use tracing::debug;

use super::ViewModel;

impl ViewModel {
    /// Subscribes (or resubscribes) to `signal` whenever
    /// [`became_active`](Self::became_active) fires, and disposes that
    /// subscription whenever [`became_inactive`](Self::became_inactive) fires.
    ///
    /// The returned signal forwards values from the latest subscription to
    /// `signal` and completes when this view model is dropped. `signal`
    /// completing on its own is not terminal: the next activation subscribes
    /// again. An error from `signal` is forwarded and ends the output.
    ///
    /// Values `signal` sends while the view model is inactive are never seen.
    #[must_use]
    pub fn forward_while_active<T: 'static, E: 'static>(&self, signal: &Signal<T, E>) -> Signal<T, E> {
        let source = signal.clone();
        let became_inactive = self.became_inactive();
        let id = self.id();

        self.became_active()
            .promote_err::<E>()
            .switch_map_latest(move |_| {
                debug!(view_model = id, "forwarding signal while active");
                source.take_until(&became_inactive).on_dispose(move || {
                    debug!(view_model = id, "forwarded subscription disposed");
                })
            })
            .take_until(&self.deallocated())
            .named(format!("view_model[{id}].forward_while_active"))
    }

    /// Forwards everything from `signal`, delaying values by the configured
    /// [`inactive_throttle`](crate::ViewModelConfig::inactive_throttle) while
    /// this view model is inactive.
    ///
    /// Unlike [`forward_while_active`](Self::forward_while_active), `signal`
    /// is subscribed exactly once per subscription to the output. Nothing is
    /// dropped or coalesced and order is preserved; values still waiting when
    /// the view model becomes active are delivered immediately.
    ///
    /// The output completes when `signal` completes (behind any values still
    /// waiting, otherwise at once) or when this view model is dropped
    /// (discarding them). An error from `signal` is forwarded immediately,
    /// discarding waiting values.
    #[must_use]
    pub fn throttle_while_inactive<T: 'static, E: 'static>(
        &self,
        signal: &Signal<T, E>,
    ) -> Signal<T, E> {
        let source = signal.clone();
        let owner = self.downgrade();
        let became_active = self.became_active();
        let deallocated = self.deallocated();
        let scheduler = Rc::clone(self.scheduler());
        let interval = self.config().inactive_throttle();
        let id = self.id();

        Signal::new(move |observer| {
            if owner.is_dropped() {
                observer.send_completed();
                return;
            }
            let queue = DelayQueue::new(observer.clone(), Rc::clone(&scheduler), interval);
            let on_teardown = queue.clone();
            observer.add_teardown(move || on_teardown.cancel());

            let done = observer.clone();
            observer.adopt(deallocated.subscribe(move |_| done.send_completed()));
            if observer.is_closed() {
                return;
            }

            let flush = queue.clone();
            observer.adopt(became_active.subscribe_next(move |_| {
                if !flush.is_empty() {
                    debug!(view_model = id, pending = flush.len(), "releasing throttled values");
                }
                flush.flush();
            }));

            let downstream = observer.clone();
            let gate = owner.clone();
            observer.adopt(source.subscribe(move |event| match event {
                Event::Error(e) => {
                    queue.cancel();
                    downstream.send_error(e);
                }
                Event::Completed if queue.is_empty() => downstream.send_completed(),
                event => {
                    if gate.upgrade().is_some_and(|vm| vm.is_active()) {
                        queue.flush();
                        downstream.send(event);
                    } else {
                        queue.push(event);
                    }
                }
            }));
        })
        .named(format!("view_model[{id}].throttle_while_inactive"))
    }
}
