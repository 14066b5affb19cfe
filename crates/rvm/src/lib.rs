#![forbid(unsafe_code)]

//! Reactive view model public facade.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use rvm_core as core;
pub use rvm_runtime as runtime;

pub mod prelude {
    pub use rvm_core::{
        Disposable, Event, LoopScheduler, Observer, Scheduler, Signal, Subject, Subscription,
        VirtualScheduler,
    };
    pub use rvm_runtime::{ConfigError, ViewModel, ViewModelBuilder, ViewModelConfig, WeakViewModel};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_covers_common_use() {
        let vm = ViewModel::with_model(String::from("inbox"));
        let source: Subject<u32> = Subject::new();
        let seen = std::rc::Rc::new(std::cell::Cell::new(0));
        let sink = std::rc::Rc::clone(&seen);
        let _sub: Subscription = vm
            .forward_while_active(&source.signal())
            .subscribe_next(move |v| sink.set(sink.get() + v));

        source.send_next(1);
        vm.set_active(true);
        source.send_next(2);
        assert_eq!(seen.get(), 2);
        assert_eq!(vm.model::<String>().as_deref().map(String::as_str), Some("inbox"));
    }
}
