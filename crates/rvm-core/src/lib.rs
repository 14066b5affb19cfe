#![forbid(unsafe_code)]

//! Core: single-threaded signals, disposables and timer schedulers.
//!
//! Everything in this crate is `!Send` by construction (`Rc`/`RefCell`). It is
//! meant to run on one UI thread, where every emission, subscription and
//! disposal is a synchronous bookkeeping step.

pub mod disposable;
pub mod logging;
pub mod scheduler;
pub mod signal;

pub use disposable::{Disposable, Subscription};
pub use scheduler::{LoopScheduler, Scheduler, VirtualScheduler};
pub use signal::{DelayQueue, Event, Observer, Signal, Subject};
