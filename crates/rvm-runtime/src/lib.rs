#![forbid(unsafe_code)]

//! Activation-aware view models.
//!
//! A [`ViewModel`] adapts a domain model for presentation and tracks whether
//! its view is currently visible ("active"). Reactive work declared through it
//! follows that flag:
//!
//! - [`ViewModel::forward_while_active`] subscribes to a signal only while the
//!   view model is active.
//! - [`ViewModel::throttle_while_inactive`] stays subscribed but delays values
//!   while the view model is inactive.
//!
//! Everything derived from a view model completes when its last handle is
//! dropped.

pub mod config;
pub mod error;
pub mod view_model;

pub use config::{DEFAULT_INACTIVE_THROTTLE, INACTIVE_THROTTLE_ENV, ViewModelConfig};
pub use error::ConfigError;
pub use view_model::{Ancestors, ViewModel, ViewModelBuilder, WeakViewModel};
