#![forbid(unsafe_code)]

//! Logging shims.
//!
//! With the `tracing` feature the macros re-exported here are the real
//! `tracing` macros. Without it they expand to nothing, so call sites import
//! `crate::logging::{debug, trace, warn}` and never carry their own `cfg`.

#[cfg(feature = "tracing")]
pub use tracing::{debug, trace, warn};

#[cfg(not(feature = "tracing"))]
pub use crate::{debug, trace, warn};

/// No-op stand-in for `tracing::trace!`.
#[cfg(not(feature = "tracing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// No-op stand-in for `tracing::debug!`.
#[cfg(not(feature = "tracing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

/// No-op stand-in for `tracing::warn!`.
#[cfg(not(feature = "tracing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {};
}
