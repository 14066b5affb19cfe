//! Errors raised while loading view model configuration.

use thiserror::Error;

/// Invalid view model configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: expected whole milliseconds, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var}: interval must be greater than zero")]
    ZeroInterval { var: &'static str },
}

impl ConfigError {
    /// Name of the environment variable that held the bad value.
    #[must_use]
    pub fn var(&self) -> &'static str {
        match self {
            Self::InvalidNumber { var, .. } | Self::ZeroInterval { var } => var,
        }
    }
}
