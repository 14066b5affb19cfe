//! View model configuration.
//!
//! The only tunable is how long [`throttle_while_inactive`] holds values while
//! the view model is inactive. It defaults to [`DEFAULT_INACTIVE_THROTTLE`]
//! and can be overridden in code or through the
//! [`INACTIVE_THROTTLE_ENV`] environment variable.
//!
//! [`throttle_while_inactive`]: crate::ViewModel::throttle_while_inactive

use web_time::Duration;

use crate::error::ConfigError;

/// Delay applied to values while a view model is inactive.
pub const DEFAULT_INACTIVE_THROTTLE: Duration = Duration::from_secs(1);

/// Environment variable overriding the inactive throttle, in milliseconds.
pub const INACTIVE_THROTTLE_ENV: &str = "RVM_INACTIVE_THROTTLE_MS";

/// Per-view-model settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewModelConfig {
    inactive_throttle: Duration,
}

impl ViewModelConfig {
    /// Default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inactive_throttle: DEFAULT_INACTIVE_THROTTLE,
        }
    }

    /// Set the inactive throttle interval.
    #[must_use]
    pub const fn with_inactive_throttle(mut self, interval: Duration) -> Self {
        self.inactive_throttle = interval;
        self
    }

    /// How long values are delayed while inactive.
    #[inline]
    #[must_use]
    pub const fn inactive_throttle(&self) -> Duration {
        self.inactive_throttle
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read overrides through `lookup`, which maps a variable name to its
    /// value. Unset variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new();
        if let Some(raw) = lookup(INACTIVE_THROTTLE_ENV) {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: INACTIVE_THROTTLE_ENV,
                    value: raw.clone(),
                })?;
            if ms == 0 {
                return Err(ConfigError::ZeroInterval {
                    var: INACTIVE_THROTTLE_ENV,
                });
            }
            config.inactive_throttle = Duration::from_millis(ms);
        }
        Ok(config)
    }

    /// Like [`from_env`](Self::from_env), but falls back to the defaults
    /// (with a warning) when the environment holds an invalid value.
    ///
    /// Root view models built without an explicit configuration use this.
    #[must_use]
    pub fn from_env_or_default() -> Self {
        Self::from_lookup_or_default(|name| std::env::var(name).ok())
    }

    /// Like [`from_lookup`](Self::from_lookup), but falls back to the
    /// defaults (with a warning) on an invalid value.
    #[must_use]
    pub fn from_lookup_or_default(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self::from_lookup(lookup).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring invalid view model configuration");
            Self::new()
        })
    }
}

impl Default for ViewModelConfig {
    fn default() -> Self {
        Self::new()
    }
}
