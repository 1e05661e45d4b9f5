//! Counter configuration.
//!
//! [`CounterConfig`] gathers the knobs of a
//! [`SharedCounter`](crate::counter::SharedCounter): the shared key, the
//! refresh interval gating reconciliation, and the retry policy on conflict.
//!
//! # Sources
//!
//! - Code, through the builder methods.
//! - The environment, through [`CounterConfig::from_env`]:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `CONDIVISO_KEY` | `CONDIVISO_COUNTER` | Shared key |
//! | `CONDIVISO_REFRESH_INTERVAL` | `1s` | Minimum time between reconciliations (`500ms`, `2s`, `1m`, ...) |
//! | `CONDIVISO_MAX_RETRIES` | `0` | Extra transactions after a conflict |
//! | `CONDIVISO_REDIS_URL` | `redis://127.0.0.1:6379` | Store location for the `redis` feature |
//!
//! - Any serde format, with the `serde` feature (the interval is written in
//!   the same human-readable syntax).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default shared key.
pub const DEFAULT_KEY: &str = "CONDIVISO_COUNTER";

/// Default refresh interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Lowest refresh interval accepted from the environment.
pub const MIN_ENV_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Default Redis location.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable holds a value of the wrong shape.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        /// The variable or field name.
        name: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings of a shared counter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CounterConfig {
    /// The shared key holding the total.
    pub key: String,
    /// Reconciliation runs only when more than this has elapsed since the
    /// previous attempt.
    #[cfg_attr(feature = "serde", serde(with = "human_duration"))]
    pub refresh_interval: Duration,
    /// Extra transactions attempted after a conflict, within one
    /// reconciliation.
    pub max_retries: u32,
    /// Location of the Redis store.
    pub redis_url: String,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            max_retries: 0,
            redis_url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

impl CounterConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shared key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Sets the refresh interval.
    ///
    /// Unlike [`from_env`](Self::from_env), no lower bound is enforced here,
    /// so tests and simulations can reconcile on every call with
    /// `Duration::ZERO`.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Sets the number of retries after a conflict.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the Redis location.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Loads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the configuration from an arbitrary variable lookup.
    ///
    /// A refresh interval that cannot be parsed falls back to the default,
    /// one below [`MIN_ENV_REFRESH_INTERVAL`] is raised to it; both cases are
    /// logged. A malformed retry count is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(key) = lookup("CONDIVISO_KEY") {
            if key.is_empty() {
                return Err(ConfigError::Invalid {
                    name: "CONDIVISO_KEY",
                    value: key,
                    reason: "key must not be empty".into(),
                });
            }
            config.key = key;
        }

        if let Some(raw) = lookup("CONDIVISO_REFRESH_INTERVAL") {
            config.refresh_interval = match humantime::parse_duration(raw.trim()) {
                Ok(v) if v < MIN_ENV_REFRESH_INTERVAL => {
                    tracing::warn!(
                        requested = ?v,
                        "minimum for CONDIVISO_REFRESH_INTERVAL is {:?}",
                        MIN_ENV_REFRESH_INTERVAL
                    );
                    MIN_ENV_REFRESH_INTERVAL
                }
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        value = %raw,
                        error = %e,
                        "failed to parse CONDIVISO_REFRESH_INTERVAL, using default"
                    );
                    DEFAULT_REFRESH_INTERVAL
                }
            };
        }

        if let Some(raw) = lookup("CONDIVISO_MAX_RETRIES") {
            config.max_retries = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    name: "CONDIVISO_MAX_RETRIES",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(url) = lookup("CONDIVISO_REDIS_URL") {
            config.redis_url = url;
        }

        Ok(config)
    }
}

/// Serde adapter writing durations as `"1s"`, `"500ms"`, ...
#[cfg(feature = "serde")]
mod human_duration {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}
