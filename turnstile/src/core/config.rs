//! Limiter configuration
//!
//! All knobs are plain values so they can be deserialized from whatever the
//! host application uses for configuration, or assembled with
//! [`LimiterConfig::builder`].

use super::TurnstileError;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_LIMIT: u64 = 60;
const DEFAULT_WINDOW_SECS: u64 = 60;
const DEFAULT_RETENTION_SECS: u64 = 90 * 24 * 3600;
const DEFAULT_HOURLY_TTL_SECS: u64 = 30 * 24 * 3600;
const DEFAULT_KEY_PREFIX: &str = "turnstile";
const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 250;

/// Longest window, TTL, retention or ban accepted anywhere (100 years)
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Parameters of the admission algorithm
///
/// # Fields
///
/// - `limit`: Requests admitted per identity per window (N)
/// - `window`: Length of one fixed window (W)
/// - `retention`: Inactivity after which per-endpoint call counters lapse (R, zero keeps them forever)
/// - `hourly_ttl`: Lifetime of one hourly statistics bucket
/// - `key_prefix`: Namespace prepended to every key
/// - `command_timeout`: Upper bound on one store round trip
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimiterConfig {
    pub limit: u64,
    #[serde(with = "duration_secs")]
    pub window: Duration,
    #[serde(with = "duration_secs")]
    pub retention: Duration,
    #[serde(with = "duration_secs")]
    pub hourly_ttl: Duration,
    pub key_prefix: String,
    #[serde(with = "duration_millis")]
    pub command_timeout: Duration,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            hourly_ttl: Duration::from_secs(DEFAULT_HOURLY_TTL_SECS),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
        }
    }
}

impl LimiterConfig {
    /// Create a new builder starting from the defaults
    pub fn builder() -> LimiterConfigBuilder {
        LimiterConfigBuilder::default()
    }

    /// Check that every parameter is usable
    ///
    /// # Errors
    ///
    /// Returns [`TurnstileError::InvalidConfig`] if the limit is zero, the
    /// window, hourly TTL or command timeout is shorter than one millisecond,
    /// any duration exceeds [`MAX_DURATION`], or the key prefix is empty.
    pub fn validate(&self) -> Result<(), TurnstileError> {
        if self.limit == 0 {
            return Err(TurnstileError::InvalidConfig(
                "limit must be greater than zero".into(),
            ));
        }
        if self.window.as_millis() == 0 {
            return Err(TurnstileError::InvalidConfig(
                "window must be at least one millisecond".into(),
            ));
        }
        if self.hourly_ttl.as_millis() == 0 {
            return Err(TurnstileError::InvalidConfig(
                "hourly_ttl must be at least one millisecond".into(),
            ));
        }
        if self.command_timeout.as_millis() == 0 {
            return Err(TurnstileError::InvalidConfig(
                "command_timeout must be at least one millisecond".into(),
            ));
        }
        for (name, value) in [
            ("window", self.window),
            ("retention", self.retention),
            ("hourly_ttl", self.hourly_ttl),
            ("command_timeout", self.command_timeout),
        ] {
            if value > MAX_DURATION {
                return Err(TurnstileError::InvalidConfig(format!(
                    "{name} must not exceed {} seconds",
                    MAX_DURATION.as_secs()
                )));
            }
        }
        if self.key_prefix.is_empty() {
            return Err(TurnstileError::InvalidConfig(
                "key_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`LimiterConfig`]
///
/// # Example
///
/// ```
/// use turnstile::LimiterConfig;
/// use std::time::Duration;
///
/// let config = LimiterConfig::builder()
///     .limit(100)
///     .window(Duration::from_secs(30))
///     .key_prefix("api")
///     .build()
///     .unwrap();
/// assert_eq!(config.limit, 100);
/// ```
#[derive(Debug, Default)]
pub struct LimiterConfigBuilder {
    config: LimiterConfig,
}

impl LimiterConfigBuilder {
    /// Requests admitted per identity per window
    pub fn limit(mut self, limit: u64) -> Self {
        self.config.limit = limit;
        self
    }

    /// Length of one fixed window
    pub fn window(mut self, window: Duration) -> Self {
        self.config.window = window;
        self
    }

    /// How long per-endpoint call counters survive without traffic
    pub fn retention(mut self, retention: Duration) -> Self {
        self.config.retention = retention;
        self
    }

    /// Lifetime of one hourly statistics bucket
    pub fn hourly_ttl(mut self, ttl: Duration) -> Self {
        self.config.hourly_ttl = ttl;
        self
    }

    /// Namespace prepended to every key
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Upper bound on one store round trip
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<LimiterConfig, TurnstileError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
