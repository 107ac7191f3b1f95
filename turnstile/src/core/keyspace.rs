//! Key and hash-field naming
//!
//! Every backend lays data out the same way:
//!
//! | Key                              | Type    | Expiry                  |
//! |----------------------------------|---------|-------------------------|
//! | `{prefix}:rl:{identity}`         | integer | window length           |
//! | `{prefix}:ban:{identity}`        | string  | ban duration            |
//! | `{prefix}:stats:global`          | hash    | none                    |
//! | `{prefix}:stats:hourly:{hour}`   | hash    | hourly bucket TTL       |
//! | `{prefix}:stats:endpoints`       | hash    | retention, refreshed    |
//!
//! Hourly buckets carry `success`, `error`, `throttled`, `banned` and
//! `ep:{endpoint}:{success|error}` fields.

use std::time::{SystemTime, UNIX_EPOCH};

pub const FIELD_SUCCESS: &str = "success";
pub const FIELD_ERROR: &str = "error";
pub const FIELD_THROTTLED: &str = "throttled";
pub const FIELD_BANNED: &str = "banned";
pub const ENDPOINT_FIELD_PREFIX: &str = "ep:";

pub const MILLIS_PER_HOUR: u64 = 3_600_000;

/// Key builder bound to one namespace prefix
#[derive(Debug, Clone)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn window(&self, identity: &str) -> String {
        format!("{}:rl:{}", self.prefix, identity)
    }

    pub fn ban(&self, identity: &str) -> String {
        format!("{}:ban:{}", self.prefix, identity)
    }

    pub fn global_stats(&self) -> String {
        format!("{}:stats:global", self.prefix)
    }

    pub fn hourly_stats(&self, hour: u64) -> String {
        format!("{}:stats:hourly:{}", self.prefix, hour)
    }

    pub fn endpoint_stats(&self) -> String {
        format!("{}:stats:endpoints", self.prefix)
    }
}

/// Hour bucket index: whole hours since the Unix epoch
pub fn hour_of(now: SystemTime) -> u64 {
    unix_millis(now) / MILLIS_PER_HOUR
}

/// Milliseconds since the Unix epoch, clamped to zero for pre-epoch clocks
pub fn unix_millis(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Hourly field counting one endpoint's outcome class
pub fn endpoint_field(endpoint: &str, class: &str) -> String {
    format!("{ENDPOINT_FIELD_PREFIX}{endpoint}:{class}")
}

/// Split an hourly endpoint field back into `(endpoint, class)`
pub fn parse_endpoint_field(field: &str) -> Option<(&str, &str)> {
    field
        .strip_prefix(ENDPOINT_FIELD_PREFIX)
        .and_then(|rest| rest.rsplit_once(':'))
}
