use super::admission::Admission;
use super::config::LimiterConfig;
use super::keyspace::{Keyspace, hour_of};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use thiserror::Error;

#[cfg(test)]
mod tests;

mod memory;
mod redis;

pub use memory::{MemoryStore, MemoryStoreBuilder};
pub use redis::{RedisStore, RedisStoreBuilder};


/// Failure talking to the shared store
///
/// Backends convert their native errors into one of these kinds at the
/// boundary; callers never see driver-specific error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("unexpected store response: {0}")]
    InvalidResponse(String),

    #[error("invalid store configuration: {0}")]
    Config(String),
}

/// Everything one atomic admission needs, with keys already resolved
#[derive(Debug, Clone)]
pub struct AdmissionOp<'a> {
    pub ban_key: String,
    pub window_key: String,
    pub global_key: String,
    pub hourly_key: String,
    pub endpoints_key: String,
    pub endpoint: &'a str,
    pub limit: u64,
    pub window: Duration,
    pub hourly_ttl: Duration,
    pub retention: Duration,
    pub now: SystemTime,
}

impl<'a> AdmissionOp<'a> {
    pub fn new(
        keys: &Keyspace,
        config: &LimiterConfig,
        identity: &str,
        endpoint: &'a str,
        now: SystemTime,
    ) -> Self {
        AdmissionOp {
            ban_key: keys.ban(identity),
            window_key: keys.window(identity),
            global_key: keys.global_stats(),
            hourly_key: keys.hourly_stats(hour_of(now)),
            endpoints_key: keys.endpoint_stats(),
            endpoint,
            limit: config.limit,
            window: config.window,
            hourly_ttl: config.hourly_ttl,
            retention: config.retention,
            now,
        }
    }
}

/// Shared key-value store holding all limiter state
///
/// [`admit`](Store::admit) must run the whole check-and-update sequence as one
/// indivisible step: ban check, window increment (with expiry set on the first
/// increment), and the three statistics families. The remaining methods are
/// plain single-key primitives used by the ban registry and statistics readers.
///
/// `now` is the caller's clock. Backends with their own notion of time
/// (Redis) may ignore it.
#[async_trait]
pub trait Store: Send + Sync {
    /// Run one atomic admission
    async fn admit(&self, op: &AdmissionOp<'_>) -> Result<Admission, StoreError>;

    /// Whether a live key exists
    async fn exists(&self, key: &str, now: SystemTime) -> Result<bool, StoreError>;

    /// String value of a live key
    async fn get(&self, key: &str, now: SystemTime) -> Result<Option<String>, StoreError>;

    /// Set a string value that expires after `ttl`
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<(), StoreError>;

    /// Remove a key, returning whether it was live
    async fn delete(&self, key: &str, now: SystemTime) -> Result<bool, StoreError>;

    /// All integer fields of a hash; empty if the key is absent
    async fn hash_get_all(
        &self,
        key: &str,
        now: SystemTime,
    ) -> Result<HashMap<String, i64>, StoreError>;
}
