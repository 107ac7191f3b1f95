//! Store factory
//!
//! Builds the configured backend behind a trait object so the transport is
//! agnostic of where counters live.
//!
//! ## Memory Store
//! - Counters live in this process only
//! - Expired entries are swept every `cleanup_interval`
//! - Best for: a single instance, development, tests
//!
//! ## Redis Store
//! - Counters are shared by every instance using the same server and prefix
//! - Admission runs as one server-side script
//! - Best for: horizontally scaled deployments

use crate::config::{StoreConfig, StoreType};
use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use turnstile::{LimiterConfig, MemoryStore, RedisStore, Store, Turnstile};

/// Create the configured store
///
/// The Redis connection is established lazily on first use, so this does not
/// fail when the server is unreachable; requests then fail open.
pub fn create_store(config: &StoreConfig, limiter: &LimiterConfig) -> Result<Arc<dyn Store>> {
    match config.store_type {
        StoreType::Memory => {
            let store = MemoryStore::builder()
                .capacity(config.capacity)
                .cleanup_interval(Duration::from_secs(config.cleanup_interval))
                .build();
            Ok(Arc::new(store))
        }
        StoreType::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .ok_or_else(|| anyhow!("--redis-url is required for the redis store"))?;
            let store = RedisStore::builder(url)
                .response_timeout(limiter.command_timeout)
                .build()?;
            Ok(Arc::new(store))
        }
    }
}

/// Create the admission controller over the configured store
pub fn create_turnstile(config: &StoreConfig, limiter: &LimiterConfig) -> Result<Turnstile> {
    let store = create_store(config, limiter)?;
    Ok(Turnstile::new(store, limiter.clone())?)
}
