//! Usage statistics
//!
//! Counters are written by the atomic admission operation itself, so they
//! always agree with the decisions that produced them. This module only reads
//! them back.

use super::guard::FailOpen;
use super::keyspace::{
    FIELD_BANNED, FIELD_ERROR, FIELD_SUCCESS, FIELD_THROTTLED, Keyspace, hour_of,
    parse_endpoint_field,
};
use super::store::{Store, StoreError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

/// Cumulative outcome counters since the store was first written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GlobalStats {
    pub success: u64,
    pub error: u64,
}

impl GlobalStats {
    pub fn total(&self) -> u64 {
        self.success + self.error
    }
}

/// Per-endpoint outcome counters within one hour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointOutcomes {
    pub success: u64,
    pub error: u64,
}

/// One hour bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HourlyStats {
    /// Whole hours since the Unix epoch
    pub hour: u64,
    pub success: u64,
    pub error: u64,
    pub throttled: u64,
    pub banned: u64,
    pub endpoints: BTreeMap<String, EndpointOutcomes>,
}

impl HourlyStats {
    pub fn total(&self) -> u64 {
        self.success + self.error
    }

    fn from_fields(hour: u64, fields: HashMap<String, i64>) -> Self {
        let mut stats = HourlyStats {
            hour,
            ..Default::default()
        };
        for (field, value) in fields {
            let value = value.max(0) as u64;
            match field.as_str() {
                FIELD_SUCCESS => stats.success = value,
                FIELD_ERROR => stats.error = value,
                FIELD_THROTTLED => stats.throttled = value,
                FIELD_BANNED => stats.banned = value,
                other => {
                    if let Some((endpoint, class)) = parse_endpoint_field(other) {
                        let outcomes = stats.endpoints.entry(endpoint.to_string()).or_default();
                        match class {
                            FIELD_SUCCESS => outcomes.success = value,
                            FIELD_ERROR => outcomes.error = value,
                            _ => {}
                        }
                    }
                }
            }
        }
        stats
    }
}

/// Reader for the statistics families
///
/// Read failures are returned to the caller; reporting is not on the request
/// path and has no safe default.
pub struct Stats<S: Store + ?Sized> {
    store: Arc<S>,
    keys: Keyspace,
    guard: FailOpen,
}

impl<S: Store + ?Sized> Stats<S> {
    pub fn new(store: Arc<S>, keys: Keyspace, guard: FailOpen) -> Self {
        Self { store, keys, guard }
    }

    pub async fn global(&self) -> Result<GlobalStats, StoreError> {
        self.global_at(SystemTime::now()).await
    }

    pub async fn global_at(&self, now: SystemTime) -> Result<GlobalStats, StoreError> {
        let fields = self.read(&self.keys.global_stats(), now).await?;
        Ok(GlobalStats {
            success: count(&fields, FIELD_SUCCESS),
            error: count(&fields, FIELD_ERROR),
        })
    }

    /// The bucket for one hour; all zeros if it never existed or has expired
    pub async fn hourly(&self, hour: u64) -> Result<HourlyStats, StoreError> {
        self.hourly_at(hour, SystemTime::now()).await
    }

    pub async fn hourly_at(&self, hour: u64, now: SystemTime) -> Result<HourlyStats, StoreError> {
        let fields = self.read(&self.keys.hourly_stats(hour), now).await?;
        Ok(HourlyStats::from_fields(hour, fields))
    }

    /// The last `count` hour buckets, oldest first, ending with the hour of `now`
    pub async fn recent_hours(
        &self,
        now: SystemTime,
        count: u64,
    ) -> Result<Vec<HourlyStats>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let current = hour_of(now);
        let first = current.saturating_sub(count - 1);
        let mut buckets = Vec::with_capacity((current - first + 1) as usize);
        for hour in first..=current {
            buckets.push(self.hourly_at(hour, now).await?);
        }
        Ok(buckets)
    }

    /// Call count per endpoint across all outcomes
    pub async fn endpoints(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        self.endpoints_at(SystemTime::now()).await
    }

    pub async fn endpoints_at(&self, now: SystemTime) -> Result<BTreeMap<String, u64>, StoreError> {
        let fields = self.read(&self.keys.endpoint_stats(), now).await?;
        Ok(fields
            .into_iter()
            .map(|(endpoint, value)| (endpoint, value.max(0) as u64))
            .collect())
    }

    async fn read(&self, key: &str, now: SystemTime) -> Result<HashMap<String, i64>, StoreError> {
        self.guard.call(self.store.hash_get_all(key, now)).await
    }
}

fn count(fields: &HashMap<String, i64>, field: &str) -> u64 {
    fields.get(field).copied().unwrap_or(0).max(0) as u64
}
