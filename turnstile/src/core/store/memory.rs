use super::{AdmissionOp, Store, StoreError};
use crate::core::admission::{Admission, Decision};
use crate::core::config::MAX_DURATION;
use crate::core::keyspace::endpoint_field;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::{Duration, SystemTime};

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

// Configuration constants
const DEFAULT_CAPACITY: usize = 1000;
const CAPACITY_OVERHEAD_FACTOR: f64 = 1.3;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// In-process store with fixed-interval cleanup
///
/// Every operation runs under one lock, which makes [`Store::admit`]
/// indivisible for all callers sharing the store. State lives in this process
/// only, so use it for single-process deployments and tests; multi-process
/// deployments need a shared backend such as [`RedisStore`](super::RedisStore).
///
/// Expired entries are invisible as soon as their deadline passes and are
/// physically removed every `cleanup_interval`, measured on the clock passed
/// into each call.
///
/// # Example
///
/// ```
/// use turnstile::MemoryStore;
/// use std::time::Duration;
///
/// let store = MemoryStore::builder()
///     .capacity(10_000)
///     .cleanup_interval(Duration::from_secs(300))
///     .build();
/// ```
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

struct Inner {
    data: HashMap<String, Entry>,
    next_cleanup: SystemTime,
    cleanup_interval: Duration,
    expired_count: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<SystemTime>,
}

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Text(String),
    Hash(HashMap<String, i64>),
}

/// Builder for configuring a [`MemoryStore`]
pub struct MemoryStoreBuilder {
    capacity: usize,
    cleanup_interval: Duration,
}

impl MemoryStore {
    /// Create a store with default capacity and a 60 second cleanup interval
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    fn with_config(capacity: usize, cleanup_interval: Duration) -> Self {
        let cleanup_interval = cleanup_interval.min(MAX_DURATION);
        MemoryStore {
            inner: Mutex::new(Inner {
                // Pre-allocate with overhead to avoid rehashing
                data: HashMap::with_capacity(
                    (capacity as f64 * CAPACITY_OVERHEAD_FACTOR) as usize,
                ),
                next_cleanup: SystemTime::now() + cleanup_interval,
                cleanup_interval,
                expired_count: 0,
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    #[cfg(test)]
    pub(crate) fn expired_count(&self) -> usize {
        self.inner.lock().expired_count
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn maybe_clean_expired(&mut self, now: SystemTime) {
        if now >= self.next_cleanup {
            let before_count = self.data.len();
            self.data.retain(|_, entry| entry.is_live(now));
            self.expired_count = before_count.saturating_sub(self.data.len());
            self.next_cleanup = now.checked_add(self.cleanup_interval).unwrap_or(now);
        }
    }

    fn live(&self, key: &str, now: SystemTime) -> Option<&Entry> {
        self.data.get(key).filter(|entry| entry.is_live(now))
    }

    /// Live entry for `key`, replacing an expired or missing one with `fresh`
    fn live_or_insert(&mut self, key: &str, now: SystemTime, fresh: Value) -> &mut Entry {
        let entry = self.data.entry(key.to_string()).or_insert(Entry {
            value: fresh.clone(),
            expires_at: None,
        });
        if !entry.is_live(now) {
            *entry = Entry {
                value: fresh,
                expires_at: None,
            };
        }
        entry
    }

    fn incr(&mut self, key: &str, now: SystemTime) -> Result<&mut Entry, StoreError> {
        let entry = self.live_or_insert(key, now, Value::Int(0));
        match &mut entry.value {
            Value::Int(count) => *count = count.saturating_add(1),
            _ => return Err(wrong_type(key)),
        }
        Ok(entry)
    }

    fn hash_incr(
        &mut self,
        key: &str,
        field: &str,
        now: SystemTime,
    ) -> Result<&mut Entry, StoreError> {
        let entry = self.live_or_insert(key, now, Value::Hash(HashMap::new()));
        match &mut entry.value {
            Value::Hash(fields) => {
                let counter = fields.entry(field.to_string()).or_insert(0);
                *counter = counter.saturating_add(1);
            }
            _ => return Err(wrong_type(key)),
        }
        Ok(entry)
    }

    fn admit(&mut self, op: &AdmissionOp<'_>) -> Result<Admission, StoreError> {
        let now = op.now;
        // Resolve every deadline before mutating anything
        let window_expiry = deadline(now, op.window)?;
        let hourly_expiry = deadline(now, op.hourly_ttl)?;
        let retention_expiry = if op.retention.is_zero() {
            None
        } else {
            Some(deadline(now, op.retention)?)
        };
        self.maybe_clean_expired(now);

        let (decision, count) = if self.live(&op.ban_key, now).is_some() {
            (Decision::Banned, 0)
        } else {
            let entry = self.incr(&op.window_key, now)?;
            // First increment of a new window fixes its boundary
            if entry.expires_at.is_none() {
                entry.expires_at = Some(window_expiry);
            }
            let count = match entry.value {
                Value::Int(count) => count.max(0) as u64,
                _ => return Err(wrong_type(&op.window_key)),
            };
            if count <= op.limit {
                (Decision::Allow, count)
            } else {
                (Decision::Throttled, count)
            }
        };

        let class = decision.class();
        self.hash_incr(&op.global_key, class, now)?;

        for field in [Some(class), decision.action_field()].into_iter().flatten() {
            self.hash_incr(&op.hourly_key, field, now)?;
        }
        let hourly = self.hash_incr(&op.hourly_key, &endpoint_field(op.endpoint, class), now)?;
        if hourly.expires_at.is_none() {
            hourly.expires_at = Some(hourly_expiry);
        }

        let endpoints = self.hash_incr(&op.endpoints_key, op.endpoint, now)?;
        if retention_expiry.is_some() {
            endpoints.expires_at = retention_expiry;
        }

        Ok(Admission {
            decision,
            count,
            limit: op.limit,
        })
    }
}

impl Entry {
    fn is_live(&self, now: SystemTime) -> bool {
        self.expires_at.is_none_or(|expiry| expiry > now)
    }
}

/// `now + ttl`, or an error if it cannot be represented
fn deadline(now: SystemTime, ttl: Duration) -> Result<SystemTime, StoreError> {
    now.checked_add(ttl)
        .ok_or_else(|| StoreError::Command(format!("expiry of {ttl:?} is out of range")))
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Command(format!(
        "WRONGTYPE operation against key '{key}' holding the wrong kind of value"
    ))
}

#[async_trait]
impl Store for MemoryStore {
    async fn admit(&self, op: &AdmissionOp<'_>) -> Result<Admission, StoreError> {
        self.inner.lock().admit(op)
    }

    async fn exists(&self, key: &str, now: SystemTime) -> Result<bool, StoreError> {
        Ok(self.inner.lock().live(key, now).is_some())
    }

    async fn get(&self, key: &str, now: SystemTime) -> Result<Option<String>, StoreError> {
        let inner = self.inner.lock();
        match inner.live(key, now).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text.clone())),
            Some(Value::Int(n)) => Ok(Some(n.to_string())),
            Some(Value::Hash(_)) => Err(wrong_type(key)),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        now: SystemTime,
    ) -> Result<(), StoreError> {
        let expires_at = deadline(now, ttl)?;
        let mut inner = self.inner.lock();
        inner.maybe_clean_expired(now);
        inner.data.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str, now: SystemTime) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        Ok(inner
            .data
            .remove(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    async fn hash_get_all(
        &self,
        key: &str,
        now: SystemTime,
    ) -> Result<std::collections::HashMap<String, i64>, StoreError> {
        let inner = self.inner.lock();
        match inner.live(key, now).map(|entry| &entry.value) {
            None => Ok(Default::default()),
            Some(Value::Hash(fields)) => Ok(fields
                .iter()
                .map(|(field, count)| (field.clone(), *count))
                .collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }
}

impl Default for MemoryStoreBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }
}

impl MemoryStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected number of live keys
    ///
    /// The store will allocate 30% more space to reduce hash collisions.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the interval between sweeps of expired entries
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    pub fn build(self) -> MemoryStore {
        MemoryStore::with_config(self.capacity, self.cleanup_interval)
    }
}
