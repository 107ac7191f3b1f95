use super::{AdmissionOp, Store, StoreError};
use crate::core::admission::{Admission, Decision};
use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::{Client, ErrorKind, RedisError, Script};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::sync::OnceCell;

const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 250;
const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 250;
const DEFAULT_CONNECT_RETRIES: usize = 1;

/// Redis-backed store shared by every worker process
///
/// The admission algorithm runs as a Lua script inside Redis (`EVALSHA`, with
/// an automatic `EVAL` fallback when the script cache is cold), so the ban
/// check, window increment and statistics updates execute as one unit no
/// matter how many processes call in.
///
/// The connection is established lazily on first use and re-established by
/// the underlying [`ConnectionManager`] after it drops.
///
/// # Example
///
/// ```no_run
/// use turnstile::RedisStore;
/// use std::time::Duration;
///
/// let store = RedisStore::builder("redis://127.0.0.1:6379/")
///     .response_timeout(Duration::from_millis(100))
///     .build()?;
/// # Ok::<(), turnstile::StoreError>(())
/// ```
pub struct RedisStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    script: Script,
    connection_timeout: Duration,
    response_timeout: Duration,
    connect_retries: usize,
}

/// Builder for configuring a [`RedisStore`]
pub struct RedisStoreBuilder {
    url: String,
    connection_timeout: Duration,
    response_timeout: Duration,
    connect_retries: usize,
}

impl RedisStore {
    /// Create a store for `url` with default timeouts
    ///
    /// No connection is made until the first call.
    pub fn new(url: &str) -> Result<Self, StoreError> {
        Self::builder(url).build()
    }

    pub fn builder(url: impl Into<String>) -> RedisStoreBuilder {
        RedisStoreBuilder {
            url: url.into(),
            connection_timeout: Duration::from_millis(DEFAULT_CONNECTION_TIMEOUT_MS),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            connect_retries: DEFAULT_CONNECT_RETRIES,
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.connection
            .get_or_try_init(|| async {
                let config = ConnectionManagerConfig::new()
                    .set_connection_timeout(self.connection_timeout)
                    .set_response_timeout(self.response_timeout)
                    .set_number_of_retries(self.connect_retries);
                tracing::debug!("Connecting to Redis");
                ConnectionManager::new_with_config(self.client.clone(), config)
                    .await
                    .map_err(|e| self.classify(e))
            })
            .await
            .cloned()
    }

    fn classify(&self, err: RedisError) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.response_timeout)
        } else if err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_io_error()
            || err.is_unrecoverable_error()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            match err.kind() {
                ErrorKind::TypeError => StoreError::InvalidResponse(err.to_string()),
                ErrorKind::InvalidClientConfig => StoreError::Config(err.to_string()),
                _ => StoreError::Command(err.to_string()),
            }
        }
    }
}

/// Whole milliseconds as Redis accepts them for PX and PEXPIRE
fn millis(duration: Duration) -> Result<i64, StoreError> {
    i64::try_from(duration.as_millis())
        .map_err(|_| StoreError::Command(format!("expiry of {duration:?} is out of range")))
}

#[async_trait]
impl Store for RedisStore {
    async fn admit(&self, op: &AdmissionOp<'_>) -> Result<Admission, StoreError> {
        let window_ms = millis(op.window)?;
        let hourly_ttl_ms = millis(op.hourly_ttl)?;
        let retention_ms = millis(op.retention)?;
        let mut conn = self.connection().await?;

        let mut invocation = self.script.prepare_invoke();
        invocation
            .key(&op.ban_key)
            .key(&op.window_key)
            .key(&op.global_key)
            .key(&op.hourly_key)
            .key(&op.endpoints_key)
            .arg(op.limit)
            .arg(window_ms)
            .arg(hourly_ttl_ms)
            .arg(retention_ms)
            .arg(op.endpoint);

        let (decision, count): (String, i64) = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.classify(e))?;

        let decision = Decision::parse(&decision).ok_or_else(|| {
            StoreError::InvalidResponse(format!("unknown admission decision '{decision}'"))
        })?;

        Ok(Admission {
            decision,
            count: count.max(0) as u64,
            limit: op.limit,
        })
    }

    async fn exists(&self, key: &str, _now: SystemTime) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        ::redis::cmd("EXISTS")
            .arg(key)
            .query_async::<bool>(&mut conn)
            .await
            .map_err(|e| self.classify(e))
    }

    async fn get(&self, key: &str, _now: SystemTime) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        ::redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(|e| self.classify(e))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
        _now: SystemTime,
    ) -> Result<(), StoreError> {
        let ttl_ms = millis(ttl)?.max(1);
        let mut conn = self.connection().await?;
        ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| self.classify(e))
    }

    async fn delete(&self, key: &str, _now: SystemTime) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let removed = ::redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(removed > 0)
    }

    async fn hash_get_all(
        &self,
        key: &str,
        _now: SystemTime,
    ) -> Result<HashMap<String, i64>, StoreError> {
        let mut conn = self.connection().await?;
        ::redis::cmd("HGETALL")
            .arg(key)
            .query_async::<HashMap<String, i64>>(&mut conn)
            .await
            .map_err(|e| self.classify(e))
    }
}

impl RedisStoreBuilder {
    /// Bound on establishing a connection
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Bound on a single command round trip
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Reconnection attempts made by the connection manager
    pub fn connect_retries(mut self, retries: usize) -> Self {
        self.connect_retries = retries;
        self
    }

    /// Parse the URL and build the store
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the URL cannot be parsed.
    pub fn build(self) -> Result<RedisStore, StoreError> {
        let client = Client::open(self.url.as_str())
            .map_err(|e| StoreError::Config(format!("invalid Redis URL '{}': {e}", self.url)))?;

        Ok(RedisStore {
            client,
            connection: OnceCell::new(),
            script: Script::new(include_str!("admission.lua")),
            connection_timeout: self.connection_timeout,
            response_timeout: self.response_timeout,
            connect_retries: self.connect_retries,
        })
    }
}
