//! Admission controller
//!
//! This module provides [`Turnstile`], the entry point that resolves a caller,
//! runs one atomic admission against the store, and fails open on any store
//! error.
//!
//! Windows are fixed, anchored at the first request: the counter key is
//! created with a TTL of one window and counts every request until it
//! expires. Up to roughly twice the limit can get through across a window
//! boundary, in exchange for one integer of state per caller.

use super::bans::BanRegistry;
use super::config::LimiterConfig;
use super::guard::FailOpen;
use super::identity::{HeaderAccessor, extract_identity, normalize_endpoint, normalize_identity};
use super::keyspace::{FIELD_BANNED, FIELD_ERROR, FIELD_SUCCESS, FIELD_THROTTLED, Keyspace};
use super::stats::Stats;
use super::store::{AdmissionOp, Store, StoreError};
use super::{BanRecord, TurnstileError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Outcome of one admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Under the limit
    Allow,
    /// Over the limit for the current window
    Throttled,
    /// A ban record exists for the caller
    Banned,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Throttled => FIELD_THROTTLED,
            Decision::Banned => FIELD_BANNED,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "allow" => Some(Decision::Allow),
            FIELD_THROTTLED => Some(Decision::Throttled),
            FIELD_BANNED => Some(Decision::Banned),
            _ => None,
        }
    }

    /// Statistics class: `success` for admitted requests, `error` otherwise
    pub fn class(self) -> &'static str {
        if self.is_allowed() {
            FIELD_SUCCESS
        } else {
            FIELD_ERROR
        }
    }

    /// Hourly breakdown field for denied requests
    pub fn action_field(self) -> Option<&'static str> {
        match self {
            Decision::Allow => None,
            Decision::Throttled => Some(FIELD_THROTTLED),
            Decision::Banned => Some(FIELD_BANNED),
        }
    }
}

/// Decision plus the window state it was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub decision: Decision,
    /// Window count after this request; zero when banned
    pub count: u64,
    /// Requests allowed per window
    pub limit: u64,
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    /// Requests left in the current window
    pub fn remaining(&self) -> u64 {
        match self.decision {
            Decision::Banned => 0,
            _ => self.limit.saturating_sub(self.count),
        }
    }
}

/// Admission controller bound to one store and configuration
///
/// Cheap to clone; clones share the store.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::SystemTime;
/// use turnstile::{Decision, LimiterConfig, MemoryStore, Turnstile};
///
/// # tokio_test::block_on(async {
/// let config = LimiterConfig::builder().limit(2).build()?;
/// let turnstile = Turnstile::new(Arc::new(MemoryStore::new()), config)?;
///
/// let now = SystemTime::now();
/// assert!(turnstile.admit("198.51.100.4", "search", now).await?.is_allowed());
/// assert!(turnstile.admit("198.51.100.4", "search", now).await?.is_allowed());
/// let third = turnstile.admit("198.51.100.4", "search", now).await?;
/// assert_eq!(third.decision, Decision::Throttled);
/// # Ok::<(), turnstile::TurnstileError>(())
/// # })?;
/// # Ok::<(), turnstile::TurnstileError>(())
/// ```
pub struct Turnstile<S: Store + ?Sized = dyn Store> {
    store: Arc<S>,
    config: LimiterConfig,
    keys: Keyspace,
    guard: FailOpen,
}

impl<S: Store + ?Sized> Clone for Turnstile<S> {
    fn clone(&self) -> Self {
        Turnstile {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            keys: self.keys.clone(),
            guard: self.guard,
        }
    }
}

impl<S: Store + ?Sized> Turnstile<S> {
    /// Create a controller over `store`
    ///
    /// # Errors
    ///
    /// Returns [`TurnstileError::InvalidConfig`] if `config` does not validate.
    pub fn new(store: Arc<S>, config: LimiterConfig) -> Result<Self, TurnstileError> {
        config.validate()?;
        Ok(Turnstile {
            store,
            keys: Keyspace::new(config.key_prefix.clone()),
            guard: FailOpen::new(config.command_timeout),
            config,
        })
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    pub fn keys(&self) -> &Keyspace {
        &self.keys
    }

    /// Decide whether to admit a request
    ///
    /// Resolves the caller from `headers`, runs one atomic admission for
    /// `endpoint`, and returns `true` iff the decision is ALLOW. Store
    /// failures and timeouts admit the request and log a warning.
    pub async fn check_admission<H: HeaderAccessor + ?Sized>(
        &self,
        headers: &H,
        endpoint: &str,
    ) -> bool {
        self.check_admission_at(headers, endpoint, SystemTime::now())
            .await
    }

    /// [`check_admission`](Self::check_admission) with an explicit clock
    pub async fn check_admission_at<H: HeaderAccessor + ?Sized>(
        &self,
        headers: &H,
        endpoint: &str,
        now: SystemTime,
    ) -> bool {
        let identity = extract_identity(headers);
        self.check_identity_at(&identity, endpoint, now).await
    }

    /// Fail-open admission for an already resolved identity
    pub async fn check_identity_at(&self, identity: &str, endpoint: &str, now: SystemTime) -> bool {
        match self.guard.call(self.run(identity, endpoint, now)).await {
            Ok(admission) => {
                if !admission.is_allowed() {
                    tracing::debug!(
                        identity,
                        endpoint,
                        decision = admission.decision.as_str(),
                        count = admission.count,
                        "Request denied"
                    );
                }
                admission.is_allowed()
            }
            Err(e) => {
                tracing::warn!(
                    identity,
                    endpoint,
                    error = %e,
                    "Admission check failed, failing open"
                );
                true
            }
        }
    }

    /// Run one admission and report the full outcome
    ///
    /// Unlike [`check_admission`](Self::check_admission) this does not fail
    /// open; the caller decides what a store error means.
    pub async fn admit(
        &self,
        identity: &str,
        endpoint: &str,
        now: SystemTime,
    ) -> Result<Admission, StoreError> {
        self.guard.call(self.run(identity, endpoint, now)).await
    }

    async fn run(
        &self,
        identity: &str,
        endpoint: &str,
        now: SystemTime,
    ) -> Result<Admission, StoreError> {
        let identity = normalize_identity(identity);
        let endpoint = normalize_endpoint(endpoint);
        let op = AdmissionOp::new(&self.keys, &self.config, identity, endpoint, now);
        self.store.admit(&op).await
    }

    /// Ban registry sharing this controller's store and namespace
    pub fn bans(&self) -> BanRegistry<S> {
        BanRegistry::new(Arc::clone(&self.store), self.keys.clone(), self.guard)
    }

    /// Statistics reader sharing this controller's store and namespace
    pub fn stats(&self) -> Stats<S> {
        Stats::new(Arc::clone(&self.store), self.keys.clone(), self.guard)
    }

    /// Whether `identity` is currently banned; `false` if the store fails
    pub async fn is_banned(&self, identity: &str) -> bool {
        self.bans().is_banned(identity).await
    }

    /// Ban `identity` for `ttl`
    pub async fn set_ban(
        &self,
        identity: &str,
        ttl: Duration,
        reason: Option<&str>,
    ) -> Result<(), TurnstileError> {
        self.bans().set_ban(identity, ttl, reason).await
    }

    /// Lift a ban early, returning whether one was in place
    pub async fn unban(&self, identity: &str) -> Result<bool, TurnstileError> {
        Ok(self.bans().unban(identity).await?)
    }

    /// Informational record of an active ban
    pub async fn ban_info(&self, identity: &str) -> Result<Option<BanRecord>, TurnstileError> {
        Ok(self.bans().ban_info(identity).await?)
    }
}
