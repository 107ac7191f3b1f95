//! Ban registry
//!
//! A ban is a key with a TTL. Its presence is the only thing the admission
//! check consults; the stored JSON (reason and timestamps) is informational
//! and a record that fails to parse still counts as a ban.
//!
//! Deciding *when* to ban is left to an external policy, which calls
//! [`BanRegistry::set_ban`].

use super::TurnstileError;
use super::config::MAX_DURATION;
use super::guard::FailOpen;
use super::identity::normalize_identity;
use super::keyspace::{Keyspace, unix_millis};
use super::store::{Store, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Informational payload stored with a ban
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
    pub reason: Option<String>,
    pub banned_at_ms: u64,
    pub expires_at_ms: u64,
}

/// Query and manage bans in the shared store
pub struct BanRegistry<S: Store + ?Sized> {
    store: Arc<S>,
    keys: Keyspace,
    guard: FailOpen,
}

impl<S: Store + ?Sized> BanRegistry<S> {
    pub fn new(store: Arc<S>, keys: Keyspace, guard: FailOpen) -> Self {
        Self { store, keys, guard }
    }

    /// Whether a ban is in place; `false` if the store cannot be reached
    pub async fn is_banned(&self, identity: &str) -> bool {
        self.is_banned_at(identity, SystemTime::now()).await
    }

    pub async fn is_banned_at(&self, identity: &str, now: SystemTime) -> bool {
        let key = self.keys.ban(normalize_identity(identity));
        self.guard
            .or_default("is_banned", false, self.store.exists(&key, now))
            .await
    }

    /// Ban `identity` for `ttl`, replacing any existing ban
    ///
    /// # Errors
    ///
    /// - [`TurnstileError::InvalidBan`] if `ttl` is shorter than a millisecond
    ///   or longer than [`MAX_DURATION`]
    /// - [`TurnstileError::Store`] if the write fails
    pub async fn set_ban(
        &self,
        identity: &str,
        ttl: Duration,
        reason: Option<&str>,
    ) -> Result<(), TurnstileError> {
        self.set_ban_at(identity, ttl, reason, SystemTime::now())
            .await
    }

    pub async fn set_ban_at(
        &self,
        identity: &str,
        ttl: Duration,
        reason: Option<&str>,
        now: SystemTime,
    ) -> Result<(), TurnstileError> {
        if ttl.as_millis() == 0 {
            return Err(TurnstileError::InvalidBan(
                "ban duration must be at least one millisecond".into(),
            ));
        }
        if ttl > MAX_DURATION {
            return Err(TurnstileError::InvalidBan(format!(
                "ban duration must not exceed {} seconds",
                MAX_DURATION.as_secs()
            )));
        }
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        let identity = normalize_identity(identity);
        let banned_at_ms = unix_millis(now);
        let record = BanRecord {
            reason: reason.map(str::to_string),
            banned_at_ms,
            expires_at_ms: banned_at_ms.saturating_add(ttl_ms),
        };
        let value = serde_json::to_string(&record)
            .map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

        self.guard
            .call(
                self.store
                    .set_with_ttl(&self.keys.ban(identity), &value, ttl, now),
            )
            .await?;

        tracing::info!(identity, ttl_ms, reason, "Ban recorded");
        Ok(())
    }

    /// Remove a ban before it expires, returning whether one existed
    pub async fn unban(&self, identity: &str) -> Result<bool, StoreError> {
        self.unban_at(identity, SystemTime::now()).await
    }

    pub async fn unban_at(&self, identity: &str, now: SystemTime) -> Result<bool, StoreError> {
        let identity = normalize_identity(identity);
        let removed = self
            .guard
            .call(self.store.delete(&self.keys.ban(identity), now))
            .await?;
        if removed {
            tracing::info!(identity, "Ban lifted");
        }
        Ok(removed)
    }

    /// The stored record of an active ban
    pub async fn ban_info(&self, identity: &str) -> Result<Option<BanRecord>, StoreError> {
        self.ban_info_at(identity, SystemTime::now()).await
    }

    pub async fn ban_info_at(
        &self,
        identity: &str,
        now: SystemTime,
    ) -> Result<Option<BanRecord>, StoreError> {
        let key = self.keys.ban(normalize_identity(identity));
        let raw = self.guard.call(self.store.get(&key, now)).await?;
        Ok(raw.map(|value| {
            serde_json::from_str(&value).unwrap_or(BanRecord {
                reason: None,
                banned_at_ms: 0,
                expires_at_ms: 0,
            })
        }))
    }
}
