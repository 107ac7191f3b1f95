//! # Turnstile
//!
//! Fixed-window admission control for stateless request handlers that share one
//! external key-value store.
//!
//! ## Overview
//!
//! Every request is evaluated with a single atomic operation against the store,
//! which at once:
//! - checks the ban registry for the caller,
//! - increments the caller's fixed-window counter,
//! - updates global, hourly and per-endpoint statistics,
//! - returns an admission decision.
//!
//! If the store cannot be reached the request is admitted and a warning is
//! logged.
//!
//! ## Quick Start
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use turnstile::{LimiterConfig, MemoryStore, Turnstile};
//!
//! # tokio_test::block_on(async {
//! let turnstile = Turnstile::new(Arc::new(MemoryStore::new()), LimiterConfig::default())?;
//!
//! let mut headers = HashMap::new();
//! headers.insert("X-Real-IP".to_string(), "203.0.113.7".to_string());
//!
//! if turnstile.check_admission(&headers, "posts.list").await {
//!     println!("request admitted");
//! }
//! # Ok::<(), turnstile::TurnstileError>(())
//! # })?;
//! # Ok::<(), turnstile::TurnstileError>(())
//! ```
//!
//! ## Stores
//!
//! ### [`RedisStore`]
//! Runs the admission algorithm as a Lua script inside Redis, so every worker
//! process sees the same counters and the check-and-increment is indivisible.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use turnstile::{LimiterConfig, RedisStore, Turnstile};
//!
//! let store = RedisStore::builder("redis://127.0.0.1/")
//!     .connection_timeout(Duration::from_millis(200))
//!     .response_timeout(Duration::from_millis(200))
//!     .build()?;
//! let turnstile = Turnstile::new(Arc::new(store), LimiterConfig::default())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### [`MemoryStore`]
//! In-process store for single-process deployments and tests. Expired entries
//! are swept at a fixed interval.
//!
//! ```
//! use turnstile::MemoryStore;
//!
//! let store = MemoryStore::builder()
//!     .capacity(100_000)
//!     .cleanup_interval(std::time::Duration::from_secs(60))
//!     .build();
//! ```
//!
//! ## Bans
//!
//! Bans are written by an external escalation policy through
//! [`Turnstile::set_ban`] and expire on their own. While a ban is present every
//! admission check for that identity is denied.
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash in the in-memory store
//! - `http` (default): [`HeaderAccessor`] for `http::HeaderMap`

pub mod core;

pub use core::{
    Admission, AdmissionOp, BanRecord, BanRegistry, Decision, FailOpen, GlobalStats,
    HeaderAccessor, HourlyStats, Keyspace, LimiterConfig, LimiterConfigBuilder, MAX_DURATION,
    MemoryStore, MemoryStoreBuilder, RedisStore, RedisStoreBuilder, Stats, Store, StoreError,
    Turnstile, TurnstileError, UNKNOWN_IDENTITY, extract_identity,
};

pub use crate::core::store;
