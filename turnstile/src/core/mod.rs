//! Core components of the turnstile admission engine
//!
//! This module contains the building blocks:
//! - [`identity`]: Resolving a caller identity from request headers
//! - [`keyspace`]: Names of every persisted key and hash field
//! - [`store`]: Storage backends and the atomic admission operation
//! - [`admission`]: The admission controller and its fail-open entry points
//! - [`bans`]: The ban registry
//! - [`stats`]: Reading back usage statistics
//! - [`guard`]: Timeout and fail-open wrapping of store calls

pub mod admission;
pub mod bans;
pub mod config;
pub mod guard;
pub mod identity;
pub mod keyspace;
pub mod stats;
pub mod store;
#[cfg(test)]
mod tests;

pub use admission::{Admission, Decision, Turnstile};
pub use bans::{BanRecord, BanRegistry};
pub use config::{LimiterConfig, LimiterConfigBuilder, MAX_DURATION};
pub use guard::FailOpen;
pub use identity::{HeaderAccessor, UNKNOWN_IDENTITY, extract_identity};
pub use keyspace::Keyspace;
pub use stats::{EndpointOutcomes, GlobalStats, HourlyStats, Stats};
pub use store::{
    AdmissionOp, MemoryStore, MemoryStoreBuilder, RedisStore, RedisStoreBuilder, Store,
    StoreError,
};

use thiserror::Error;

/// Errors returned by constructors and management operations
///
/// The admission path never surfaces these: [`Turnstile::check_admission`]
/// fails open instead.
///
/// # Variants
///
/// - [`InvalidConfig`](TurnstileError::InvalidConfig): A limiter parameter is out of range
/// - [`InvalidBan`](TurnstileError::InvalidBan): A ban was requested with a zero duration
/// - [`Store`](TurnstileError::Store): The shared store failed
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// A limiter parameter is out of range
    #[error("invalid limiter configuration: {0}")]
    InvalidConfig(String),

    /// A ban was requested with a zero duration
    #[error("invalid ban: {0}")]
    InvalidBan(String),

    /// The shared store failed
    #[error(transparent)]
    Store(#[from] StoreError),
}
