//! Request and response bodies of the HTTP API
//!
//! # Example
//!
//! A throttled admission:
//!
//! ```json
//! {
//!   "allowed": false,
//!   "decision": "throttled",
//!   "limit": 60,
//!   "remaining": 0
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use turnstile::{Admission, Decision, GlobalStats, HourlyStats};

const DEFAULT_STATS_HOURS: u64 = 24;
pub const MAX_STATS_HOURS: u64 = 720;

/// Query of `GET /admission`
#[derive(Debug, Default, Deserialize)]
pub struct AdmissionQuery {
    /// Logical endpoint being called; `"unknown"` when omitted
    pub endpoint: Option<String>,
}

/// Outcome of one admission check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionResponse {
    pub allowed: bool,
    pub decision: Decision,
    pub limit: u64,
    pub remaining: u64,
}

impl AdmissionResponse {
    /// Response used when the store could not be consulted
    pub fn fail_open(limit: u64) -> Self {
        AdmissionResponse {
            allowed: true,
            decision: Decision::Allow,
            limit,
            remaining: limit,
        }
    }
}

impl From<Admission> for AdmissionResponse {
    fn from(admission: Admission) -> Self {
        AdmissionResponse {
            allowed: admission.is_allowed(),
            decision: admission.decision,
            limit: admission.limit,
            remaining: admission.remaining(),
        }
    }
}

/// Body of `PUT /bans/{identity}`
#[derive(Debug, Serialize, Deserialize)]
pub struct BanRequest {
    /// Ban duration in seconds, must be positive
    pub ttl_secs: u64,
    /// Free-form note stored with the ban
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BanStatusResponse {
    pub identity: String,
    pub banned: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnbanResponse {
    pub identity: String,
    pub removed: bool,
}

/// Query of `GET /stats`
#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub hours: Option<u64>,
}

impl StatsQuery {
    /// Requested number of hour buckets, defaulted and capped
    pub fn hours(&self) -> u64 {
        self.hours
            .unwrap_or(DEFAULT_STATS_HOURS)
            .min(MAX_STATS_HOURS)
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub global: GlobalStats,
    pub endpoints: BTreeMap<String, u64>,
    /// Oldest first
    pub hourly: Vec<HourlyStats>,
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
