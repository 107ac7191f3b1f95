//! HTTP/JSON transport
//!
//! The admission endpoint reads the caller identity from the request's own
//! headers, so the server can sit behind a reverse proxy as a forward-auth
//! check.
//!
//! # API Endpoints
//!
//! ## GET /admission?endpoint=<name>
//!
//! Run one admission check. The status code carries the decision:
//! `200` allowed, `429` throttled, `403` banned. Every response includes
//! `X-RateLimit-Limit` and `X-RateLimit-Remaining`.
//!
//! ```json
//! {
//!   "allowed": true,
//!   "decision": "allow",
//!   "limit": 60,
//!   "remaining": 59
//! }
//! ```
//!
//! If the store cannot be reached the request is allowed.
//!
//! ## GET /bans/{identity}
//!
//! `{"identity": "203.0.113.7", "banned": true}`
//!
//! ## PUT /bans/{identity}
//!
//! Body `{"ttl_secs": 3600, "reason": "credential stuffing"}`. Returns `204`,
//! `400` for a zero TTL or one longer than 100 years, `503` if the store
//! fails.
//!
//! ## DELETE /bans/{identity}
//!
//! `{"identity": "203.0.113.7", "removed": true}`
//!
//! ## GET /stats?hours=<n>
//!
//! Global counters, per-endpoint call counts and the last `n` hour buckets
//! (default 24, at most 720).
//!
//! ## GET /health
//!
//! Health check endpoint. Returns "OK" with 200 status.

use super::Transport;
use crate::types::{
    AdmissionQuery, AdmissionResponse, BanRequest, BanStatusResponse, ErrorResponse, StatsQuery,
    StatsResponse, UnbanResponse,
};
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use turnstile::{Decision, Turnstile, TurnstileError, UNKNOWN_IDENTITY, extract_identity};

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// HTTP transport implementation
pub struct HttpTransport {
    host: String,
    port: u16,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(self, turnstile: Turnstile) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.host, self.port).parse()?;
        let app = router(turnstile);

        tracing::info!("HTTP server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

struct AppState {
    turnstile: Turnstile,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Build the application router
pub fn router(turnstile: Turnstile) -> Router {
    let app_state = Arc::new(AppState { turnstile });

    Router::new()
        .route("/admission", get(handle_admission))
        .route(
            "/bans/{identity}",
            get(handle_ban_status)
                .put(handle_set_ban)
                .delete(handle_unban),
        )
        .route("/stats", get(handle_stats))
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
}

async fn handle_admission(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdmissionQuery>,
    headers: HeaderMap,
) -> Response {
    let identity = extract_identity(&headers);
    let endpoint = query.endpoint.as_deref().unwrap_or(UNKNOWN_IDENTITY);

    let response = match state
        .turnstile
        .admit(&identity, endpoint, SystemTime::now())
        .await
    {
        Ok(admission) => {
            if !admission.is_allowed() {
                tracing::debug!(
                    identity = %identity,
                    endpoint,
                    decision = admission.decision.as_str(),
                    "Request denied"
                );
            }
            AdmissionResponse::from(admission)
        }
        Err(e) => {
            tracing::warn!(
                identity = %identity,
                endpoint,
                error = %e,
                "Admission check failed, failing open"
            );
            AdmissionResponse::fail_open(state.turnstile.config().limit)
        }
    };

    let status = match response.decision {
        Decision::Allow => StatusCode::OK,
        Decision::Throttled => StatusCode::TOO_MANY_REQUESTS,
        Decision::Banned => StatusCode::FORBIDDEN,
    };

    (
        status,
        [
            (LIMIT_HEADER, response.limit.to_string()),
            (REMAINING_HEADER, response.remaining.to_string()),
        ],
        Json(response),
    )
        .into_response()
}

async fn handle_ban_status(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Json<BanStatusResponse> {
    let banned = state.turnstile.is_banned(&identity).await;
    Json(BanStatusResponse { identity, banned })
}

async fn handle_set_ban(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
    Json(req): Json<BanRequest>,
) -> Result<StatusCode, ApiError> {
    let ttl = Duration::from_secs(req.ttl_secs);

    match state
        .turnstile
        .set_ban(&identity, ttl, req.reason.as_deref())
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e @ TurnstileError::InvalidBan(_)) => Err(error(StatusCode::BAD_REQUEST, e)),
        Err(e) => {
            tracing::error!(identity = %identity, error = %e, "Failed to set ban");
            Err(error(StatusCode::SERVICE_UNAVAILABLE, e))
        }
    }
}

async fn handle_unban(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Result<Json<UnbanResponse>, ApiError> {
    match state.turnstile.unban(&identity).await {
        Ok(removed) => Ok(Json(UnbanResponse { identity, removed })),
        Err(e) => {
            tracing::error!(identity = %identity, error = %e, "Failed to lift ban");
            Err(error(StatusCode::SERVICE_UNAVAILABLE, e))
        }
    }
}

async fn handle_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.turnstile.stats();
    let now = SystemTime::now();

    let result = async {
        Ok::<_, turnstile::StoreError>(StatsResponse {
            global: stats.global_at(now).await?,
            endpoints: stats.endpoints_at(now).await?,
            hourly: stats.recent_hours(now, query.hours()).await?,
        })
    }
    .await;

    result.map(Json).map_err(|e| {
        tracing::error!(error = %e, "Failed to read statistics");
        error(StatusCode::SERVICE_UNAVAILABLE, e)
    })
}

fn error(status: StatusCode, e: impl std::fmt::Display) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}
