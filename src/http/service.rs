//! Handlers for the standalone decision API.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ratelimit::{ClientKey, LimiterBackend, PolicyTable};

/// Shared state for the decision API.
#[derive(Clone)]
pub struct AppState {
    /// The rate limiter backend
    pub backend: Arc<dyn LimiterBackend>,
    /// The validated policy table
    pub policies: Arc<RwLock<PolicyTable>>,
}

impl AppState {
    /// Create new application state.
    pub fn new(backend: Arc<dyn LimiterBackend>, policies: Arc<RwLock<PolicyTable>>) -> Self {
        Self { backend, policies }
    }
}

/// Request body for `POST /v1/check`.
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    /// Policy category to evaluate against
    #[serde(default)]
    pub category: String,
    /// Client identifier (typically an address)
    #[serde(default)]
    pub client: String,
}

/// Response body for `POST /v1/check`.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    /// Whether the request should be allowed
    pub allowed: bool,
    /// Remaining quota in the current window
    pub remaining: u32,
    /// When quota next becomes available
    pub reset_time: DateTime<Utc>,
    /// Seconds the client should wait before retrying, present on denial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Evaluate a rate limit decision for a category and client.
pub async fn check_handler(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> Response {
    if request.category.is_empty() {
        warn!("Received check request with empty category");
        return error_response(StatusCode::BAD_REQUEST, "category is required");
    }
    if request.client.is_empty() {
        warn!("Received check request with empty client");
        return error_response(StatusCode::BAD_REQUEST, "client is required");
    }

    let policy = state.policies.read().get(&request.category).cloned();
    let Some(policy) = policy else {
        warn!(category = %request.category, "Check request for unknown category");
        return error_response(StatusCode::NOT_FOUND, "unknown category");
    };

    let key = ClientKey::new(&request.category, &request.client);
    let decision = state.backend.check(&key, &policy.limit).await;
    let retry_after = (!decision.allowed).then(|| decision.retry_after_secs(Utc::now()));

    info!(
        key = %key,
        allowed = decision.allowed,
        remaining = decision.remaining,
        "Rate limit decision made"
    );

    Json(CheckResponse {
        allowed: decision.allowed,
        remaining: decision.remaining,
        reset_time: decision.reset_time,
        retry_after,
    })
    .into_response()
}

/// Liveness probe.
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "message": message,
        })),
    )
        .into_response()
}
