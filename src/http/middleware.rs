//! Rate limiting middleware for axum routers.
//!
//! Each instance of the middleware is bound to a policy category; the
//! counter key is the category plus a best-effort client address derived
//! from proxy headers or the connection itself. Internal failures of the
//! limiting path (an unknown category, in practice) are resolved by the
//! policy table's [`FailMode`] instead of failing the request outright.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use tracing::{error, warn};

use crate::ratelimit::{ClientKey, Decision, FailMode, Limit, LimiterBackend, PolicyTable};

/// Fallback client identifier when no address can be derived.
const UNKNOWN_CLIENT: &str = "unknown";

/// Shared state for the rate limiting middleware, bound to one category.
///
/// Wire up with
/// `axum::middleware::from_fn_with_state(state.for_category("auth"), rate_limit_middleware)`.
#[derive(Clone)]
pub struct RateLimitState {
    backend: Arc<dyn LimiterBackend>,
    policies: Arc<RwLock<PolicyTable>>,
    category: String,
}

impl RateLimitState {
    /// Create middleware state for a category.
    pub fn new(
        backend: Arc<dyn LimiterBackend>,
        policies: Arc<RwLock<PolicyTable>>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            policies,
            category: category.into(),
        }
    }

    /// Derive state for another category sharing the same backend and
    /// policy table.
    pub fn for_category(&self, category: impl Into<String>) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            policies: Arc::clone(&self.policies),
            category: category.into(),
        }
    }
}

/// Derive a best-effort client address from a request.
///
/// Priority order: first entry of `X-Forwarded-For`, then `X-Real-IP`,
/// then the connection's remote address, then a literal `"unknown"`.
pub fn client_addr(request: &Request) -> String {
    let headers = request.headers();

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }

    if let Some(connect_info) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return connect_info.0.ip().to_string();
    }

    UNKNOWN_CLIENT.to_string()
}

/// Axum middleware enforcing the category's rate limit policy.
///
/// Attaches `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
/// `X-RateLimit-Reset` to every evaluated response. Over-limit requests
/// receive 429 with a `Retry-After` header and a JSON rejection body.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_addr(&request);

    let (policy, fail_mode) = {
        let policies = state.policies.read();
        (policies.get(&state.category).cloned(), policies.fail_mode())
    };

    let Some(policy) = policy else {
        error!(
            category = %state.category,
            "No rate limit policy configured for category"
        );
        return match fail_mode {
            FailMode::Allow => next.run(request).await,
            FailMode::Deny => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "success": false,
                    "message": "Rate limiting unavailable.",
                })),
            )
                .into_response(),
        };
    };

    let key = ClientKey::new(&state.category, &client);
    let decision = state.backend.check(&key, &policy.limit).await;

    if decision.allowed {
        let mut response = next.run(request).await;
        apply_quota_headers(response.headers_mut(), &policy.limit, &decision);
        return response;
    }

    let retry_after = decision.retry_after_secs(Utc::now());
    warn!(
        key = %key,
        retry_after = retry_after,
        "Request rejected by rate limiter"
    );

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "success": false,
            "message": policy.message,
            "retry_after": retry_after,
        })),
    )
        .into_response();
    apply_quota_headers(response.headers_mut(), &policy.limit, &decision);
    if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

fn apply_quota_headers(headers: &mut HeaderMap, limit: &Limit, decision: &Decision) {
    if let Ok(value) = HeaderValue::from_str(&limit.max_requests().to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    let reset = decision
        .reset_time
        .to_rfc3339_opts(SecondsFormat::Secs, true);
    if let Ok(value) = HeaderValue::from_str(&reset) {
        headers.insert("x-ratelimit-reset", value);
    }
}
