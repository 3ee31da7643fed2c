//! Rate limiter trait for abstracting over counter storage.

use async_trait::async_trait;

use super::key::ClientKey;
use super::limiter::{Decision, Limit, SlidingWindowLimiter};

/// Trait for rate limiter implementations.
///
/// This trait abstracts the decision primitive so the HTTP layer can work
/// against the in-process [`SlidingWindowLimiter`] today and a shared
/// external counter store later without changing shape.
#[async_trait]
pub trait LimiterBackend: Send + Sync {
    /// Check the rate limit for a key, recording the request if allowed.
    async fn check(&self, key: &ClientKey, limit: &Limit) -> Decision;
}

#[async_trait]
impl LimiterBackend for SlidingWindowLimiter {
    async fn check(&self, key: &ClientKey, limit: &Limit) -> Decision {
        SlidingWindowLimiter::check(self, key, limit)
    }
}
