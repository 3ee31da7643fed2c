//! Core sliding-window rate limiter implementation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::error::{GatelimitError, Result};

use super::key::ClientKey;

/// A validated rate limit: at most `max_requests` accepted requests within
/// any sliding window of `window_ms` milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limit {
    max_requests: u32,
    window_ms: i64,
}

impl Limit {
    /// Create a new limit.
    ///
    /// Fails fast on non-positive values rather than letting a zero limit
    /// or zero window distort the counting arithmetic downstream.
    pub fn new(max_requests: u32, window_ms: i64) -> Result<Self> {
        if max_requests == 0 {
            return Err(GatelimitError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window_ms <= 0 {
            return Err(GatelimitError::Config(format!(
                "window_ms must be greater than zero, got {}",
                window_ms
            )));
        }
        Ok(Self {
            max_requests,
            window_ms,
        })
    }

    /// Maximum number of requests allowed within the window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }
}

/// The outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is allowed to proceed
    pub allowed: bool,
    /// Remaining quota in the current window after this check
    pub remaining: u32,
    /// When quota next becomes available.
    ///
    /// On an allowed request this is `now + window`. On a denial it is
    /// anchored to the oldest timestamp still inside the window, which is
    /// what makes the window slide instead of resetting in fixed buckets.
    pub reset_time: DateTime<Utc>,
}

impl Decision {
    /// Seconds until `reset_time`, rounded up and clamped at zero.
    ///
    /// Suitable for a `Retry-After` header.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let ms = self
            .reset_time
            .timestamp_millis()
            .saturating_sub(now.timestamp_millis());
        if ms <= 0 {
            0
        } else {
            ((ms + 999) / 1000) as u64
        }
    }
}

/// Per-key counter state: the accepted-request timestamps still inside the
/// tracking window, in chronological order.
#[derive(Debug)]
struct WindowEntry {
    timestamps: Vec<i64>,
    /// Window length last used to evaluate this key, retained so the
    /// sweeper knows when the whole entry has aged out.
    window_ms: i64,
}

impl WindowEntry {
    fn new(window_ms: i64) -> Self {
        Self {
            timestamps: Vec::new(),
            window_ms,
        }
    }

    /// True once every stored timestamp has aged out of the window.
    fn is_idle(&self, now_ms: i64) -> bool {
        match self.timestamps.last() {
            Some(&newest) => newest + self.window_ms <= now_ms,
            None => true,
        }
    }
}

/// The core rate limiter that manages per-key sliding windows.
///
/// This struct is thread-safe and can be shared across multiple tasks. The
/// read-modify-write on a key's timestamps happens under that key's map
/// entry lock, so two concurrent checks for the same key cannot both
/// observe spare capacity and overshoot the limit.
pub struct SlidingWindowLimiter {
    /// Counter state indexed by client key
    entries: DashMap<ClientKey, WindowEntry>,
}

impl SlidingWindowLimiter {
    /// Create a new limiter with no tracked keys.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Check the rate limit for a key against the current wall-clock time.
    pub fn check(&self, key: &ClientKey, limit: &Limit) -> Decision {
        self.check_at(key, limit, Utc::now())
    }

    /// Check the rate limit for a key at an explicit instant.
    ///
    /// Timestamps that have aged out of `[now - window, now]` are pruned
    /// lazily here, on access, and the pruned state is persisted. On an
    /// allowed request `now` is appended to the key's timestamps.
    pub fn check_at(&self, key: &ClientKey, limit: &Limit, now: DateTime<Utc>) -> Decision {
        let now_ms = now.timestamp_millis();
        let window_start = now_ms - limit.window_ms();

        trace!(key = %key, "Checking rate limit");

        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| WindowEntry::new(limit.window_ms()));
        entry.window_ms = limit.window_ms();
        entry.timestamps.retain(|&ts| ts > window_start);

        if entry.timestamps.len() >= limit.max_requests() as usize {
            // At capacity. Quota frees up when the oldest surviving
            // timestamp leaves the window.
            let oldest = entry.timestamps[0];
            debug!(key = %key, limit = limit.max_requests(), "Rate limit exceeded");
            return Decision {
                allowed: false,
                remaining: 0,
                reset_time: instant_from_ms(oldest + limit.window_ms()),
            };
        }

        entry.timestamps.push(now_ms);
        Decision {
            allowed: true,
            remaining: limit.max_requests() - entry.timestamps.len() as u32,
            reset_time: instant_from_ms(now_ms + limit.window_ms()),
        }
    }

    /// Remove every key whose stored timestamps have all aged out.
    ///
    /// Returns the number of keys removed. Lazy pruning alone never deletes
    /// a key, so without this sweep the map grows by one entry per distinct
    /// client ever seen.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let now_ms = now.timestamp_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_idle(now_ms));
        before - self.entries.len()
    }

    /// Get the number of timestamps currently stored for a key.
    ///
    /// Returns `None` if the key has never been seen.
    pub fn occupancy(&self, key: &ClientKey) -> Option<usize> {
        self.entries.get(key).map(|e| e.timestamps.len())
    }

    /// Clear all tracked keys.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Get the number of tracked keys.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that periodically evicts idle keys.
///
/// The task runs until aborted or the runtime shuts down.
pub fn spawn_sweeper(
    limiter: Arc<SlidingWindowLimiter>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh process
        // does not sweep an empty map.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.evict_stale(Utc::now());
            if removed > 0 {
                debug!(
                    removed = removed,
                    remaining = limiter.entry_count(),
                    "Evicted idle rate limit keys"
                );
            }
        }
    })
}

fn instant_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        instant_from_ms(ms)
    }

    #[test]
    fn test_limit_rejects_zero_max_requests() {
        assert!(Limit::new(0, 1000).is_err());
    }

    #[test]
    fn test_limit_rejects_non_positive_window() {
        assert!(Limit::new(5, 0).is_err());
        assert!(Limit::new(5, -1).is_err());
    }

    #[test]
    fn test_first_requests_allowed_with_decreasing_remaining() {
        let limiter = SlidingWindowLimiter::new();
        let key = ClientKey::new("api", "10.0.0.1");
        let limit = Limit::new(3, 60_000).unwrap();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at(&key, &limit, at(0));
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
    }

    #[test]
    fn test_request_over_capacity_denied() {
        let limiter = SlidingWindowLimiter::new();
        let key = ClientKey::new("api", "10.0.0.1");
        let limit = Limit::new(2, 60_000).unwrap();

        limiter.check_at(&key, &limit, at(0));
        limiter.check_at(&key, &limit, at(10));

        let decision = limiter.check_at(&key, &limit, at(20));
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_reset_time_anchored_to_oldest_timestamp() {
        let limiter = SlidingWindowLimiter::new();
        let key = ClientKey::new("api", "10.0.0.1");
        let limit = Limit::new(2, 60_000).unwrap();

        limiter.check_at(&key, &limit, at(1_000));
        limiter.check_at(&key, &limit, at(2_000));

        // Denied at t=3000: quota frees up when the t=1000 entry leaves
        // the window, not a full window from now.
        let decision = limiter.check_at(&key, &limit, at(3_000));
        assert!(!decision.allowed);
        assert_eq!(decision.reset_time, at(61_000));
    }

    #[test]
    fn test_window_slides_rather_than_resetting() {
        let limiter = SlidingWindowLimiter::new();
        let key = ClientKey::new("auth", "10.0.0.1");
        let limit = Limit::new(5, 900_000).unwrap();

        for expected_remaining in [4, 3, 2, 1, 0] {
            let decision = limiter.check_at(&key, &limit, at(0));
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check_at(&key, &limit, at(0));
        assert!(!denied.allowed);
        assert_eq!(denied.reset_time, at(900_000));

        // One millisecond past the reset, the whole window has slid clear.
        let decision = limiter.check_at(&key, &limit, at(900_001));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
    }

    #[test]
    fn test_partial_expiry_frees_partial_quota() {
        let limiter = SlidingWindowLimiter::new();
        let key = ClientKey::new("api", "10.0.0.1");
        let limit = Limit::new(2, 1_000).unwrap();

        limiter.check_at(&key, &limit, at(0));
        limiter.check_at(&key, &limit, at(600));
        assert!(!limiter.check_at(&key, &limit, at(900)).allowed);

        // t=0 has aged out at t=1001, t=600 has not.
        let decision = limiter.check_at(&key, &limit, at(1_001));
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(limiter.occupancy(&key), Some(2));
    }

    #[test]
    fn test_different_keys_have_separate_counters() {
        let limiter = SlidingWindowLimiter::new();
        let limit = Limit::new(1, 60_000).unwrap();
        let key1 = ClientKey::new("api", "10.0.0.1");
        let key2 = ClientKey::new("api", "10.0.0.2");
        let key3 = ClientKey::new("auth", "10.0.0.1");

        assert!(limiter.check_at(&key1, &limit, at(0)).allowed);
        assert!(!limiter.check_at(&key1, &limit, at(1)).allowed);

        // Other keys are unaffected by key1 being at capacity.
        assert!(limiter.check_at(&key2, &limit, at(2)).allowed);
        assert!(limiter.check_at(&key3, &limit, at(3)).allowed);
    }

    #[test]
    fn test_stale_timestamps_pruned_on_next_access() {
        let limiter = SlidingWindowLimiter::new();
        let key = ClientKey::new("api", "10.0.0.1");
        let limit = Limit::new(2, 1_000).unwrap();

        limiter.check_at(&key, &limit, at(0));
        limiter.check_at(&key, &limit, at(100));
        assert_eq!(limiter.occupancy(&key), Some(2));

        // Long after both aged out, the stale timestamps are still stored
        // until the next access prunes them.
        let decision = limiter.check_at(&key, &limit, at(10_000));
        assert!(decision.allowed);
        assert_eq!(limiter.occupancy(&key), Some(1));
    }

    #[test]
    fn test_evict_stale_drops_idle_keys_only() {
        let limiter = SlidingWindowLimiter::new();
        let limit = Limit::new(5, 1_000).unwrap();
        let idle = ClientKey::new("api", "10.0.0.1");
        let live = ClientKey::new("api", "10.0.0.2");

        limiter.check_at(&idle, &limit, at(0));
        limiter.check_at(&live, &limit, at(5_000));
        assert_eq!(limiter.entry_count(), 2);

        let removed = limiter.evict_stale(at(5_500));
        assert_eq!(removed, 1);
        assert_eq!(limiter.entry_count(), 1);
        assert_eq!(limiter.occupancy(&idle), None);
        assert_eq!(limiter.occupancy(&live), Some(1));
    }

    #[test]
    fn test_clear() {
        let limiter = SlidingWindowLimiter::new();
        let limit = Limit::new(5, 1_000).unwrap();

        limiter.check_at(&ClientKey::new("api", "10.0.0.1"), &limit, at(0));
        assert_eq!(limiter.entry_count(), 1);

        limiter.clear();
        assert_eq!(limiter.entry_count(), 0);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = Decision {
            allowed: false,
            remaining: 0,
            reset_time: at(10_500),
        };

        assert_eq!(decision.retry_after_secs(at(10_000)), 1);
        assert_eq!(decision.retry_after_secs(at(8_000)), 3);
        // Clamped once the reset has passed.
        assert_eq!(decision.retry_after_secs(at(11_000)), 0);
    }
}
