//! Per-host call throttling for admin API requests.
//!
//! Every outgoing request awaits [`RateLimiter::limit_rate`] first. Each
//! destination origin (`scheme://host:port`) owns a bucket with the
//! timestamps of its calls during the last minute. When a call would exceed
//! the per-second or per-minute threshold, it is held back for one second
//! before being recorded. This is a coarse cooldown, not a refilling token
//! bucket.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Entries older than this are pruned from a bucket.
const WINDOW: Duration = Duration::from_secs(60);

/// Delay applied when a threshold is reached.
const COOLDOWN: Duration = Duration::from_secs(1);

/// Rate limit thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum calls per host within one second.
    pub calls_per_second: usize,
    /// Maximum calls per host within one minute.
    pub calls_per_minute: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls_per_second: 20,
            calls_per_minute: 600,
        }
    }
}

type Bucket = Arc<tokio::sync::Mutex<Vec<Instant>>>;

/// Shared per-host rate limiter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Coarse lock guarding lazy bucket creation.
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// Create a limiter with the given thresholds.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Thresholds in effect.
    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    fn bucket(&self, origin: &str) -> Bucket {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.entry(origin.to_string()).or_default().clone()
    }

    /// Wait until a call to `origin` is permitted, then record it.
    pub async fn limit_rate(&self, origin: &str) {
        let bucket = self.bucket(origin);
        let mut calls = bucket.lock().await;

        let now = Instant::now();
        calls.retain(|t| now.duration_since(*t) < WINDOW);

        let last_second = calls
            .iter()
            .filter(|t| now.duration_since(**t) < Duration::from_secs(1))
            .count();

        if last_second >= self.config.calls_per_second
            || calls.len() >= self.config.calls_per_minute
        {
            debug!(
                origin,
                last_second,
                last_minute = calls.len(),
                "Rate limit reached, cooling down"
            );
            tokio::time::sleep(COOLDOWN).await;
        }

        calls.push(Instant::now());
    }

    /// Number of calls recorded for `origin` within the last minute.
    pub async fn recent_calls(&self, origin: &str) -> usize {
        let bucket = self.bucket(origin);
        let calls = bucket.lock().await;
        let now = Instant::now();
        calls
            .iter()
            .filter(|t| now.duration_since(**t) < WINDOW)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_second: usize, per_minute: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            calls_per_second: per_second,
            calls_per_minute: per_minute,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_over_per_second_threshold_is_delayed() {
        let limiter = limiter(3, 100);
        let start = Instant::now();

        for _ in 0..3 {
            limiter.limit_rate("https://ss1:4000").await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));

        limiter.limit_rate("https://ss1:4000").await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spread_out_calls_are_not_delayed() {
        let limiter = limiter(1, 1);

        for _ in 0..3 {
            let start = Instant::now();
            limiter.limit_rate("https://ss1:4000").await;
            assert_eq!(start.elapsed(), Duration::ZERO);
            tokio::time::advance(Duration::from_secs(61)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_minute_threshold() {
        let limiter = limiter(100, 2);

        limiter.limit_rate("https://ss1:4000").await;
        tokio::time::advance(Duration::from_secs(5)).await;
        limiter.limit_rate("https://ss1:4000").await;
        tokio::time::advance(Duration::from_secs(5)).await;

        let start = Instant::now();
        limiter.limit_rate("https://ss1:4000").await;
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosts_are_independent() {
        let limiter = limiter(1, 100);
        let start = Instant::now();

        limiter.limit_rate("https://ss1:4000").await;
        limiter.limit_rate("https://ss2:4000").await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        assert_eq!(limiter.recent_calls("https://ss1:4000").await, 1);
        assert_eq!(limiter.recent_calls("https://ss2:4000").await, 1);
        assert_eq!(limiter.recent_calls("https://ss3:4000").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_old_entries_are_pruned() {
        let limiter = limiter(100, 100);
        for _ in 0..5 {
            limiter.limit_rate("https://ss1:4000").await;
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.recent_calls("https://ss1:4000").await, 0);
    }
}
