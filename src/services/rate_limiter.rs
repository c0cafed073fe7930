//! Sliding-window rate limiting
//!
//! Each limiter remembers the timestamps of recent hits per key and refuses
//! once `max` hits fall inside the window. State is in-process only.

use crate::config::RateLimitConfig;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Keyed sliding-window limiter
pub struct RateLimiter {
    max: usize,
    window: Duration,
    hits: Arc<RwLock<HashMap<String, Vec<DateTime<Utc>>>>>,
}

impl RateLimiter {
    pub fn new(max: usize, window: std::time::Duration) -> Self {
        Self {
            max,
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::minutes(15)),
            hits: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Whether `key` has already used up its window
    pub async fn is_limited(&self, key: &str) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut hits = self.hits.write().await;
        match hits.get_mut(key) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= self.max
            }
            None => false,
        }
    }

    /// Count one hit against `key`
    pub async fn record(&self, key: &str) {
        let mut hits = self.hits.write().await;
        hits.entry(key.to_string()).or_default().push(Utc::now());
    }

    /// Record a hit unless the key is limited. Returns whether it was allowed.
    pub async fn check_and_record(&self, key: &str) -> bool {
        let now = Utc::now();
        let cutoff = now - self.window;
        let mut hits = self.hits.write().await;
        let times = hits.entry(key.to_string()).or_default();
        times.retain(|t| *t > cutoff);
        if times.len() >= self.max {
            return false;
        }
        times.push(now);
        true
    }

    /// Forget every hit for `key`
    pub async fn clear(&self, key: &str) {
        self.hits.write().await.remove(key);
    }

    /// Drop stale timestamps and empty keys
    pub async fn cleanup(&self) {
        let cutoff = Utc::now() - self.window;
        let mut hits = self.hits.write().await;
        hits.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }

    /// Number of keys currently tracked
    pub async fn tracked_keys(&self) -> usize {
        self.hits.read().await.len()
    }
}

/// The limiters the HTTP layer consults
pub struct RateLimiters {
    /// Login/registration attempts, keyed by `ip:{addr}` and `email:{addr}`
    pub auth: RateLimiter,
    /// Message posting, keyed by user id
    pub message: RateLimiter,
    /// External API calls, keyed by API key
    pub api: RateLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            auth: RateLimiter::new(
                config.auth_max,
                std::time::Duration::from_secs(config.auth_window_secs),
            ),
            message: RateLimiter::new(
                config.message_max,
                std::time::Duration::from_secs(config.message_window_secs),
            ),
            api: RateLimiter::new(
                config.api_max,
                std::time::Duration::from_secs(config.api_window_secs),
            ),
        }
    }

    pub async fn cleanup(&self) {
        self.auth.cleanup().await;
        self.message.cleanup().await;
        self.api.cleanup().await;
    }
}

impl Default for RateLimiters {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_limit_reached_after_max_hits() {
        let limiter = RateLimiter::new(3, std::time::Duration::from_secs(60));

        for _ in 0..3 {
            assert!(limiter.check_and_record("k").await);
        }
        assert!(!limiter.check_and_record("k").await);
        assert!(limiter.is_limited("k").await);
        assert!(!limiter.is_limited("other").await);
    }

    #[tokio::test]
    async fn test_record_then_clear() {
        let limiter = RateLimiter::new(2, std::time::Duration::from_secs(60));
        limiter.record("ip:1.2.3.4").await;
        limiter.record("ip:1.2.3.4").await;
        assert!(limiter.is_limited("ip:1.2.3.4").await);

        limiter.clear("ip:1.2.3.4").await;
        assert!(!limiter.is_limited("ip:1.2.3.4").await);
    }

    #[tokio::test]
    async fn test_window_expiry_and_cleanup() {
        let limiter = RateLimiter::new(1, std::time::Duration::from_millis(50));
        assert!(limiter.check_and_record("k").await);
        assert!(!limiter.check_and_record("k").await);

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_keys().await, 0);
        assert!(limiter.check_and_record("k").await);
    }

    #[tokio::test]
    async fn test_bundle_uses_config() {
        let limiters = RateLimiters::from_config(&RateLimitConfig {
            auth_max: 1,
            ..RateLimitConfig::default()
        });
        assert!(limiters.auth.check_and_record("email:a@b.c").await);
        assert!(!limiters.auth.check_and_record("email:a@b.c").await);
        assert!(limiters.message.check_and_record("1").await);
    }
}
