//! Two-tier limiter registry
//!
//! One global bucket shared by all endpoints plus one bucket per endpoint key,
//! created lazily on first use. Per-endpoint buckets are never evicted.

use crate::config::RateLimitConfig;
use crate::error::{LimitScope, RateLimitError, RateLimitResult};
use crate::token_bucket::{RateLimiterMetrics, TokenBucket};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, trace};

/// Key reported for the global bucket in status listings.
pub const GLOBAL_KEY: &str = "global";

/// Limiter keys grouped by how full their bucket is.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RateLimiterStatus {
    /// More than 80% of tokens available
    pub healthy: Vec<String>,
    /// Between 20% and 80% of tokens available
    pub warning: Vec<String>,
    /// Less than 20% of tokens available
    pub limited: Vec<String>,
}

impl RateLimiterStatus {
    fn classify(&mut self, key: String, metrics: &RateLimiterMetrics) {
        let ratio = metrics.fill_ratio();
        if ratio > 0.8 {
            self.healthy.push(key);
        } else if ratio >= 0.2 {
            self.warning.push(key);
        } else {
            self.limited.push(key);
        }
    }
}

/// Global and per-endpoint token buckets.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    config: RateLimitConfig,
    global: TokenBucket,
    endpoints: DashMap<String, Arc<TokenBucket>>,
}

impl RateLimiterRegistry {
    /// Create a registry after validating the configuration.
    pub fn new(config: RateLimitConfig) -> RateLimitResult<Self> {
        config.validate()?;
        debug!(
            global_limit = config.global_limit,
            per_endpoint_limit = config.per_endpoint_limit,
            "Creating rate limiter registry"
        );

        let global = Self::bucket(&config, config.global_limit, config.global_window);
        Ok(Self {
            config,
            global,
            endpoints: DashMap::new(),
        })
    }

    fn bucket(config: &RateLimitConfig, limit: u32, window: std::time::Duration) -> TokenBucket {
        match config.burst_allowance {
            Some(burst) => TokenBucket::with_burst_allowance(limit, window, burst),
            None => TokenBucket::new(limit, window),
        }
    }

    /// The configuration in effect.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn endpoint(&self, key: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.endpoints.get(key) {
            return bucket.clone();
        }
        self.endpoints
            .entry(key.to_string())
            .or_insert_with(|| {
                trace!(key = %key, "Creating endpoint rate limiter");
                Arc::new(Self::bucket(
                    &self.config,
                    self.config.per_endpoint_limit,
                    self.config.per_endpoint_window,
                ))
            })
            .clone()
    }

    /// Admit one request for `key`, global tier first.
    pub fn check(&self, key: &str) -> RateLimitResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        if !self.global.try_consume() {
            let retry_after = self.global.wait_time();
            trace!(key = %key, ?retry_after, "Global rate limit: denied");
            return Err(RateLimitError::limit_exceeded(
                LimitScope::Global,
                self.config.global_limit,
                retry_after,
            ));
        }

        let bucket = self.endpoint(key);
        if !bucket.try_consume() {
            let retry_after = bucket.wait_time();
            trace!(key = %key, ?retry_after, "Endpoint rate limit: denied");
            return Err(RateLimitError::limit_exceeded(
                LimitScope::Endpoint,
                self.config.per_endpoint_limit,
                retry_after,
            ));
        }

        Ok(())
    }

    /// Admit a batch of `count` requests for `key` against both tiers.
    ///
    /// Tokens are taken from the global bucket before the endpoint bucket is
    /// consulted, as with [`check`](Self::check).
    pub fn check_burst(&self, key: &str, count: u32) -> RateLimitResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        if !self.global.try_consume_burst(count) {
            return Err(RateLimitError::limit_exceeded(
                LimitScope::Global,
                self.config.global_limit,
                self.global.wait_time(),
            ));
        }

        let bucket = self.endpoint(key);
        if !bucket.try_consume_burst(count) {
            return Err(RateLimitError::limit_exceeded(
                LimitScope::Endpoint,
                self.config.per_endpoint_limit,
                bucket.wait_time(),
            ));
        }

        Ok(())
    }

    /// Metrics of the global bucket.
    pub fn global_metrics(&self) -> RateLimiterMetrics {
        self.global.metrics()
    }

    /// Metrics of one endpoint bucket, if it exists.
    pub fn endpoint_metrics(&self, key: &str) -> Option<RateLimiterMetrics> {
        self.endpoints.get(key).map(|bucket| bucket.metrics())
    }

    /// Metrics of every endpoint bucket, sorted by key.
    pub fn all_endpoint_metrics(&self) -> Vec<(String, RateLimiterMetrics)> {
        let mut all: Vec<_> = self
            .endpoints
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metrics()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Number of endpoint buckets created so far.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Refill the global bucket and clear its counters.
    pub fn reset_global(&self) {
        self.global.reset();
    }

    /// Refill one endpoint bucket. Returns `false` if it does not exist.
    pub fn reset_endpoint(&self, key: &str) -> bool {
        match self.endpoints.get(key) {
            Some(bucket) => {
                bucket.reset();
                true
            }
            None => false,
        }
    }

    /// Refill every bucket.
    pub fn reset_all(&self) {
        self.global.reset();
        for entry in self.endpoints.iter() {
            entry.value().reset();
        }
    }

    /// Group every bucket, global included, by health band.
    pub fn status(&self) -> RateLimiterStatus {
        let mut status = RateLimiterStatus::default();
        status.classify(GLOBAL_KEY.to_string(), &self.global.metrics());
        for (key, metrics) in self.all_endpoint_metrics() {
            status.classify(key, &metrics);
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry(global: u32, endpoint: u32) -> RateLimiterRegistry {
        RateLimiterRegistry::new(
            RateLimitConfig::default()
                .with_global(global, Duration::from_secs(1))
                .with_per_endpoint(endpoint, Duration::from_secs(1)),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_tier_rejects_second_request() {
        let limiter = registry(100, 1);

        assert!(limiter.check("GET https://api.test/widgets").is_ok());
        let err = limiter.check("GET https://api.test/widgets").unwrap_err();

        assert_eq!(err.scope(), Some(LimitScope::Endpoint));
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoints_are_independent() {
        let limiter = registry(100, 1);

        assert!(limiter.check("GET https://api.test/a").is_ok());
        assert!(limiter.check("GET https://api.test/b").is_ok());
        assert!(limiter.check("POST https://api.test/a").is_ok());
        assert_eq!(limiter.endpoint_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_tier_checked_first() {
        let limiter = registry(2, 10);

        assert!(limiter.check("GET https://api.test/a").is_ok());
        assert!(limiter.check("GET https://api.test/b").is_ok());
        let err = limiter.check("GET https://api.test/c").unwrap_err();

        assert_eq!(err.scope(), Some(LimitScope::Global));
        // rejected globally, so no endpoint bucket was created for /c
        assert!(limiter.endpoint_metrics("GET https://api.test/c").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_admits_everything() {
        let limiter = RateLimiterRegistry::new(RateLimitConfig::disabled()).unwrap();
        for _ in 0..1000 {
            assert!(limiter.check("GET https://api.test/a").is_ok());
        }
        assert_eq!(limiter.global_metrics().total_requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_endpoint() {
        let limiter = registry(100, 1);
        let key = "GET https://api.test/a";
        limiter.check(key).unwrap();
        assert!(limiter.check(key).is_err());

        assert!(limiter.reset_endpoint(key));
        assert!(!limiter.reset_endpoint("GET https://api.test/missing"));
        assert!(limiter.check(key).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_bands() {
        let limiter = registry(100, 10);
        // /a keeps 9 of 10 tokens, /b keeps 5, /c keeps 1
        limiter.check("a").unwrap();
        for _ in 0..5 {
            limiter.check("b").unwrap();
        }
        for _ in 0..9 {
            limiter.check("c").unwrap();
        }

        let status = limiter.status();
        assert_eq!(status.healthy, vec!["global".to_string(), "a".to_string()]);
        assert_eq!(status.warning, vec!["b".to_string()]);
        assert_eq!(status.limited, vec!["c".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_burst() {
        let limiter = RateLimiterRegistry::new(
            RateLimitConfig::default()
                .with_per_endpoint(10, Duration::from_secs(1))
                .with_burst_allowance(5),
        )
        .unwrap();

        assert!(limiter.check_burst("a", 5).is_ok());
        let err = limiter.check_burst("a", 6).unwrap_err();
        assert_eq!(err.scope(), Some(LimitScope::Global));
    }

    #[test]
    fn test_invalid_config() {
        let result = RateLimiterRegistry::new(
            RateLimitConfig::default().with_global(0, Duration::from_secs(1)),
        );
        assert!(matches!(result, Err(RateLimitError::ConfigError(_))));
    }
}
