//! Token Bucket
//!
//! A bucket holds up to `capacity` tokens and refills continuously at
//! `capacity / window`. Each admitted request removes one token.
//!
//! ## Example
//!
//! ```rust
//! use palisade_ratelimit::TokenBucket;
//! use std::time::Duration;
//!
//! let bucket = TokenBucket::new(10, Duration::from_secs(1));
//!
//! // The bucket starts full
//! for _ in 0..10 {
//!     assert!(bucket.try_consume());
//! }
//!
//! // 11th request fails (bucket empty)
//! assert!(!bucket.try_consume());
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Point-in-time view of a bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimiterMetrics {
    /// Tokens currently available
    pub tokens: f64,
    /// Maximum tokens
    pub capacity: u32,
    /// Requests seen, admitted or not
    pub total_requests: u64,
    /// Requests rejected
    pub total_rejected: u64,
    /// Rejected requests as a percentage of all requests
    pub rejection_rate: f64,
    /// Wall-clock time of the last refill
    pub last_refill_time: DateTime<Utc>,
}

impl RateLimiterMetrics {
    /// Available tokens as a fraction of capacity.
    pub fn fill_ratio(&self) -> f64 {
        self.tokens / f64::from(self.capacity)
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    last_refill_at: DateTime<Utc>,
    total_requests: u64,
    total_rejected: u64,
}

/// Token bucket rate limiter.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    /// Milliseconds for an empty bucket to refill
    window_ms: f64,
    burst_allowance: u32,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket of `capacity` tokens refilling over `window`.
    ///
    /// The burst allowance defaults to 10% of capacity, rounded up.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0 or window is zero
    pub fn new(capacity: u32, window: Duration) -> Self {
        let burst = (f64::from(capacity) * 0.1).ceil() as u32;
        Self::with_burst_allowance(capacity, window, burst)
    }

    /// Create a bucket with an explicit burst allowance.
    ///
    /// # Panics
    ///
    /// Panics if capacity is 0 or window is zero
    pub fn with_burst_allowance(capacity: u32, window: Duration, burst_allowance: u32) -> Self {
        assert!(capacity > 0, "Capacity must be greater than 0");
        assert!(!window.is_zero(), "Window must be greater than 0");

        Self {
            capacity,
            window_ms: window.as_nanos() as f64 / 1_000_000.0,
            burst_allowance,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
                last_refill_at: Utc::now(),
                total_requests: 0,
                total_rejected: 0,
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(state.last_refill).as_nanos() as f64 / 1_000_000.0;
        let capacity = f64::from(self.capacity);
        state.tokens = (state.tokens + elapsed_ms * capacity / self.window_ms).min(capacity);
        state.last_refill = now;
        state.last_refill_at = Utc::now();
    }

    /// Take one token if available.
    pub fn try_consume(&self) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.total_requests += 1;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            state.total_rejected += 1;
            false
        }
    }

    /// Take `count` tokens at once, or none.
    ///
    /// Rejected when `count` exceeds the burst allowance or the available tokens.
    pub fn try_consume_burst(&self, count: u32) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.total_requests += 1;

        let wanted = f64::from(count);
        if count <= self.burst_allowance && state.tokens >= wanted {
            state.tokens -= wanted;
            true
        } else {
            state.total_rejected += 1;
            false
        }
    }

    /// Time until at least one token is available.
    pub fn wait_time(&self) -> Duration {
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            Duration::ZERO
        } else {
            let millis = ((1.0 - state.tokens) * self.window_ms / f64::from(self.capacity)).ceil();
            Duration::from_millis(millis as u64)
        }
    }

    /// Current tokens, refreshed for elapsed time.
    pub fn tokens(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    /// Tokens added per millisecond.
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.capacity) / self.window_ms
    }

    /// Maximum tokens.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Largest batch accepted by [`try_consume_burst`](Self::try_consume_burst).
    pub fn burst_allowance(&self) -> u32 {
        self.burst_allowance
    }

    /// Snapshot of the bucket.
    pub fn metrics(&self) -> RateLimiterMetrics {
        let mut state = self.state.lock();
        self.refill(&mut state);

        let rejection_rate = if state.total_requests == 0 {
            0.0
        } else {
            state.total_rejected as f64 / state.total_requests as f64 * 100.0
        };

        RateLimiterMetrics {
            tokens: state.tokens,
            capacity: self.capacity,
            total_requests: state.total_requests,
            total_rejected: state.total_rejected,
            rejection_rate,
            last_refill_time: state.last_refill_at,
        }
    }

    /// Refill completely and clear counters.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = BucketState {
            tokens: f64::from(self.capacity),
            last_refill: Instant::now(),
            last_refill_at: Utc::now(),
            total_requests: 0,
            total_rejected: 0,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_capacity() {
        let bucket = TokenBucket::new(10, Duration::from_secs(1));
        assert_eq!(bucket.capacity(), 10);
        assert_eq!(bucket.burst_allowance(), 1);
        assert_eq!(bucket.metrics().tokens, 10.0);
    }

    #[test]
    fn test_metrics_report_last_refill_time() {
        let before = Utc::now();
        let bucket = TokenBucket::new(5, Duration::from_secs(1));
        assert!(bucket.try_consume());
        let metrics = bucket.metrics();
        assert!(metrics.last_refill_time >= before);
        assert!(metrics.last_refill_time <= Utc::now());

        let json = serde_json::to_value(&metrics).unwrap();
        assert!(json["last_refill_time"].is_string());
    }

    #[tokio::test(start_paused = true)]
    async fn test_consume_until_empty() {
        let bucket = TokenBucket::new(3, Duration::from_secs(3));

        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());

        let metrics = bucket.metrics();
        assert_eq!(metrics.total_requests, 4);
        assert_eq!(metrics.total_rejected, 1);
        assert_eq!(metrics.rejection_rate, 25.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped_at_capacity() {
        let bucket = TokenBucket::new(5, Duration::from_secs(1));
        bucket.try_consume();

        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(bucket.tokens(), 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_window_fraction() {
        // 10 tokens per second, one token per 100ms
        let bucket = TokenBucket::new(10, Duration::from_secs(1));
        for _ in 0..10 {
            assert!(bucket.try_consume());
        }
        assert!(!bucket.try_consume());

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_time() {
        let bucket = TokenBucket::new(1, Duration::from_secs(1));
        assert_eq!(bucket.wait_time(), Duration::ZERO);

        assert!(bucket.try_consume());
        assert_eq!(bucket.wait_time(), Duration::from_millis(1000));

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(bucket.wait_time(), Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_respects_allowance_and_tokens() {
        let bucket = TokenBucket::with_burst_allowance(10, Duration::from_secs(1), 4);

        assert!(!bucket.try_consume_burst(5));
        assert!(bucket.try_consume_burst(4));
        assert!(bucket.try_consume_burst(4));
        // only 2 tokens left
        assert!(!bucket.try_consume_burst(3));
        assert_eq!(bucket.tokens(), 2.0);
        assert_eq!(bucket.metrics().total_rejected, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let bucket = TokenBucket::new(2, Duration::from_secs(60));
        bucket.try_consume();
        bucket.try_consume();
        bucket.try_consume();

        bucket.reset();

        let metrics = bucket.metrics();
        assert_eq!(metrics.tokens, 2.0);
        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.rejection_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_capacity_and_never_go_negative() {
        let bucket = TokenBucket::new(4, Duration::from_millis(400));
        for step in 0..50u64 {
            let admitted = bucket.try_consume();
            let tokens = bucket.tokens();
            assert!(tokens <= 4.0);
            assert!(tokens >= 0.0);
            if !admitted {
                assert!(tokens < 1.0);
            }
            tokio::time::advance(Duration::from_millis(step % 7 * 20)).await;
        }

        let metrics = bucket.metrics();
        let expected = metrics.total_rejected as f64 / metrics.total_requests as f64 * 100.0;
        assert_eq!(metrics.rejection_rate, expected);
    }

    #[test]
    #[should_panic(expected = "Capacity must be greater than 0")]
    fn test_zero_capacity() {
        TokenBucket::new(0, Duration::from_secs(1));
    }

    #[test]
    #[should_panic(expected = "Window must be greater than 0")]
    fn test_zero_window() {
        TokenBucket::new(10, Duration::ZERO);
    }
}
