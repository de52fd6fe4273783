//! Retry policy with exponential backoff and jitter.

use rand::Rng;
use std::fmt;
use std::time::Duration;

use crate::config::HttpClientConfig;

/// Maximum relative deviation applied by jitter.
pub const JITTER_FACTOR: f64 = 0.3;

/// Source of jitter samples in `[-1.0, 1.0]`.
///
/// Tests inject [`FixedJitter`] or [`NoJitter`] to make backoff deterministic.
pub trait JitterSource: Send + Sync + fmt::Debug {
    /// Return a sample in `[-1.0, 1.0]`.
    fn sample(&self) -> f64;
}

/// Uniform samples from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn sample(&self) -> f64 {
        rand::rng().random_range(-1.0..=1.0)
    }
}

/// Always zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn sample(&self) -> f64 {
        0.0
    }
}

/// A constant sample, clamped to `[-1.0, 1.0]`.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0.clamp(-1.0, 1.0)
    }
}

/// Retry settings resolved for one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Whether delays are jittered by up to ±30%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy from client defaults.
    pub fn from_config(config: &HttpClientConfig) -> Self {
        Self {
            max_retries: config.retries,
            base_delay: config.retry_delay,
            max_delay: config.max_retry_delay,
            jitter: config.jitter,
        }
    }

    /// No retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Whether another attempt is allowed after `retries_so_far` retries.
    pub fn should_retry(&self, retries_so_far: u32) -> bool {
        retries_so_far < self.max_retries
    }

    /// Un-jittered delay before retry `retry` (1-indexed): `base * 2^(retry-1)`.
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay before retry `retry` (1-indexed), jittered when enabled.
    pub fn delay_for(&self, retry: u32, jitter: &dyn JitterSource) -> Duration {
        let base = self.base_delay_for(retry);
        if !self.jitter {
            return base;
        }

        let factor = 1.0 + JITTER_FACTOR * jitter.sample().clamp(-1.0, 1.0);
        let nanos = (base.as_nanos() as f64 * factor).round() as u64;
        Duration::from_nanos(nanos).min(self.max_delay)
    }
}
