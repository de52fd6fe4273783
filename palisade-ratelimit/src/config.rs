//! Rate limiter configuration

use crate::error::{RateLimitError, RateLimitResult};
use std::time::Duration;

/// Configuration for the two limiter tiers.
///
/// Each tier is a token bucket holding `limit` tokens that refill
/// continuously over `window`.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Whether rate limiting is applied at all
    pub enabled: bool,
    /// Tokens in the global bucket
    pub global_limit: u32,
    /// Time for the global bucket to refill completely
    pub global_window: Duration,
    /// Tokens in each per-endpoint bucket
    pub per_endpoint_limit: u32,
    /// Time for a per-endpoint bucket to refill completely
    pub per_endpoint_window: Duration,
    /// Largest batch accepted by `try_consume_burst`; `None` means 10% of capacity
    pub burst_allowance: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_limit: 100,
            global_window: Duration::from_secs(1),
            per_endpoint_limit: 20,
            per_endpoint_window: Duration::from_secs(1),
            burst_allowance: None,
        }
    }
}

impl RateLimitConfig {
    /// A configuration that admits everything.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the global tier.
    pub fn with_global(mut self, limit: u32, window: Duration) -> Self {
        self.global_limit = limit;
        self.global_window = window;
        self
    }

    /// Set the per-endpoint tier.
    pub fn with_per_endpoint(mut self, limit: u32, window: Duration) -> Self {
        self.per_endpoint_limit = limit;
        self.per_endpoint_window = window;
        self
    }

    /// Set an explicit burst allowance.
    pub fn with_burst_allowance(mut self, burst: u32) -> Self {
        self.burst_allowance = Some(burst);
        self
    }

    /// Reject limits or windows of zero.
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.global_limit == 0 || self.per_endpoint_limit == 0 {
            return Err(RateLimitError::config("limits must be greater than 0"));
        }
        if self.global_window.is_zero() || self.per_endpoint_window.is_zero() {
            return Err(RateLimitError::config("windows must be greater than 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RateLimitConfig::default();
        assert!(config.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let config = RateLimitConfig::default().with_per_endpoint(0, Duration::from_secs(1));
        assert!(matches!(
            config.validate(),
            Err(RateLimitError::ConfigError(_))
        ));
    }

    #[test]
    fn test_zero_window_rejected() {
        let config = RateLimitConfig::default().with_global(10, Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
