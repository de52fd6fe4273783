//! Error types for rate limiting

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for rate limiting operations
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Which limiter tier rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitScope {
    /// The single limiter shared by every endpoint
    Global,
    /// The limiter for one `(method, origin + path)` key
    Endpoint,
}

impl LimitScope {
    /// Wire name of the scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::Global => "global",
            LimitScope::Endpoint => "endpoint",
        }
    }
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate limiting errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RateLimitError {
    /// A limiter had no token for the request
    #[error("{scope} rate limit exceeded. Retry after {retry_after:?}")]
    LimitExceeded {
        /// Tier that rejected the request
        scope: LimitScope,
        /// Configured limit of that tier
        limit: u32,
        /// Time until one token is available again
        retry_after: Duration,
    },

    /// Configuration error
    #[error("Rate limit configuration error: {0}")]
    ConfigError(String),
}

impl RateLimitError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a limit exceeded error
    pub fn limit_exceeded(scope: LimitScope, limit: u32, retry_after: Duration) -> Self {
        Self::LimitExceeded {
            scope,
            limit,
            retry_after,
        }
    }

    /// Check if this error is a rate limit exceeded error
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Get the retry-after duration if this is a limit exceeded error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::LimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Get the rejecting scope if this is a limit exceeded error
    pub fn scope(&self) -> Option<LimitScope> {
        match self {
            Self::LimitExceeded { scope, .. } => Some(*scope),
            _ => None,
        }
    }
}
