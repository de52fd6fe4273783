//! # Palisade Rate Limiting
//!
//! Token bucket rate limiting in two tiers: one bucket shared by every
//! endpoint and one bucket per endpoint key. A request must be admitted by
//! both tiers, global first.
//!
//! ## Quick Start
//!
//! ```rust
//! use palisade_ratelimit::{LimitScope, RateLimitConfig, RateLimiterRegistry};
//! use std::time::Duration;
//!
//! let limiter = RateLimiterRegistry::new(
//!     RateLimitConfig::default().with_per_endpoint(1, Duration::from_secs(1)),
//! )
//! .unwrap();
//!
//! let key = "GET https://api.example.com/widgets";
//! assert!(limiter.check(key).is_ok());
//!
//! let err = limiter.check(key).unwrap_err();
//! assert_eq!(err.scope(), Some(LimitScope::Endpoint));
//! ```

mod config;
mod error;
mod registry;
mod token_bucket;

pub use config::RateLimitConfig;
pub use error::{LimitScope, RateLimitError, RateLimitResult};
pub use registry::{GLOBAL_KEY, RateLimiterRegistry, RateLimiterStatus};
pub use token_bucket::{RateLimiterMetrics, TokenBucket};
