//! # Palisade HTTP Client
//!
//! A resilient HTTP client with retry and backoff, per-endpoint circuit
//! breaking, two-tier rate limiting, a GET response cache, metrics, and
//! request/response interceptors.
//!
//! ## Features
//!
//! - **Retry with Backoff**: Exponential delays with ±30% jitter, transport failures only
//! - **Circuit Breaker**: Failure-rate breaker per `METHOD origin+path`
//! - **Rate Limiting**: Global and per-endpoint token buckets
//! - **Caching**: Opt-in GET cache with TTL and FIFO eviction
//! - **Timeouts**: Per-request and client-wide
//! - **Interceptors and Observers**: Request/response transformation and lifecycle taps
//! - **Error Taxonomy**: Every failure classified as one [`ErrorKind`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use palisade_http_client::{HttpClient, HttpClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new(HttpClientConfig::default())?;
//!
//!     let response = client
//!         .get("https://api.example.com/users")
//!         .cache(true)
//!         .send()
//!         .await?;
//!
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## With Retry, Circuit Breaker and Rate Limits
//!
//! ```rust,no_run
//! use palisade_http_client::{CircuitBreakerConfig, HttpClient, HttpClientConfig, RateLimitConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HttpClientConfig::builder()
//!         .base_url("https://api.example.com")
//!         .timeout(Duration::from_secs(10))
//!         .retries(3)
//!         .retry_delay(Duration::from_millis(200))
//!         .circuit_breaker(CircuitBreakerConfig::default().with_volume_threshold(10))
//!         .rate_limit(RateLimitConfig::default().with_per_endpoint(5, Duration::from_secs(1)))
//!         .build();
//!
//!     let client = HttpClient::builder()
//!         .config(config)
//!         .token_provider(|| std::env::var("API_TOKEN").ok())
//!         .build()?;
//!
//!     let response = client
//!         .post("/orders")
//!         .json(&serde_json::json!({"item": "widget", "quantity": 5}))
//!         .send()
//!         .await?;
//!
//!     println!("{:?}", response.as_json());
//!     Ok(())
//! }
//! ```

mod auth;
mod cache;
mod circuit_breaker;
mod client;
mod config;
mod endpoint;
mod error;
mod hooks;
mod interceptor;
mod metrics;
mod observer;
mod request;
mod response;
mod retry;
mod transport;

pub use auth::{StaticToken, TokenProvider};
pub use cache::{ResponseCache, cache_key};
pub use circuit_breaker::{
    BreakerPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics,
    CircuitBreakerRegistry, CircuitBreakerStatus, CircuitConfigError, CircuitOpenError,
    CircuitState, StateTransition,
};
pub use client::{HttpClient, HttpClientBuilder};
pub use config::{CacheConfig, HttpClientConfig, HttpClientConfigBuilder};
pub use endpoint::{endpoint_key, resolve_url};
pub use error::{ErrorKind, HttpError, Result, sanitize_url};
pub use interceptor::{
    AuthInterceptor, InterceptorId, LoggingInterceptor, RequestInterceptor, ResponseInterceptor,
};
pub use metrics::{HttpMetrics, MetricsTracker};
pub use observer::{HttpObserver, ObserverId, RequestEvent};
pub use request::{ContentType, FilePart, MultipartForm, RequestBody, RequestBuilder, RequestConfig};
pub use response::{HttpResponse, ResponseData, ResponseKind};
pub use retry::{FixedJitter, JITTER_FACTOR, JitterSource, NoJitter, RandomJitter, RetryPolicy};
pub use transport::{
    ReqwestTransport, Transport, TransportBody, TransportError, TransportRequest,
    TransportResponse,
};

pub use palisade_ratelimit::{
    LimitScope, RateLimitConfig, RateLimitError, RateLimiterMetrics, RateLimiterStatus,
};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use palisade_http_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::auth::{StaticToken, TokenProvider};
    pub use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    pub use crate::client::{HttpClient, HttpClientBuilder};
    pub use crate::config::{CacheConfig, HttpClientConfig};
    pub use crate::error::{ErrorKind, HttpError, Result};
    pub use crate::interceptor::{RequestInterceptor, ResponseInterceptor};
    pub use crate::observer::HttpObserver;
    pub use crate::request::{RequestBuilder, RequestConfig};
    pub use crate::response::{HttpResponse, ResponseData};
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
    pub use palisade_ratelimit::{LimitScope, RateLimitConfig};
}
