//! HTTP client configuration.

use palisade_ratelimit::RateLimitConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;

/// Response cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// TTL for requests that opt into caching without giving one.
    pub default_ttl: Duration,
    /// Entries kept before the oldest is evicted.
    pub max_entries: usize,
    /// Interval of the background sweep of expired entries.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            max_entries: 100,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpClientConfig {
    /// Base URL that relative request URLs are resolved against.
    pub base_url: Option<String>,
    /// Default per-attempt timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Default retries after the first attempt.
    pub retries: u32,
    /// Default delay before the first retry.
    pub retry_delay: Duration,
    /// Upper bound on a single backoff delay.
    pub max_retry_delay: Duration,
    /// Jitter backoff delays by up to ±30%.
    pub jitter: bool,
    /// Circuit breaker configuration.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Rate limiter configuration.
    pub rate_limit: RateLimitConfig,
    /// Response cache configuration.
    pub cache: CacheConfig,
    /// Maximum idle connection lifetime.
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// Headers sent with every request.
    pub default_headers: Vec<(String, String)>,
    /// User agent string.
    pub user_agent: String,
    /// Enable gzip compression.
    pub gzip: bool,
    /// Enable brotli compression.
    pub brotli: bool,
    /// Follow redirects.
    pub follow_redirects: bool,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
    /// Emit lifecycle log lines.
    pub logging: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retries: 3,
            retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_secs(30),
            jitter: true,
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 32,
            default_headers: vec![("Accept".to_string(), "application/json".to_string())],
            user_agent: format!("palisade-http-client/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
            brotli: true,
            follow_redirects: true,
            max_redirects: 10,
            logging: true,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl HttpClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }

    /// Defaults overridden by environment variables.
    ///
    /// - `PALISADE_HTTP_BASE_URL`
    /// - `PALISADE_HTTP_TIMEOUT_MS`
    /// - `PALISADE_HTTP_RETRIES`
    /// - `PALISADE_HTTP_RETRY_DELAY_MS`
    ///
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base_url) = env::var("PALISADE_HTTP_BASE_URL")
            && !base_url.is_empty()
        {
            config.base_url = Some(base_url);
        }
        if let Some(ms) = env_parse::<u64>("PALISADE_HTTP_TIMEOUT_MS") {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = env_parse("PALISADE_HTTP_RETRIES") {
            config.retries = retries;
        }
        if let Some(ms) = env_parse::<u64>("PALISADE_HTTP_RETRY_DELAY_MS") {
            config.retry_delay = Duration::from_millis(ms);
        }
        config
    }
}

/// Builder for HTTP client configuration.
#[derive(Debug, Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL for all requests.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the default request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the default number of retries.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Set the default base retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Set the maximum single backoff delay.
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.max_retry_delay = delay;
        self
    }

    /// Enable or disable backoff jitter.
    pub fn jitter(mut self, enable: bool) -> Self {
        self.config.jitter = enable;
        self
    }

    /// Set circuit breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    /// Set rate limiter configuration.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.rate_limit = config;
        self
    }

    /// Set response cache configuration.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.config.cache = config;
        self
    }

    /// Set the connection pool idle timeout.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum idle connections per host.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Add a default header for all requests, replacing one of the same name.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.config
            .default_headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.config.default_headers.push((name, value.into()));
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable gzip compression.
    pub fn gzip(mut self, enable: bool) -> Self {
        self.config.gzip = enable;
        self
    }

    /// Enable or disable brotli compression.
    pub fn brotli(mut self, enable: bool) -> Self {
        self.config.brotli = enable;
        self
    }

    /// Enable or disable following redirects.
    pub fn follow_redirects(mut self, enable: bool) -> Self {
        self.config.follow_redirects = enable;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Enable or disable lifecycle logging.
    pub fn logging(mut self, enable: bool) -> Self {
        self.config.logging = enable;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HttpClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retries, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(1000));
        assert_eq!(config.cache.max_entries, 100);
        assert_eq!(config.circuit_breaker.volume_threshold, 5);
        assert_eq!(config.rate_limit.per_endpoint_limit, 20);
        assert!(config.user_agent.starts_with("palisade-http-client/"));
    }

    #[test]
    fn test_builder() {
        let config = HttpClientConfig::builder()
            .base_url("https://api.test")
            .retries(5)
            .retry_delay(Duration::from_millis(100))
            .jitter(false)
            .default_header("accept", "text/plain")
            .build();

        assert_eq!(config.base_url.as_deref(), Some("https://api.test"));
        assert_eq!(config.retries, 5);
        assert!(!config.jitter);
        assert_eq!(
            config.default_headers,
            vec![("accept".to_string(), "text/plain".to_string())]
        );
    }

    #[test]
    fn test_from_env() {
        // SAFETY: this is the only test touching these variables
        unsafe {
            env::set_var("PALISADE_HTTP_TIMEOUT_MS", "2500");
            env::set_var("PALISADE_HTTP_RETRIES", "not-a-number");
        }
        let config = HttpClientConfig::from_env();
        unsafe {
            env::remove_var("PALISADE_HTTP_TIMEOUT_MS");
            env::remove_var("PALISADE_HTTP_RETRIES");
        }

        assert_eq!(config.timeout, Duration::from_millis(2500));
        assert_eq!(config.retries, 3);
    }
}
