//! Request and response interceptors.
//!
//! Interceptors run in registration order on every attempt. An interceptor
//! that returns an error has it passed to its own [`on_error`] hook; the
//! request continues with whatever changes were made so far.
//!
//! [`on_error`]: RequestInterceptor::on_error

use async_trait::async_trait;
use http::{HeaderName, HeaderValue};

use crate::{ErrorKind, HttpError, HttpResponse, RequestConfig, Result};

/// Modifies a request before it is sent.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Intercept and optionally modify the request.
    async fn intercept(&self, url: &str, config: &mut RequestConfig) -> Result<()>;

    /// Receives errors returned by [`intercept`](Self::intercept).
    fn on_error(&self, _error: &HttpError) {}
}

/// Modifies a successful response before it is returned.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
    /// Intercept and optionally modify the response.
    async fn intercept(&self, response: &mut HttpResponse) -> Result<()>;

    /// Receives errors returned by [`intercept`](Self::intercept).
    fn on_error(&self, _error: &HttpError) {}
}

/// Handle returned when registering an interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterceptorId(pub(crate) u64);

/// Logging interceptor that logs requests and responses.
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor {
    log_headers: bool,
}

impl LoggingInterceptor {
    /// Create a new logging interceptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable logging of headers.
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

#[async_trait]
impl RequestInterceptor for LoggingInterceptor {
    async fn intercept(&self, url: &str, config: &mut RequestConfig) -> Result<()> {
        palisade_log::debug!(
            "Sending {} {}",
            config.method,
            crate::error::sanitize_url(url)
        );

        if self.log_headers {
            for (name, value) in &config.headers {
                if *name == http::header::AUTHORIZATION {
                    continue;
                }
                palisade_log::trace!("Request header {}: {:?}", name, value);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ResponseInterceptor for LoggingInterceptor {
    async fn intercept(&self, response: &mut HttpResponse) -> Result<()> {
        palisade_log::debug!(
            "Received {} from {}",
            response.status(),
            crate::error::sanitize_url(response.url())
        );

        if self.log_headers {
            for (name, value) in response.headers() {
                palisade_log::trace!("Response header {}: {:?}", name, value);
            }
        }

        Ok(())
    }
}

/// Authentication interceptor that adds auth headers.
#[derive(Clone)]
pub struct AuthInterceptor {
    auth_type: AuthType,
}

#[derive(Clone)]
enum AuthType {
    Bearer(String),
    Basic { username: String, password: String },
    ApiKey { header: String, key: String },
}

impl AuthInterceptor {
    /// Create a bearer token interceptor.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::Bearer(token.into()),
        }
    }

    /// Create a basic auth interceptor.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::Basic {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    /// Create an API key interceptor.
    pub fn api_key(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::ApiKey {
                header: header.into(),
                key: key.into(),
            },
        }
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.auth_type {
            AuthType::Bearer(_) => "bearer",
            AuthType::Basic { .. } => "basic",
            AuthType::ApiKey { .. } => "api_key",
        };
        f.debug_struct("AuthInterceptor").field("kind", &kind).finish()
    }
}

fn invalid_header(url: &str, what: &str) -> HttpError {
    HttpError::new(ErrorKind::Unknown, format!("Invalid {what} for auth header"), url)
}

#[async_trait]
impl RequestInterceptor for AuthInterceptor {
    async fn intercept(&self, url: &str, config: &mut RequestConfig) -> Result<()> {
        let (name, value) = match &self.auth_type {
            AuthType::Bearer(token) => (
                http::header::AUTHORIZATION,
                HeaderValue::try_from(format!("Bearer {}", token))
                    .map_err(|_| invalid_header(url, "token"))?,
            ),
            AuthType::Basic { username, password } => {
                use base64::Engine;
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                (
                    http::header::AUTHORIZATION,
                    HeaderValue::try_from(format!("Basic {}", credentials))
                        .map_err(|_| invalid_header(url, "credentials"))?,
                )
            }
            AuthType::ApiKey { header, key } => (
                HeaderName::from_bytes(header.as_bytes())
                    .map_err(|_| invalid_header(url, "header name"))?,
                HeaderValue::try_from(key.as_str()).map_err(|_| invalid_header(url, "key"))?,
            ),
        };

        config.headers.insert(name, value);
        Ok(())
    }

    fn on_error(&self, error: &HttpError) {
        palisade_log::warn!("Auth interceptor failed: {}", error.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bearer() {
        let mut config = RequestConfig::default();
        AuthInterceptor::bearer("abc")
            .intercept("https://api.test", &mut config)
            .await
            .unwrap();
        assert_eq!(config.headers["authorization"], "Bearer abc");
    }

    #[tokio::test]
    async fn test_basic() {
        let mut config = RequestConfig::default();
        AuthInterceptor::basic("user", "pass")
            .intercept("https://api.test", &mut config)
            .await
            .unwrap();
        assert_eq!(config.headers["authorization"], "Basic dXNlcjpwYXNz");
    }

    #[tokio::test]
    async fn test_api_key() {
        let mut config = RequestConfig::default();
        AuthInterceptor::api_key("X-Api-Key", "k1")
            .intercept("https://api.test", &mut config)
            .await
            .unwrap();
        assert_eq!(config.headers["x-api-key"], "k1");
    }

    #[tokio::test]
    async fn test_invalid_header_is_an_error() {
        let mut config = RequestConfig::default();
        let err = AuthInterceptor::api_key("bad header", "k1")
            .intercept("https://api.test", &mut config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(config.headers.is_empty());
    }
}
