//! Error taxonomy and classification.

use palisade_log::Level;
use palisade_ratelimit::RateLimitError;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::circuit_breaker::CircuitOpenError;

/// Result type for HTTP client operations.
pub type Result<T> = std::result::Result<T, HttpError>;

/// Query parameters whose values are redacted before a URL is logged.
const SENSITIVE_PARAMS: &[&str] = &[
    "token",
    "key",
    "apikey",
    "api_key",
    "password",
    "secret",
    "auth",
    "access_token",
];

const REDACTED: &str = "[REDACTED]";

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Transport or connectivity failure, or an open circuit
    Network,
    /// Deadline exceeded
    Timeout,
    /// 401 or 403
    Auth,
    /// Other 4xx, including local rate limit rejections
    Client,
    /// 5xx
    Server,
    /// Body could not be decoded per its content type
    Parse,
    /// Anything else
    Unknown,
}

impl ErrorKind {
    /// Classify an HTTP status code.
    ///
    /// Statuses below 400 that still reach error handling are `Unknown`.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorKind::Auth,
            400..=499 => ErrorKind::Client,
            500.. => ErrorKind::Server,
            _ => ErrorKind::Unknown,
        }
    }

    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Auth => "AUTH",
            ErrorKind::Client => "CLIENT",
            ErrorKind::Server => "SERVER",
            ErrorKind::Parse => "PARSE",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    /// Severity used when a request finally fails with this kind.
    pub fn log_level(&self) -> Level {
        match self {
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Parse => Level::Critical,
            _ => Level::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed request.
///
/// `url` holds the URL as requested; use [`sanitize_url`] before logging it.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct HttpError {
    kind: ErrorKind,
    message: String,
    status: Option<u16>,
    status_text: Option<String>,
    url: String,
    duration: Duration,
    details: Option<Value>,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
    pub(crate) observed: bool,
}

impl HttpError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            status_text: None,
            url: url.into(),
            duration: Duration::ZERO,
            details: None,
            source: None,
            observed: false,
        }
    }

    /// Build the error for a non-2xx response.
    ///
    /// The message is taken from a `message` or `error` string in `details`
    /// when present.
    pub fn from_status(
        status: u16,
        status_text: impl Into<String>,
        url: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        let status_text = status_text.into();
        let message = details
            .as_ref()
            .and_then(|d| {
                d.get("message")
                    .or_else(|| d.get("error"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}: {status_text}"));

        let mut error = Self::new(ErrorKind::from_status(status), message, url);
        error.status = Some(status);
        error.status_text = Some(status_text);
        error.details = details;
        error
    }

    /// The deadline elapsed before a response arrived.
    pub fn timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("Request timed out after {}ms", timeout.as_millis()),
            url,
        )
    }

    /// The transport failed.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message, url)
    }

    /// The body did not match its declared content type.
    pub fn parse(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message, url)
    }

    /// A limiter tier rejected the call before any I/O.
    pub fn rate_limited(url: impl Into<String>, endpoint: &str, error: &RateLimitError) -> Self {
        let (scope, limit, retry_after) = match error {
            RateLimitError::LimitExceeded {
                scope,
                limit,
                retry_after,
            } => (scope.as_str(), *limit, *retry_after),
            RateLimitError::ConfigError(_) => ("config", 0, Duration::ZERO),
        };

        Self::new(
            ErrorKind::Client,
            format!(
                "Rate limit exceeded ({scope}). Retry after {}ms",
                retry_after.as_millis()
            ),
            url,
        )
        .with_details(json!({
            "rateLimitType": scope,
            "retryAfter": retry_after.as_millis() as u64,
            "limit": limit,
            "endpoint": endpoint,
        }))
        .with_source(error.clone())
    }

    /// The endpoint's circuit breaker refused the call before any I/O.
    pub fn circuit_open(url: impl Into<String>, error: &CircuitOpenError) -> Self {
        Self::new(
            ErrorKind::Network,
            format!(
                "Circuit breaker is {} for {}. Retry after {}ms",
                error.state,
                error.key,
                error.retry_after.as_millis()
            ),
            url,
        )
        .with_details(json!({
            "circuitBreaker": error.state.as_str(),
            "retryAfter": error.retry_after.as_millis() as u64,
            "endpoint": error.key,
        }))
        .with_source(error.clone())
    }

    /// Attach elapsed time.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Attach a diagnostic payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attach the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Classification.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// HTTP status, when a response was received.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// HTTP reason phrase, when a response was received.
    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    /// URL as requested, unsanitized.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Time from request start until the failure.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Diagnostic payload from the response body or the rejecting guard.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    /// Check if the request was rejected locally by a rate limiter.
    pub fn is_rate_limited(&self) -> bool {
        self.kind == ErrorKind::Client
            && self
                .details
                .as_ref()
                .is_some_and(|d| d.get("rateLimitType").is_some())
    }

    /// Check if the request was rejected locally by a circuit breaker.
    pub fn is_circuit_open(&self) -> bool {
        self.details
            .as_ref()
            .is_some_and(|d| d.get("circuitBreaker").is_some())
    }
}

fn is_sensitive(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SENSITIVE_PARAMS.contains(&name.as_str())
}

/// Redact the values of credential-like query parameters.
///
/// Works on absolute and relative URLs and leaves everything outside the
/// query untouched.
pub fn sanitize_url(raw: &str) -> String {
    let Some((base, rest)) = raw.split_once('?') else {
        return raw.to_string();
    };
    let (query, fragment) = match rest.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (rest, None),
    };

    let pairs: Vec<String> = query
        .split('&')
        .map(|pair| {
            let name = pair.split_once('=').map_or(pair, |(name, _)| name);
            let decoded = url::form_urlencoded::parse(name.as_bytes())
                .next()
                .map(|(k, _)| k.into_owned())
                .unwrap_or_default();
            if is_sensitive(&decoded) {
                format!("{name}={REDACTED}")
            } else {
                pair.to_string()
            }
        })
        .collect();

    let mut sanitized = format!("{base}?{}", pairs.join("&"));
    if let Some(fragment) = fragment {
        sanitized.push('#');
        sanitized.push_str(fragment);
    }
    sanitized
}
