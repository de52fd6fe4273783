//! HTTP client implementation.

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use palisade_log::Level;
use palisade_ratelimit::{LimitScope, RateLimiterMetrics, RateLimiterRegistry, RateLimiterStatus};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::auth::TokenProvider;
use crate::cache::{self, ResponseCache};
use crate::circuit_breaker::{
    BreakerPermit, CircuitBreaker, CircuitBreakerMetrics, CircuitBreakerRegistry,
    CircuitBreakerStatus, CircuitState, StateTransition,
};
use crate::endpoint::{endpoint_key, resolve_url};
use crate::error::sanitize_url;
use crate::hooks::Hooks;
use crate::interceptor::{InterceptorId, RequestInterceptor, ResponseInterceptor};
use crate::metrics::{HttpMetrics, MetricsTracker};
use crate::observer::{HttpObserver, ObserverId, ObserverRegistry, RequestEvent};
use crate::request::{ContentType, FilePart, MultipartForm, RequestBody};
use crate::retry::{JitterSource, RandomJitter, RetryPolicy};
use crate::transport::{
    ReqwestTransport, Transport, TransportBody, TransportError, TransportRequest,
};
use crate::{
    ErrorKind, HttpClientConfig, HttpError, HttpResponse, RequestBuilder, RequestConfig, Result,
};

const LOG_TARGET: &str = "palisade::http_client";

fn config_error<E>(err: E) -> HttpError
where
    E: std::error::Error + Send + Sync + 'static,
{
    HttpError::new(ErrorKind::Unknown, format!("Invalid configuration: {err}"), "")
        .with_source(err)
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    transport: Option<Arc<dyn Transport>>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    jitter: Arc<dyn JitterSource>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            config: HttpClientConfig::default(),
            transport: None,
            token_provider: None,
            jitter: Arc::new(RandomJitter),
        }
    }
}

impl HttpClientBuilder {
    /// Set the client configuration.
    pub fn config(mut self, config: HttpClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default `reqwest` transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Set the source of bearer tokens.
    pub fn token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.token_provider = Some(Arc::new(provider));
        self
    }

    /// Set the randomness used for backoff jitter.
    pub fn jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Build the client.
    ///
    /// Fails on an invalid rate limit or circuit breaker configuration.
    /// The periodic cache sweep only starts when called inside a tokio
    /// runtime; without one, expired entries are still dropped when read.
    pub fn build(self) -> Result<HttpClient> {
        let config = self.config;
        config.circuit_breaker.validate().map_err(config_error)?;
        let limiters = RateLimiterRegistry::new(config.rate_limit.clone()).map_err(config_error)?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config)?),
        };

        let cache = Arc::new(ResponseCache::new(config.cache.max_entries));
        let sweeper = cache::spawn_sweeper(&cache, config.cache.sweep_interval);

        Ok(HttpClient {
            inner: Arc::new(ClientInner {
                breakers: RwLock::new(Arc::new(CircuitBreakerRegistry::new(
                    config.circuit_breaker.clone(),
                ))),
                limiters: RwLock::new(Arc::new(limiters)),
                config: RwLock::new(Arc::new(config)),
                transport,
                token_provider: self.token_provider,
                jitter: self.jitter,
                cache,
                metrics: MetricsTracker::new(),
                request_interceptors: Hooks::default(),
                response_interceptors: Hooks::default(),
                observers: ObserverRegistry::default(),
                sweeper: Mutex::new(sweeper),
            }),
        })
    }
}

impl fmt::Debug for HttpClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClientBuilder")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("token_provider", &self.token_provider.is_some())
            .finish()
    }
}

struct ClientInner {
    config: RwLock<Arc<HttpClientConfig>>,
    transport: Arc<dyn Transport>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    jitter: Arc<dyn JitterSource>,
    cache: Arc<ResponseCache>,
    metrics: MetricsTracker,
    breakers: RwLock<Arc<CircuitBreakerRegistry>>,
    limiters: RwLock<Arc<RateLimiterRegistry>>,
    request_interceptors: Hooks<dyn RequestInterceptor>,
    response_interceptors: Hooks<dyn ResponseInterceptor>,
    observers: ObserverRegistry,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.abort();
        }
    }
}

/// Failure of a single attempt.
struct AttemptFailure {
    error: HttpError,
    /// Transport-level failure eligible for another attempt.
    retryable: bool,
}

impl AttemptFailure {
    fn terminal(error: HttpError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }

    fn retryable(error: HttpError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }
}

/// Body of a non-2xx response as a diagnostic payload.
fn error_details(body: &Bytes) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice(body)
        .ok()
        .or_else(|| std::str::from_utf8(body).ok().map(|text| Value::String(text.to_string())))
}

/// HTTP client with retry, circuit breaking, rate limiting and caching.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration.
    ///
    /// Call this inside a tokio runtime to get the periodic cache sweep.
    /// Outside one the sweep is skipped and expired entries are only
    /// dropped when read. See [`HttpClientBuilder::build`].
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Create a client builder.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Get a copy of the client configuration.
    pub fn config(&self) -> HttpClientConfig {
        self.inner.config.read().as_ref().clone()
    }

    fn current_config(&self) -> Arc<HttpClientConfig> {
        self.inner.config.read().clone()
    }

    fn breakers(&self) -> Arc<CircuitBreakerRegistry> {
        self.inner.breakers.read().clone()
    }

    fn limiters(&self) -> Arc<RateLimiterRegistry> {
        self.inner.limiters.read().clone()
    }

    /// Change the configuration.
    ///
    /// `update` edits a copy of the current configuration. Breaker and
    /// limiter state is discarded when its section changed. Transport
    /// settings (connect timeout, pooling, compression, redirects) keep the
    /// values the client was built with.
    ///
    /// An invalid configuration is rejected and nothing is changed.
    pub fn update_config(&self, update: impl FnOnce(&mut HttpClientConfig)) -> Result<()> {
        let mut current = self.inner.config.write();
        let mut next = current.as_ref().clone();
        update(&mut next);

        next.circuit_breaker.validate().map_err(config_error)?;
        let limiters = if next.rate_limit != current.rate_limit {
            Some(RateLimiterRegistry::new(next.rate_limit.clone()).map_err(config_error)?)
        } else {
            None
        };

        if let Some(limiters) = limiters {
            *self.inner.limiters.write() = Arc::new(limiters);
        }
        if next.circuit_breaker != current.circuit_breaker {
            *self.inner.breakers.write() =
                Arc::new(CircuitBreakerRegistry::new(next.circuit_breaker.clone()));
        }
        if next.cache.max_entries != current.cache.max_entries {
            self.inner.cache.set_max_entries(next.cache.max_entries);
        }
        if next.cache.sweep_interval != current.cache.sweep_interval {
            let mut sweeper = self.inner.sweeper.lock();
            if let Some(old) = sweeper.take() {
                old.abort();
            }
            *sweeper = cache::spawn_sweeper(&self.inner.cache, next.cache.sweep_interval);
        }

        *current = Arc::new(next);
        Ok(())
    }

    /// Create a GET request builder.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::GET, url.into())
    }

    /// Create a POST request builder.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::POST, url.into())
    }

    /// Create a PUT request builder.
    pub fn put(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PUT, url.into())
    }

    /// Create a PATCH request builder.
    pub fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::PATCH, url.into())
    }

    /// Create a DELETE request builder.
    pub fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::DELETE, url.into())
    }

    /// Create a HEAD request builder.
    pub fn head(&self, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::HEAD, url.into())
    }

    /// Create a request builder with a custom method.
    pub fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, url.into())
    }

    /// Upload a file as `multipart/form-data` together with text fields.
    ///
    /// A GET in `config` is sent as POST.
    pub async fn upload_file<I, K, V>(
        &self,
        url: &str,
        file: FilePart,
        fields: I,
        mut config: RequestConfig,
    ) -> Result<HttpResponse>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut form = MultipartForm::new();
        for (name, value) in fields {
            form = form.text(name, value);
        }
        form = form.file(file);

        if config.method == Method::GET {
            config.method = Method::POST;
        }
        config.body = Some(RequestBody::Multipart(form));
        config.content_type = Some(ContentType::Multipart);
        self.execute(url, config).await
    }

    /// Run a request through the full pipeline.
    ///
    /// Cache lookup (GET with `cache` set), then per attempt: rate limiters,
    /// circuit breaker, request interceptors, transport call under timeout.
    /// Transport failures and timeouts are retried with backoff; HTTP error
    /// statuses, parse failures and guard rejections are not.
    pub async fn execute(&self, url: &str, request: RequestConfig) -> Result<HttpResponse> {
        let start = Instant::now();
        let config = self.current_config();
        let method = request.method.clone();
        self.inner.metrics.record_request(&method);

        let resolved = match resolve_url(config.base_url.as_deref(), url, &request.query) {
            Ok(resolved) => resolved,
            Err(error) => return Err(self.finish_error(&config, &method, error, start)),
        };
        let endpoint = endpoint_key(&method, &resolved);

        self.inner.observers.notify_request(&RequestEvent {
            method: method.clone(),
            url: resolved.to_string(),
            endpoint: endpoint.clone(),
        });
        if config.logging {
            palisade_log::log_fields(
                Level::Debug,
                LOG_TARGET,
                "Request started",
                &[
                    ("method", method.to_string()),
                    ("url", sanitize_url(resolved.as_str())),
                    ("endpoint", sanitize_url(&endpoint)),
                ],
            );
        }

        let cache_key = (request.cache && method == Method::GET).then(|| {
            cache::cache_key(&method, resolved.as_str(), &request.headers, request.body.as_ref())
        });
        if let Some(key) = &cache_key {
            if let Some(hit) = self.inner.cache.get(key) {
                self.inner.metrics.record_cache_hit();
                self.inner
                    .metrics
                    .record_success(hit.status().as_u16(), start.elapsed());
                if config.logging {
                    palisade_log::debug!(
                        target: LOG_TARGET,
                        "Cache hit for {}",
                        sanitize_url(resolved.as_str())
                    );
                }
                self.inner.observers.notify_response(&hit);
                return Ok(hit);
            }
            self.inner.metrics.record_cache_miss();
            if config.logging {
                palisade_log::debug!(
                    target: LOG_TARGET,
                    "Cache miss for {}",
                    sanitize_url(resolved.as_str())
                );
            }
        }

        let policy = RetryPolicy {
            max_retries: request.retries.unwrap_or(config.retries),
            base_delay: request.retry_delay.unwrap_or(config.retry_delay),
            ..RetryPolicy::from_config(&config)
        };
        let breaker = config
            .circuit_breaker
            .enabled
            .then(|| self.breakers().get_or_create(&endpoint));
        let limiters = self.limiters();

        let mut retries = 0;
        let outcome = loop {
            let attempt = self
                .attempt(
                    &config,
                    &resolved,
                    &endpoint,
                    &request,
                    breaker.as_deref(),
                    &limiters,
                    start,
                )
                .await;

            match attempt {
                Ok(response) => break Ok(response),
                Err(failure) => {
                    let circuit_open = breaker
                        .as_ref()
                        .is_some_and(|b| b.state() == CircuitState::Open);
                    if failure.retryable && !circuit_open && policy.should_retry(retries) {
                        retries += 1;
                        self.inner.metrics.record_retry();
                        let delay = policy.delay_for(retries, self.inner.jitter.as_ref());
                        if config.logging {
                            palisade_log::log_fields(
                                Level::Warn,
                                LOG_TARGET,
                                "Retrying request",
                                &[
                                    ("url", sanitize_url(resolved.as_str())),
                                    ("retry", retries.to_string()),
                                    ("max_retries", policy.max_retries.to_string()),
                                    ("delay_ms", delay.as_millis().to_string()),
                                    ("error", failure.error.to_string()),
                                ],
                            );
                        }
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    break Err(failure.error);
                }
            }
        };

        let mut response = match outcome {
            Ok(response) => response,
            Err(error) => return Err(self.finish_error(&config, &method, error, start)),
        };

        for interceptor in self.inner.response_interceptors.snapshot() {
            if let Err(error) = interceptor.intercept(&mut response).await {
                interceptor.on_error(&error);
            }
        }

        if let Some(key) = &cache_key {
            let ttl = request.cache_ttl.unwrap_or(config.cache.default_ttl);
            self.inner.cache.set(key, &method, &response, ttl);
        }

        let status = response.status().as_u16();
        self.inner.metrics.record_success(status, response.duration());
        if config.logging {
            palisade_log::http(
                method.as_str(),
                &sanitize_url(response.url()),
                Some(status),
                response.duration(),
            );
        }
        self.inner.observers.notify_response(&response);
        Ok(response)
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        config: &HttpClientConfig,
        url: &Url,
        endpoint: &str,
        request: &RequestConfig,
        breaker: Option<&CircuitBreaker>,
        limiters: &RateLimiterRegistry,
        start: Instant,
    ) -> std::result::Result<HttpResponse, AttemptFailure> {
        if let Err(rejection) = limiters.check(endpoint) {
            if config.logging {
                palisade_log::warn!(
                    target: LOG_TARGET,
                    "Rate limit exceeded for {}: {}",
                    sanitize_url(endpoint),
                    rejection
                );
            }
            return Err(AttemptFailure::terminal(HttpError::rate_limited(
                url.as_str(),
                endpoint,
                &rejection,
            )));
        }

        // Held until the outcome is known; dropping it on cancellation frees
        // the half-open slot.
        let mut permit = match breaker.map(CircuitBreaker::can_proceed).transpose() {
            Ok(permit) => permit,
            Err(open) => {
                return Err(AttemptFailure::terminal(HttpError::circuit_open(
                    url.as_str(),
                    &open,
                )));
            }
        };
        if let Some(permit) = permit.as_mut() {
            self.report_transition(config, permit.take_transition());
        }

        let mut request = request.clone();
        for interceptor in self.inner.request_interceptors.snapshot() {
            if let Err(error) = interceptor.intercept(url.as_str(), &mut request).await {
                interceptor.on_error(&error);
            }
        }

        let headers = self.build_headers(config, &request).await;
        let body = request
            .body
            .as_ref()
            .map_or(TransportBody::Empty, |body| body.encode(request.effective_content_type()));
        let timeout = request.timeout.unwrap_or(config.timeout);
        let outgoing = TransportRequest {
            method: request.method.clone(),
            url: url.clone(),
            headers,
            body,
        };

        match tokio::time::timeout(timeout, self.inner.transport.send(outgoing)).await {
            Err(_) | Ok(Err(TransportError::Timeout)) => {
                self.record_outcome(config, permit, false);
                Err(AttemptFailure::retryable(HttpError::timeout(url.as_str(), timeout)))
            }
            Ok(Err(error)) => {
                self.record_outcome(config, permit, false);
                Err(AttemptFailure::retryable(
                    HttpError::network(url.as_str(), error.to_string()).with_source(error),
                ))
            }
            Ok(Ok(response)) if response.status.is_success() => {
                match HttpResponse::from_transport(response, start.elapsed()) {
                    Ok(decoded) => {
                        self.record_outcome(config, permit, true);
                        Ok(decoded)
                    }
                    Err(error) => {
                        if let Some(permit) = permit {
                            permit.release();
                        }
                        Err(AttemptFailure::terminal(error))
                    }
                }
            }
            Ok(Ok(response)) => {
                let status = response.status;
                let error = HttpError::from_status(
                    status.as_u16(),
                    status.canonical_reason().unwrap_or(""),
                    url.as_str(),
                    error_details(&response.body),
                );
                if status.as_u16() >= 500 {
                    self.record_outcome(config, permit, false);
                } else if let Some(permit) = permit {
                    permit.release();
                }
                Err(AttemptFailure::terminal(error))
            }
        }
    }

    /// Defaults, then per-call headers, then content type, then auth.
    async fn build_headers(&self, config: &HttpClientConfig, request: &RequestConfig) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, value);
            }
        }

        for name in request.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &request.headers {
            headers.append(name.clone(), value.clone());
        }

        let multipart = matches!(request.body, Some(RequestBody::Multipart(_)))
            || request.content_type == Some(ContentType::Multipart);
        if multipart {
            headers.remove(CONTENT_TYPE);
        } else if let Some(explicit) = request.content_type {
            if let Some(value) = explicit.header_value() {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
            }
        } else if !headers.contains_key(CONTENT_TYPE)
            && let Some(value) = request
                .effective_content_type()
                .and_then(|ct| ct.header_value())
        {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(value));
        }

        if request.include_auth
            && let Some(provider) = &self.inner.token_provider
            && let Some(token) = provider.token().await
        {
            match HeaderValue::try_from(format!("Bearer {token}")) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => {
                    palisade_log::warn!(
                        target: LOG_TARGET,
                        "Ignoring auth token that is not a valid header value"
                    );
                }
            }
        }

        headers
    }

    fn record_outcome(
        &self,
        config: &HttpClientConfig,
        permit: Option<BreakerPermit<'_>>,
        success: bool,
    ) {
        if let Some(permit) = permit {
            let transition = if success {
                permit.record_success()
            } else {
                permit.record_failure()
            };
            self.report_transition(config, transition);
        }
    }

    fn report_transition(&self, config: &HttpClientConfig, transition: Option<StateTransition>) {
        let Some(transition) = transition else {
            return;
        };

        if config.logging {
            let level = match transition.to {
                CircuitState::Open => Level::Warn,
                _ => Level::Info,
            };
            palisade_log::log_fields(
                level,
                LOG_TARGET,
                &format!("Circuit breaker {} -> {}", transition.from, transition.to),
                &[
                    ("endpoint", sanitize_url(&transition.key)),
                    ("failures", transition.failures.to_string()),
                    ("successes", transition.successes.to_string()),
                    ("total_requests", transition.total_requests.to_string()),
                ],
            );
        }
        self.inner.observers.notify_transition(&transition);
    }

    fn finish_error(
        &self,
        config: &HttpClientConfig,
        method: &Method,
        error: HttpError,
        start: Instant,
    ) -> HttpError {
        let mut error = error.with_duration(start.elapsed());
        self.inner
            .metrics
            .record_failure(error.status(), error.duration());

        if config.logging {
            let status = error
                .status()
                .map_or_else(|| "-".to_string(), |s| s.to_string());
            palisade_log::log_fields(
                error.kind().log_level(),
                LOG_TARGET,
                &format!("Request failed: {}", error.message()),
                &[
                    ("method", method.to_string()),
                    ("url", sanitize_url(error.url())),
                    ("type", error.kind().to_string()),
                    ("status", status),
                    ("duration_ms", error.duration().as_millis().to_string()),
                ],
            );
        }

        self.inner.observers.notify_error(&mut error);
        error
    }

    // Interceptors and observers

    /// Register a request interceptor.
    pub fn add_request_interceptor(
        &self,
        interceptor: impl RequestInterceptor + 'static,
    ) -> InterceptorId {
        InterceptorId(self.inner.request_interceptors.add(Arc::new(interceptor)))
    }

    /// Unregister a request interceptor.
    pub fn remove_request_interceptor(&self, id: InterceptorId) -> bool {
        self.inner.request_interceptors.remove(id.0)
    }

    /// Register a response interceptor.
    pub fn add_response_interceptor(
        &self,
        interceptor: impl ResponseInterceptor + 'static,
    ) -> InterceptorId {
        InterceptorId(self.inner.response_interceptors.add(Arc::new(interceptor)))
    }

    /// Unregister a response interceptor.
    pub fn remove_response_interceptor(&self, id: InterceptorId) -> bool {
        self.inner.response_interceptors.remove(id.0)
    }

    /// Unregister every interceptor.
    pub fn clear_interceptors(&self) {
        self.inner.request_interceptors.clear();
        self.inner.response_interceptors.clear();
    }

    /// Register an observer.
    pub fn add_observer(&self, observer: impl HttpObserver + 'static) -> ObserverId {
        self.inner.observers.add(Arc::new(observer))
    }

    /// Unregister an observer.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove(id)
    }

    /// Unregister every observer.
    pub fn clear_observers(&self) {
        self.inner.observers.clear();
    }

    // Metrics and cache

    /// Snapshot of the request counters.
    pub fn metrics(&self) -> HttpMetrics {
        self.inner.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.inner.metrics.reset();
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Number of cached responses.
    pub fn cache_size(&self) -> usize {
        self.inner.cache.len()
    }

    // Circuit breakers

    fn endpoint_for(&self, url: &str, method: &Method) -> Option<String> {
        let config = self.current_config();
        resolve_url(config.base_url.as_deref(), url, &[])
            .ok()
            .map(|resolved| endpoint_key(method, &resolved))
    }

    /// Metrics of the breaker guarding `method url`, if it exists.
    pub fn circuit_breaker_metrics(
        &self,
        url: &str,
        method: Method,
    ) -> Option<CircuitBreakerMetrics> {
        let key = self.endpoint_for(url, &method)?;
        self.breakers().metrics(&key)
    }

    /// Metrics of every breaker, sorted by endpoint key.
    pub fn all_circuit_breaker_metrics(&self) -> Vec<(String, CircuitBreakerMetrics)> {
        self.breakers().all_metrics()
    }

    /// Close one breaker and clear its counters. Returns `false` if it does
    /// not exist.
    pub fn reset_circuit_breaker(&self, url: &str, method: Method) -> bool {
        let Some(key) = self.endpoint_for(url, &method) else {
            return false;
        };
        let config = self.current_config();
        match self.breakers().reset(&key) {
            Some(transition) => {
                self.report_transition(&config, transition);
                true
            }
            None => false,
        }
    }

    /// Close every breaker.
    pub fn reset_all_circuit_breakers(&self) {
        let config = self.current_config();
        for transition in self.breakers().reset_all() {
            self.report_transition(&config, Some(transition));
        }
    }

    /// Endpoint keys grouped by breaker state.
    pub fn circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.breakers().status()
    }

    // Rate limiters

    /// Metrics of the limiter for `method url`, if it exists.
    pub fn rate_limiter_metrics(&self, url: &str, method: Method) -> Option<RateLimiterMetrics> {
        let key = self.endpoint_for(url, &method)?;
        self.limiters().endpoint_metrics(&key)
    }

    /// Metrics of the global limiter.
    pub fn global_rate_limiter_metrics(&self) -> RateLimiterMetrics {
        self.limiters().global_metrics()
    }

    /// Metrics of every endpoint limiter, sorted by endpoint key.
    pub fn all_rate_limiter_metrics(&self) -> Vec<(String, RateLimiterMetrics)> {
        self.limiters().all_endpoint_metrics()
    }

    /// Refill one limiter.
    ///
    /// `Global` ignores `endpoint`. `Endpoint` needs one and returns `false`
    /// if it is missing or has no limiter yet.
    pub fn reset_rate_limiter(&self, scope: LimitScope, endpoint: Option<(&str, Method)>) -> bool {
        match scope {
            LimitScope::Global => {
                self.limiters().reset_global();
                true
            }
            LimitScope::Endpoint => endpoint
                .and_then(|(url, method)| self.endpoint_for(url, &method))
                .is_some_and(|key| self.limiters().reset_endpoint(&key)),
        }
    }

    /// Refill every limiter.
    pub fn reset_all_rate_limiters(&self) {
        self.limiters().reset_all();
    }

    /// Limiter keys grouped by health band.
    pub fn rate_limiter_status(&self) -> RateLimiterStatus {
        self.limiters().status()
    }
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.current_config())
            .field("transport", &self.inner.transport)
            .field("cache_size", &self.inner.cache.len())
            .field("observers", &self.inner.observers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::retry::NoJitter;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use http::StatusCode;
    use palisade_ratelimit::RateLimitConfig;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted outcomes and records every request it sees.
    type Scripted = std::result::Result<(u16, &'static str, &'static str), &'static str>;

    #[derive(Debug, Default, Clone)]
    struct ScriptedTransport {
        script: Arc<Mutex<VecDeque<Scripted>>>,
        seen: Arc<Mutex<Vec<TransportRequest>>>,
    }

    impl ScriptedTransport {
        fn push_ok(&self, status: u16, content_type: &'static str, body: &'static str) -> &Self {
            self.script.lock().push_back(Ok((status, content_type, body)));
            self
        }

        fn push_err(&self, message: &'static str) -> &Self {
            self.script.lock().push_back(Err(message));
            self
        }

        fn calls(&self) -> usize {
            self.seen.lock().len()
        }

        fn last(&self) -> TransportRequest {
            self.seen.lock().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            request: TransportRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            let url = request.url.clone();
            self.seen.lock().push(request);
            let next = self
                .script
                .lock()
                .pop_front()
                .unwrap_or(Ok((200, "application/json", "{}")));
            match next {
                Ok((status, content_type, body)) => {
                    let mut headers = HeaderMap::new();
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                    Ok(TransportResponse {
                        status: StatusCode::from_u16(status).unwrap(),
                        headers,
                        url,
                        body: Bytes::from_static(body.as_bytes()),
                    })
                }
                Err(message) => Err(TransportError::Connect(message.to_string())),
            }
        }
    }

    fn quiet_config() -> HttpClientConfig {
        HttpClientConfig::builder()
            .base_url("https://api.test")
            .retry_delay(Duration::from_millis(100))
            .logging(false)
            .build()
    }

    fn client_with(transport: &ScriptedTransport, config: HttpClientConfig) -> HttpClient {
        HttpClient::builder()
            .config(config)
            .transport(transport.clone())
            .jitter(NoJitter)
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_json_response() {
        let transport = ScriptedTransport::default();
        transport.push_ok(200, "application/json", r#"{"id":1}"#);
        let client = client_with(&transport, quiet_config());

        let response = client.get("/widgets/1").send().await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.as_json().unwrap()["id"], 1);
        assert!(!response.from_cache());
        assert_eq!(transport.last().url.as_str(), "https://api.test/widgets/1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_header_merge_order() {
        let transport = ScriptedTransport::default();
        let client = HttpClient::builder()
            .config(quiet_config())
            .transport(transport.clone())
            .token_provider(|| Some("tok".to_string()))
            .build()
            .unwrap();

        client
            .post("/widgets")
            .header("Accept", "text/plain")
            .header("Authorization", "Bearer caller")
            .json(&serde_json::json!({"name": "w"}))
            .send()
            .await
            .unwrap();

        let sent = transport.last();
        assert_eq!(sent.headers["accept"], "text/plain");
        assert_eq!(sent.headers["content-type"], "application/json");
        assert_eq!(sent.headers["authorization"], "Bearer tok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_include_auth_false_skips_token() {
        let transport = ScriptedTransport::default();
        let client = HttpClient::builder()
            .config(quiet_config())
            .transport(transport.clone())
            .token_provider(|| Some("tok".to_string()))
            .build()
            .unwrap();

        client.get("/public").include_auth(false).send().await.unwrap();

        assert!(!transport.last().headers.contains_key(AUTHORIZATION));
    }

    #[tokio::test(start_paused = true)]
    async fn test_multipart_has_no_content_type_header() {
        let transport = ScriptedTransport::default();
        let client = client_with(&transport, quiet_config());

        client
            .upload_file(
                "/files",
                FilePart::new("a.txt", "hello"),
                [("folder", "docs")],
                RequestConfig::default(),
            )
            .await
            .unwrap();

        let sent = transport.last();
        assert_eq!(sent.method, Method::POST);
        assert!(!sent.headers.contains_key(CONTENT_TYPE));
        match sent.body {
            TransportBody::Multipart(form) => {
                assert_eq!(form.fields(), &[("folder".to_string(), "docs".to_string())]);
                assert_eq!(form.files()[0].file_name(), "a.txt");
            }
            other => panic!("expected multipart body, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transport_failures_with_backoff() {
        let transport = ScriptedTransport::default();
        transport.push_err("refused").push_err("refused").push_err("refused");
        transport.push_ok(200, "application/json", r#"{"ok":true}"#);
        let client = client_with(&transport, quiet_config());

        let started = Instant::now();
        let response = client.get("/flaky").send().await.unwrap();

        assert!(response.ok());
        assert_eq!(transport.calls(), 4);
        assert_eq!(started.elapsed(), Duration::from_millis(700));
        assert_eq!(client.metrics().retry_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_returns_network_error() {
        let transport = ScriptedTransport::default();
        for _ in 0..4 {
            transport.push_err("refused");
        }
        let client = client_with(&transport, quiet_config());

        let err = client.get("/down").send().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(transport.calls(), 4);
        assert_eq!(client.metrics().failed_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_errors_are_not_retried() {
        let transport = ScriptedTransport::default();
        transport.push_ok(503, "application/json", r#"{"message":"maintenance"}"#);
        let client = client_with(&transport, quiet_config());

        let err = client.get("/busy").send().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.message(), "maintenance");
        assert_eq!(err.details().unwrap()["message"], "maintenance");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_error() {
        let transport = ScriptedTransport::default();
        transport.push_ok(200, "application/json", "not json");
        let client = client_with(&transport, quiet_config());

        let err = client.get("/broken").send().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(transport.calls(), 1);
    }

    #[derive(Debug)]
    struct SlowTransport;

    #[async_trait]
    impl Transport for SlowTransport {
        async fn send(
            &self,
            _request: TransportRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(TransportError::Other("unreachable".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried_then_reported() {
        let client = HttpClient::builder()
            .config(quiet_config())
            .transport(SlowTransport)
            .jitter(NoJitter)
            .build()
            .unwrap();

        let err = client
            .get("/slow")
            .timeout(Duration::from_millis(50))
            .retries(1)
            .send()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(client.metrics().retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_stops_retries_and_rejects() {
        let transport = ScriptedTransport::default();
        for _ in 0..10 {
            transport.push_err("refused");
        }
        let mut config = quiet_config();
        config.circuit_breaker = CircuitBreakerConfig::default()
            .with_volume_threshold(2)
            .with_failure_threshold(0.5);
        let client = client_with(&transport, config);

        let err = client.get("/down").send().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        // opened after the second failure, so no further retries
        assert_eq!(transport.calls(), 2);

        let err = client.get("/down").send().await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(err.details().unwrap()["circuitBreaker"], "OPEN");
        assert_eq!(transport.calls(), 2);

        assert_eq!(
            client.circuit_breaker_status().open,
            vec!["GET https://api.test/down".to_string()]
        );
        assert!(client.reset_circuit_breaker("/down", Method::GET));
        assert_eq!(client.circuit_breaker_status().closed.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_do_not_trip_breaker() {
        let transport = ScriptedTransport::default();
        for _ in 0..5 {
            transport.push_ok(404, "text/plain", "missing");
        }
        let mut config = quiet_config();
        config.circuit_breaker = CircuitBreakerConfig::default().with_volume_threshold(1);
        let client = client_with(&transport, config);

        for _ in 0..5 {
            let err = client.get("/missing").send().await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Client);
            assert_eq!(err.details(), Some(&Value::String("missing".into())));
        }
        let metrics = client.circuit_breaker_metrics("/missing", Method::GET).unwrap();
        assert_eq!(metrics.state, CircuitState::Closed);
        assert_eq!(metrics.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_rejection() {
        let transport = ScriptedTransport::default();
        let mut config = quiet_config();
        config.rate_limit = RateLimitConfig::default().with_per_endpoint(1, Duration::from_secs(1));
        let client = client_with(&transport, config);

        client.get("/limited").send().await.unwrap();
        let err = client.get("/limited").send().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Client);
        assert_eq!(err.details().unwrap()["rateLimitType"], "endpoint");
        assert_eq!(transport.calls(), 1);

        assert!(client.reset_rate_limiter(LimitScope::Endpoint, Some(("/limited", Method::GET))));
        assert!(client.get("/limited").send().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_skips_transport() {
        let transport = ScriptedTransport::default();
        transport.push_ok(200, "application/json", r#"{"n":1}"#);
        let client = client_with(&transport, quiet_config());

        let first = client.get("/cached").cache_ttl(Duration::from_secs(5)).send().await.unwrap();
        let second = client.get("/cached").cache_ttl(Duration::from_secs(5)).send().await.unwrap();

        assert!(!first.from_cache());
        assert!(second.from_cache());
        assert_eq!(first.data(), second.data());
        assert_eq!(transport.calls(), 1);
        assert_eq!(client.cache_size(), 1);

        let metrics = client.metrics();
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        client.get("/cached").cache(true).cache_ttl(Duration::from_secs(5)).send().await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[derive(Clone, Default)]
    struct CountingObserver {
        requests: Arc<AtomicUsize>,
        responses: Arc<AtomicUsize>,
        errors: Arc<AtomicUsize>,
        transitions: Arc<AtomicUsize>,
    }

    impl HttpObserver for CountingObserver {
        fn on_request(&self, _event: &RequestEvent) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }

        fn on_response(&self, _response: &HttpResponse) {
            self.responses.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _error: &HttpError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_circuit_state_change(&self, _transition: &StateTransition) {
            self.transitions.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_observers() {
        let transport = ScriptedTransport::default();
        transport.push_ok(200, "application/json", "{}");
        transport.push_ok(500, "application/json", "{}");
        let mut config = quiet_config();
        config.circuit_breaker = CircuitBreakerConfig::default().with_volume_threshold(2);
        let client = client_with(&transport, config);
        let observer = CountingObserver::default();
        let id = client.add_observer(observer.clone());

        client.get("/a").send().await.unwrap();
        client.get("/a").send().await.unwrap_err();

        assert_eq!(observer.requests.load(Ordering::SeqCst), 2);
        assert_eq!(observer.responses.load(Ordering::SeqCst), 1);
        assert_eq!(observer.errors.load(Ordering::SeqCst), 1);
        assert_eq!(observer.transitions.load(Ordering::SeqCst), 1);

        assert!(client.remove_observer(id));
        client.get("/a").send().await.unwrap_err();
        assert_eq!(observer.requests.load(Ordering::SeqCst), 2);
    }

    struct FailingInterceptor {
        errors: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RequestInterceptor for FailingInterceptor {
        async fn intercept(&self, _url: &str, config: &mut RequestConfig) -> Result<()> {
            config.insert_header("X-Partial", "1");
            Err(HttpError::new(ErrorKind::Unknown, "interceptor failed", ""))
        }

        fn on_error(&self, _error: &HttpError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct TagInterceptor;

    #[async_trait]
    impl RequestInterceptor for TagInterceptor {
        async fn intercept(&self, _url: &str, config: &mut RequestConfig) -> Result<()> {
            config.insert_header("X-Tag", "tagged");
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_interceptor_does_not_abort() {
        let transport = ScriptedTransport::default();
        let client = client_with(&transport, quiet_config());
        let errors = Arc::new(AtomicUsize::new(0));
        client.add_request_interceptor(FailingInterceptor {
            errors: errors.clone(),
        });
        let tag = client.add_request_interceptor(TagInterceptor);

        client.get("/a").send().await.unwrap();

        let sent = transport.last();
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(sent.headers["x-partial"], "1");
        assert_eq!(sent.headers["x-tag"], "tagged");

        assert!(client.remove_request_interceptor(tag));
        client.get("/b").send().await.unwrap();
        assert!(!transport.last().headers.contains_key("x-tag"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_recreates_limiters() {
        let transport = ScriptedTransport::default();
        let mut config = quiet_config();
        config.rate_limit =
            RateLimitConfig::default().with_per_endpoint(1, Duration::from_secs(60));
        let client = client_with(&transport, config);

        client.get("/a").send().await.unwrap();
        assert!(client.get("/a").send().await.is_err());

        client
            .update_config(|c| c.rate_limit = RateLimitConfig::disabled())
            .unwrap();
        assert!(client.get("/a").send().await.is_ok());
        assert!(!client.config().rate_limit.enabled);

        let invalid = client.update_config(|c| {
            c.rate_limit = RateLimitConfig::default().with_global(0, Duration::from_secs(1))
        });
        assert!(invalid.is_err());
        assert!(!client.config().rate_limit.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_rejects_invalid_breaker_atomically() {
        let transport = ScriptedTransport::default();
        let client = client_with(&transport, quiet_config());

        let invalid = client.update_config(|c| {
            c.rate_limit = RateLimitConfig::disabled();
            c.circuit_breaker = CircuitBreakerConfig::default().with_half_open_max_requests(0);
        });

        let err = invalid.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.message().contains("half_open_max_requests"));
        let config = client.config();
        assert!(config.rate_limit.enabled);
        assert_eq!(config.circuit_breaker.half_open_max_requests, 1);
        assert!(client.limiters().config().enabled);
    }

    #[test]
    fn test_build_rejects_invalid_breaker() {
        let configs = [
            CircuitBreakerConfig::default().with_half_open_max_requests(0),
            CircuitBreakerConfig::default().with_success_threshold(0),
            CircuitBreakerConfig::default().with_failure_threshold(0.0),
        ];
        for breaker in configs {
            let mut config = quiet_config();
            config.circuit_breaker = breaker;
            let err = HttpClient::builder()
                .config(config)
                .transport(ScriptedTransport::default())
                .build()
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unknown);
        }
    }

    /// Answers after a per-path delay and tracks overlapping calls.
    #[derive(Debug, Clone, Default)]
    struct PacedTransport {
        delays: Arc<Mutex<Vec<(&'static str, Duration)>>>,
        statuses: Arc<Mutex<VecDeque<u16>>>,
        calls: Arc<AtomicUsize>,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl PacedTransport {
        fn delay(&self, path: &'static str, delay: Duration) -> &Self {
            let mut delays = self.delays.lock();
            delays.retain(|(p, _)| *p != path);
            delays.push((path, delay));
            self
        }

        fn push_status(&self, status: u16) -> &Self {
            self.statuses.lock().push_back(status);
            self
        }

        fn client(&self, config: HttpClientConfig) -> HttpClient {
            HttpClient::builder()
                .config(config)
                .transport(self.clone())
                .jitter(NoJitter)
                .build()
                .unwrap()
        }
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Transport for PacedTransport {
        async fn send(
            &self,
            request: TransportRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _in_flight = InFlight(&self.in_flight);

            let delay = self
                .delays
                .lock()
                .iter()
                .find(|(path, _)| request.url.path() == *path)
                .map_or(Duration::ZERO, |(_, delay)| *delay);
            tokio::time::sleep(delay).await;

            let status = self.statuses.lock().pop_front().unwrap_or(200);
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Ok(TransportResponse {
                status: StatusCode::from_u16(status).unwrap(),
                headers,
                url: request.url,
                body: Bytes::from_static(b"{}"),
            })
        }
    }

    fn fragile_breaker() -> CircuitBreakerConfig {
        CircuitBreakerConfig::default()
            .with_volume_threshold(1)
            .with_open_duration(Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_half_open_request_frees_slot() {
        let transport = PacedTransport::default();
        transport.push_status(500);
        let mut config = quiet_config();
        config.circuit_breaker = fragile_breaker();
        let client = transport.client(config);

        client.get("/a").send().await.unwrap_err();
        tokio::time::advance(Duration::from_secs(2)).await;

        transport.delay("/a", Duration::from_secs(10));
        let cancelled =
            tokio::time::timeout(Duration::from_millis(100), client.get("/a").send()).await;
        assert!(cancelled.is_err());
        let metrics = client.circuit_breaker_metrics("/a", Method::GET).unwrap();
        assert_eq!(metrics.state, CircuitState::HalfOpen);

        transport.delay("/a", Duration::ZERO);
        let response = client.get("/a").send().await.unwrap();
        assert!(response.ok());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_one_concurrent_request() {
        let transport = PacedTransport::default();
        transport.push_status(500);
        let mut config = quiet_config();
        config.circuit_breaker = fragile_breaker()
            .with_success_threshold(1)
            .with_half_open_max_requests(1);
        let client = transport.client(config);

        client.get("/a").send().await.unwrap_err();
        tokio::time::advance(Duration::from_secs(2)).await;
        transport.delay("/a", Duration::from_millis(100));

        let (admitted, refused) = tokio::join!(client.get("/a").send(), client.get("/a").send());

        assert!(admitted.unwrap().ok());
        let refused = refused.unwrap_err();
        assert!(refused.is_circuit_open());
        assert_eq!(refused.details().unwrap()["circuitBreaker"], "HALF_OPEN");
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        let metrics = client.circuit_breaker_metrics("/a", Method::GET).unwrap();
        assert_eq!(metrics.state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_timeouts_are_independent() {
        let transport = PacedTransport::default();
        transport.delay("/slow", Duration::from_secs(1));
        let client = transport.client(quiet_config());

        let started = Instant::now();
        let (short, long) = tokio::join!(
            client
                .get("/slow")
                .timeout(Duration::from_millis(50))
                .retries(0)
                .send(),
            client.get("/slow").send(),
        );

        assert_eq!(short.unwrap_err().kind(), ErrorKind::Timeout);
        assert!(long.unwrap().ok());
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert_eq!(transport.peak.load(Ordering::SeqCst), 2);
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_relative_url_without_base_fails() {
        let transport = ScriptedTransport::default();
        let client = client_with(&transport, HttpClientConfig::builder().logging(false).build());

        let err = client.get("/widgets").send().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(transport.calls(), 0);
    }
}
