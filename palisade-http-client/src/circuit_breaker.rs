//! Per-endpoint circuit breaker.
//!
//! Each endpoint key owns a breaker that moves between three states:
//!
//! - `Closed`: requests flow. Once `volume_threshold` outcomes have been
//!   recorded, a failure rate at or above `failure_threshold` opens the circuit.
//! - `Open`: requests are refused until `open_duration` has elapsed, then the
//!   next caller moves the breaker to `HalfOpen`.
//! - `HalfOpen`: up to `half_open_max_requests` trial requests run at once. One
//!   failure reopens the circuit; `success_threshold` successes close it.
//!
//! Every state change is returned to the caller as a [`StateTransition`].
//! Admission is a [`BreakerPermit`]; dropping it unreported gives a half-open
//! slot back, so a cancelled request never holds one.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Requests are allowed.
    Closed,
    /// Requests are rejected.
    Open,
    /// A limited number of trial requests are allowed.
    HalfOpen,
}

impl CircuitState {
    /// Upper-case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Whether breakers guard requests at all.
    pub enabled: bool,
    /// Failure rate (0.0 to 1.0) that opens the circuit.
    pub failure_threshold: f64,
    /// Half-open successes needed to close the circuit.
    pub success_threshold: u32,
    /// Time the circuit stays open before probing.
    pub open_duration: Duration,
    /// Concurrent requests allowed while half-open.
    pub half_open_max_requests: u32,
    /// Outcomes required before the failure rate is evaluated.
    pub volume_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 0.5,
            success_threshold: 2,
            open_duration: Duration::from_secs(30),
            half_open_max_requests: 1,
            volume_threshold: 5,
        }
    }
}

impl CircuitBreakerConfig {
    /// A configuration that never rejects.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the failure rate that opens the circuit.
    pub fn with_failure_threshold(mut self, rate: f64) -> Self {
        self.failure_threshold = rate;
        self
    }

    /// Set the half-open successes needed to close the circuit.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open.
    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Set the number of concurrent half-open requests.
    pub fn with_half_open_max_requests(mut self, count: u32) -> Self {
        self.half_open_max_requests = count;
        self
    }

    /// Set the minimum sample size.
    pub fn with_volume_threshold(mut self, volume: u32) -> Self {
        self.volume_threshold = volume;
        self
    }

    /// Reject a failure rate outside `(0, 1]` and zero success or half-open
    /// request counts.
    pub fn validate(&self) -> Result<(), CircuitConfigError> {
        if !(self.failure_threshold > 0.0 && self.failure_threshold <= 1.0) {
            return Err(CircuitConfigError(format!(
                "failure_threshold must be in (0, 1], got {}",
                self.failure_threshold
            )));
        }
        if self.success_threshold == 0 {
            return Err(CircuitConfigError(
                "success_threshold must be greater than 0".into(),
            ));
        }
        if self.half_open_max_requests == 0 {
            return Err(CircuitConfigError(
                "half_open_max_requests must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// A circuit breaker configuration that cannot be used.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid circuit breaker configuration: {0}")]
pub struct CircuitConfigError(pub String);

/// Snapshot of one breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerMetrics {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub total_requests: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub state_changed_at: DateTime<Utc>,
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl CircuitBreakerMetrics {
    /// Failures as a fraction of recorded outcomes.
    pub fn failure_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            f64::from(self.failures) / f64::from(self.total_requests)
        }
    }
}

/// A state change, with the counters as they stood just before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    pub key: String,
    pub from: CircuitState,
    pub to: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub total_requests: u32,
}

/// A request refused by an open or saturated breaker.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("circuit breaker {state} for {key}, retry after {}ms", retry_after.as_millis())]
pub struct CircuitOpenError {
    /// Endpoint key of the breaker.
    pub key: String,
    /// State that caused the rejection.
    pub state: CircuitState,
    /// Time until the breaker will admit a request.
    pub retry_after: Duration,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Bumped on every transition and reset.
    generation: u64,
    failures: u32,
    successes: u32,
    total_requests: u32,
    half_open_in_flight: u32,
    next_attempt: Option<Instant>,
    next_attempt_at: Option<DateTime<Utc>>,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    state_changed_at: DateTime<Utc>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            generation: 0,
            failures: 0,
            successes: 0,
            total_requests: 0,
            half_open_in_flight: 0,
            next_attempt: None,
            next_attempt_at: None,
            last_failure_time: None,
            last_success_time: None,
            state_changed_at: Utc::now(),
        }
    }
}

/// Circuit breaker for one endpoint key.
#[derive(Debug)]
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    /// Endpoint key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Configuration in effect.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Current state, without triggering the open to half-open move.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask to send one request.
    ///
    /// An open breaker whose timer has expired moves to half-open here; the
    /// permit carries that transition. In half-open the permit holds a
    /// slot until it reports an outcome, is released, or is dropped.
    pub fn can_proceed(&self) -> Result<BreakerPermit<'_>, CircuitOpenError> {
        if !self.config.enabled {
            return Ok(BreakerPermit::new(self, 0, None));
        }

        let mut inner = self.inner.lock();
        let mut transition = None;

        if inner.state == CircuitState::Open {
            let now = Instant::now();
            match inner.next_attempt {
                Some(next) if now < next => {
                    return Err(CircuitOpenError {
                        key: self.key.clone(),
                        state: CircuitState::Open,
                        retry_after: next - now,
                    });
                }
                _ => transition = Some(self.transition(&mut inner, CircuitState::HalfOpen)),
            }
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.half_open_in_flight >= self.config.half_open_max_requests {
                return Err(CircuitOpenError {
                    key: self.key.clone(),
                    state: CircuitState::HalfOpen,
                    retry_after: Duration::ZERO,
                });
            }
            inner.half_open_in_flight += 1;
        }

        Ok(BreakerPermit::new(self, inner.generation, transition))
    }

    /// Record a successful request admitted without a permit.
    pub fn record_success(&self) -> Option<StateTransition> {
        if !self.config.enabled {
            return None;
        }
        let mut inner = self.inner.lock();
        self.on_success(&mut inner)
    }

    /// Record a failed request admitted without a permit.
    pub fn record_failure(&self) -> Option<StateTransition> {
        if !self.config.enabled {
            return None;
        }
        let mut inner = self.inner.lock();
        self.on_failure(&mut inner)
    }

    fn on_success(&self, inner: &mut BreakerState) -> Option<StateTransition> {
        inner.last_success_time = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                inner.successes += 1;
                inner.total_requests += 1;
                None
            }
            CircuitState::HalfOpen => {
                inner.successes += 1;
                inner.total_requests += 1;
                (inner.successes >= self.config.success_threshold)
                    .then(|| self.transition(inner, CircuitState::Closed))
            }
            CircuitState::Open => None,
        }
    }

    fn on_failure(&self, inner: &mut BreakerState) -> Option<StateTransition> {
        inner.last_failure_time = Some(Utc::now());

        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                inner.total_requests += 1;
                let total = inner.total_requests;
                let rate = f64::from(inner.failures) / f64::from(total);
                (total >= self.config.volume_threshold && rate >= self.config.failure_threshold)
                    .then(|| self.transition(inner, CircuitState::Open))
            }
            CircuitState::HalfOpen => {
                inner.failures += 1;
                inner.total_requests += 1;
                Some(self.transition(inner, CircuitState::Open))
            }
            CircuitState::Open => None,
        }
    }

    /// Settle a permit. `None` gives the slot back without an outcome.
    fn settle(&self, generation: u64, outcome: Option<bool>) -> Option<StateTransition> {
        if !self.config.enabled {
            return None;
        }

        let mut inner = self.inner.lock();
        // Admitted before the last transition: its slot and outcome went with it.
        if inner.generation != generation {
            return None;
        }
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }

        match outcome {
            Some(true) => self.on_success(&mut inner),
            Some(false) => self.on_failure(&mut inner),
            None => None,
        }
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) -> Option<StateTransition> {
        let mut inner = self.inner.lock();
        let transition = (inner.state != CircuitState::Closed)
            .then(|| self.transition(&mut inner, CircuitState::Closed));
        let generation = inner.generation + 1;
        *inner = BreakerState::new();
        inner.generation = generation;
        transition
    }

    /// Snapshot of the breaker.
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let inner = self.inner.lock();
        CircuitBreakerMetrics {
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            total_requests: inner.total_requests,
            last_failure_time: inner.last_failure_time,
            last_success_time: inner.last_success_time,
            state_changed_at: inner.state_changed_at,
            next_attempt_at: inner.next_attempt_at,
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) -> StateTransition {
        let event = StateTransition {
            key: self.key.clone(),
            from: inner.state,
            to,
            failures: inner.failures,
            successes: inner.successes,
            total_requests: inner.total_requests,
        };

        inner.state = to;
        inner.generation += 1;
        inner.state_changed_at = Utc::now();
        inner.failures = 0;
        inner.successes = 0;
        inner.total_requests = 0;
        inner.half_open_in_flight = 0;

        if to == CircuitState::Open {
            let open_for = self.config.open_duration;
            inner.next_attempt = Some(Instant::now() + open_for);
            inner.next_attempt_at = chrono::Duration::from_std(open_for)
                .ok()
                .map(|d| inner.state_changed_at + d);
        } else {
            inner.next_attempt = None;
            inner.next_attempt_at = None;
        }

        event
    }
}

/// Admission to send one request through a [`CircuitBreaker`].
///
/// Report the outcome with [`record_success`](Self::record_success),
/// [`record_failure`](Self::record_failure) or [`release`](Self::release).
/// Dropping an unreported permit releases it. Outcomes of permits issued
/// before the breaker last changed state are ignored.
#[must_use = "dropping a permit releases it without recording an outcome"]
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    transition: Option<StateTransition>,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(
        breaker: &'a CircuitBreaker,
        generation: u64,
        transition: Option<StateTransition>,
    ) -> Self {
        Self {
            breaker,
            generation,
            transition,
            settled: false,
        }
    }

    /// The open to half-open move made while admitting, if any.
    pub fn take_transition(&mut self) -> Option<StateTransition> {
        self.transition.take()
    }

    pub fn record_success(mut self) -> Option<StateTransition> {
        self.settled = true;
        self.breaker.settle(self.generation, Some(true))
    }

    pub fn record_failure(mut self) -> Option<StateTransition> {
        self.settled = true;
        self.breaker.settle(self.generation, Some(false))
    }

    /// Give the slot back without counting an outcome.
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.settle(self.generation, None);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.settle(self.generation, None);
        }
    }
}

/// Endpoint keys grouped by breaker state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerStatus {
    pub closed: Vec<String>,
    pub open: Vec<String>,
    pub half_open: Vec<String>,
}

/// Breakers keyed by endpoint, created on first use.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Create an empty registry.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Configuration handed to new breakers.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker for `key`, created closed if missing.
    pub fn get_or_create(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(key) {
            return breaker.clone();
        }
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, self.config.clone())))
            .clone()
    }

    /// Breaker for `key`, if one exists.
    pub fn get(&self, key: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(key).map(|b| b.clone())
    }

    pub fn metrics(&self, key: &str) -> Option<CircuitBreakerMetrics> {
        self.breakers.get(key).map(|b| b.metrics())
    }

    /// Metrics of every breaker, sorted by key.
    pub fn all_metrics(&self) -> Vec<(String, CircuitBreakerMetrics)> {
        let mut all: Vec<_> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metrics()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Reset one breaker. Returns `None` if it does not exist.
    pub fn reset(&self, key: &str) -> Option<Option<StateTransition>> {
        self.breakers.get(key).map(|b| b.reset())
    }

    /// Reset every breaker, returning the transitions that occurred.
    pub fn reset_all(&self) -> Vec<StateTransition> {
        self.breakers
            .iter()
            .filter_map(|entry| entry.value().reset())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Group every breaker by state.
    pub fn status(&self) -> CircuitBreakerStatus {
        let mut status = CircuitBreakerStatus::default();
        for (key, metrics) in self.all_metrics() {
            match metrics.state {
                CircuitState::Closed => status.closed.push(key),
                CircuitState::Open => status.open.push(key),
                CircuitState::HalfOpen => status.half_open.push(key),
            }
        }
        status
    }
}
