//! Aggregate request counters.

use http::Method;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Snapshot of the client's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_duration: Duration,
    /// `total_duration` over completed requests.
    pub average_duration: Duration,
    pub requests_by_method: BTreeMap<String, u64>,
    pub requests_by_status: BTreeMap<u16, u64>,
    pub retry_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl HttpMetrics {
    /// Cache hits as a fraction of cache lookups.
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Thread-safe accumulator behind [`HttpMetrics`].
#[derive(Debug, Default)]
pub struct MetricsTracker {
    inner: Mutex<HttpMetrics>,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request as it starts.
    pub fn record_request(&self, method: &Method) {
        let mut m = self.inner.lock();
        m.total_requests += 1;
        *m.requests_by_method
            .entry(method.as_str().to_string())
            .or_default() += 1;
    }

    pub fn record_success(&self, status: u16, duration: Duration) {
        let mut m = self.inner.lock();
        m.successful_requests += 1;
        m.total_duration += duration;
        *m.requests_by_status.entry(status).or_default() += 1;
    }

    /// Count a failure; `status` is `None` when no response was received.
    pub fn record_failure(&self, status: Option<u16>, duration: Duration) {
        let mut m = self.inner.lock();
        m.failed_requests += 1;
        m.total_duration += duration;
        if let Some(status) = status {
            *m.requests_by_status.entry(status).or_default() += 1;
        }
    }

    pub fn record_retry(&self) {
        self.inner.lock().retry_count += 1;
    }

    pub fn record_cache_hit(&self) {
        self.inner.lock().cache_hits += 1;
    }

    pub fn record_cache_miss(&self) {
        self.inner.lock().cache_misses += 1;
    }

    /// Current counters with the average derived.
    pub fn snapshot(&self) -> HttpMetrics {
        let mut snapshot = self.inner.lock().clone();
        let completed = snapshot.successful_requests + snapshot.failed_requests;
        if completed > 0 {
            let nanos = snapshot.total_duration.as_nanos() / u128::from(completed);
            snapshot.average_duration = Duration::from_nanos(nanos as u64);
        }
        snapshot
    }

    pub fn reset(&self) {
        *self.inner.lock() = HttpMetrics::default();
    }
}
