//! Read-only observers of the request lifecycle.
//!
//! Observers cannot influence a request. A panicking observer is logged and
//! skipped; the request and the remaining observers are unaffected.

use http::Method;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::circuit_breaker::StateTransition;
use crate::hooks::Hooks;
use crate::{HttpError, HttpResponse};

/// A request as it enters the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    pub method: Method,
    /// Resolved URL, unsanitized.
    pub url: String,
    /// Endpoint key scoping breaker and limiter state.
    pub endpoint: String,
}

/// Lifecycle taps. Every method defaults to a no-op.
pub trait HttpObserver: Send + Sync {
    fn on_request(&self, _event: &RequestEvent) {}

    fn on_response(&self, _response: &HttpResponse) {}

    /// Called at most once per failed request.
    fn on_error(&self, _error: &HttpError) {}

    fn on_circuit_state_change(&self, _transition: &StateTransition) {}
}

/// Handle returned by [`HttpClient::add_observer`](crate::HttpClient::add_observer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    hooks: Hooks<dyn HttpObserver>,
}

impl ObserverRegistry {
    pub(crate) fn add(&self, observer: Arc<dyn HttpObserver>) -> ObserverId {
        ObserverId(self.hooks.add(observer))
    }

    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        self.hooks.remove(id.0)
    }

    pub(crate) fn clear(&self) {
        self.hooks.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    fn each(&self, hook: &str, f: impl Fn(&dyn HttpObserver)) {
        for observer in self.hooks.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))).is_err() {
                palisade_log::error!("Observer panicked in {}", hook);
            }
        }
    }

    pub(crate) fn notify_request(&self, event: &RequestEvent) {
        self.each("on_request", |o| o.on_request(event));
    }

    pub(crate) fn notify_response(&self, response: &HttpResponse) {
        self.each("on_response", |o| o.on_response(response));
    }

    /// Notify once; later calls for the same error are ignored.
    pub(crate) fn notify_error(&self, error: &mut HttpError) {
        if error.observed {
            return;
        }
        error.observed = true;
        let error = &*error;
        self.each("on_error", |o| o.on_error(error));
    }

    pub(crate) fn notify_transition(&self, transition: &StateTransition) {
        self.each("on_circuit_state_change", |o| o.on_circuit_state_change(transition));
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        errors: AtomicUsize,
        requests: AtomicUsize,
    }

    impl HttpObserver for Counting {
        fn on_request(&self, _event: &RequestEvent) {
            self.requests.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _error: &HttpError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicking;

    impl HttpObserver for Panicking {
        fn on_request(&self, _event: &RequestEvent) {
            panic!("observer failure");
        }
    }

    fn event() -> RequestEvent {
        RequestEvent {
            method: Method::GET,
            url: "https://api.test/a".into(),
            endpoint: "GET https://api.test/a".into(),
        }
    }

    #[test]
    fn test_error_notified_once() {
        let registry = ObserverRegistry::default();
        let counting = Arc::new(Counting::default());
        registry.add(counting.clone());

        let mut error = HttpError::new(ErrorKind::Server, "boom", "https://api.test/a");
        registry.notify_error(&mut error);
        registry.notify_error(&mut error);

        assert_eq!(counting.errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let registry = ObserverRegistry::default();
        let counting = Arc::new(Counting::default());
        registry.add(Arc::new(Panicking));
        registry.add(counting.clone());

        registry.notify_request(&event());

        assert_eq!(counting.requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove() {
        let registry = ObserverRegistry::default();
        let counting = Arc::new(Counting::default());
        let id = registry.add(counting.clone());

        assert!(registry.remove(id));
        registry.notify_request(&event());
        assert_eq!(counting.requests.load(Ordering::SeqCst), 0);
    }
}
