//! Response cache with per-entry TTL and insertion-order eviction.
//!
//! Only successful GET responses are stored. Expired entries are dropped when
//! read and by a periodic background sweep.

use http::{HeaderMap, Method};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::request::RequestBody;
use crate::response::HttpResponse;

/// Digest of the request signature.
///
/// Not collision resistant; never use it as a security boundary.
pub fn cache_key(
    method: &Method,
    url: &str,
    headers: &HeaderMap,
    body: Option<&RequestBody>,
) -> String {
    let mut hasher = DefaultHasher::new();
    method.as_str().hash(&mut hasher);
    url.hash(&mut hasher);

    let mut sorted: Vec<(&str, &[u8])> = headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_bytes()))
        .collect();
    sorted.sort();
    sorted.hash(&mut hasher);

    body.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: HttpResponse,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) > self.ttl
    }
}

#[derive(Debug)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
    max_entries: usize,
}

impl CacheInner {
    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    fn evict_to(&mut self, limit: usize) {
        while self.entries.len() > limit {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

/// Bounded TTL cache of responses.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    /// Create a cache holding at most `max_entries` responses.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                max_entries,
            }),
        }
    }

    /// Cached response for `key`, marked as served from cache.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<HttpResponse> {
        let mut inner = self.inner.lock();
        let expired = inner.entries.get(key)?.is_expired(Instant::now());
        if expired {
            inner.remove(key);
            return None;
        }
        inner
            .entries
            .get(key)
            .map(|entry| entry.response.clone().into_cached())
    }

    /// Store a response. Returns `false` unless `method` is GET and the
    /// response is 2xx.
    pub fn set(&self, key: &str, method: &Method, response: &HttpResponse, ttl: Duration) -> bool {
        if *method != Method::GET || !response.ok() {
            return false;
        }

        let mut inner = self.inner.lock();
        if inner.max_entries == 0 {
            return false;
        }

        inner.remove(key);
        let limit = inner.max_entries - 1;
        inner.evict_to(limit);
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                response: response.clone(),
                inserted_at: Instant::now(),
                ttl,
            },
        );
        inner.order.push_back(key.to_string());
        true
    }

    /// Drop one entry.
    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.lock().remove(key)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn remove_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.remove(key);
        }
        expired.len()
    }

    /// Change the capacity, evicting the oldest entries if needed.
    pub fn set_max_entries(&self, max_entries: usize) {
        let mut inner = self.inner.lock();
        inner.max_entries = max_entries;
        inner.evict_to(max_entries);
    }

    pub fn max_entries(&self) -> usize {
        self.inner.lock().max_entries
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Spawn the periodic sweep on the current runtime.
///
/// The task holds only a weak reference and ends once the cache is dropped.
/// Returns `None` outside a tokio runtime or for a zero interval.
pub(crate) fn spawn_sweeper(cache: &Arc<ResponseCache>, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }
    let handle = tokio::runtime::Handle::try_current().ok()?;
    let weak: Weak<ResponseCache> = Arc::downgrade(cache);

    Some(handle.spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        loop {
            interval.tick().await;
            let Some(cache) = weak.upgrade() else {
                break;
            };
            let removed = cache.remove_expired();
            if removed > 0 {
                palisade_log::debug!("Cache sweep removed {} expired entries", removed);
            }
        }
    }))
}
