//! Ordered, id-addressed hook lists.

use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct Hooks<T: ?Sized> {
    next_id: AtomicU64,
    items: RwLock<Vec<(u64, Arc<T>)>>,
}

impl<T: ?Sized> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            items: RwLock::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> Hooks<T> {
    pub(crate) fn add(&self, item: Arc<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.items.write().push((id, item));
        id
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|(existing, _)| *existing != id);
        items.len() != before
    }

    pub(crate) fn clear(&self) {
        self.items.write().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Registered items in registration order. The lock is not held while
    /// callers run them.
    pub(crate) fn snapshot(&self) -> Vec<Arc<T>> {
        self.items.read().iter().map(|(_, item)| item.clone()).collect()
    }
}
