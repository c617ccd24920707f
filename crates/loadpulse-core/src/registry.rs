//! At most one in-flight load per key.
//!
//! [`DedupRegistry`] couples two maps under one lock: key to placeholder, and
//! the set of keys with a load in flight. Every operation is O(1) under the
//! lock, so it is safe to call from any thread without queueing behind a slow
//! load.
//!
//! The registry is an ordinary value. Share it with an `Arc` between the
//! places that expand the same view; tests create their own.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::logging::targets;
use crate::placeholder::ExpansionPlaceholder;

struct RegistryInner<K> {
    placeholders: HashMap<K, Arc<ExpansionPlaceholder<K>>>,
    in_flight: HashSet<K>,
}

/// Process-wide coordination of per-key loads.
pub struct DedupRegistry<K> {
    inner: Mutex<RegistryInner<K>>,
}

impl<K> DedupRegistry<K>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                placeholders: HashMap::new(),
                in_flight: HashSet::new(),
            }),
        }
    }

    /// Get the placeholder of `key`, creating it on first use.
    pub fn create_placeholder(&self, key: &K) -> Arc<ExpansionPlaceholder<K>> {
        let mut inner = self.inner.lock();
        inner
            .placeholders
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::trace!(target: targets::REGISTRY, ?key, "placeholder created");
                Arc::new(ExpansionPlaceholder::new(key.clone()))
            })
            .clone()
    }

    /// Mark `key` as loading if it is not already.
    ///
    /// Returns `true` if this call claimed the key. This is the only gate that
    /// decides whether a new load may start.
    pub fn try_begin_load(&self, key: &K) -> bool {
        let claimed = self.inner.lock().in_flight.insert(key.clone());
        if !claimed {
            tracing::debug!(target: targets::REGISTRY, ?key, "load already in flight");
        }
        claimed
    }

    /// Dispose the placeholder of `key` and release its in-flight mark.
    ///
    /// A no-op for keys that are unknown or already disposed.
    pub fn dispose(&self, key: &K) {
        let placeholder = {
            let mut inner = self.inner.lock();
            inner.in_flight.remove(key);
            inner.placeholders.remove(key)
        };
        if let Some(placeholder) = placeholder {
            placeholder.mark_disposed();
            tracing::trace!(target: targets::REGISTRY, ?key, "placeholder disposed");
        }
    }

    /// The live placeholder of `key`, if any.
    pub fn placeholder(&self, key: &K) -> Option<Arc<ExpansionPlaceholder<K>>> {
        self.inner.lock().placeholders.get(key).cloned()
    }

    /// Whether a load for `key` is in flight.
    pub fn is_loading(&self, key: &K) -> bool {
        self.inner.lock().in_flight.contains(key)
    }

    /// Number of live placeholders.
    pub fn len(&self) -> usize {
        self.inner.lock().placeholders.len()
    }

    /// Whether there are no placeholders and no loads in flight.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.placeholders.is_empty() && inner.in_flight.is_empty()
    }

    /// Dispose every placeholder and forget every in-flight mark.
    pub fn clear(&self) {
        let placeholders: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.in_flight.clear();
            inner.placeholders.drain().map(|(_, p)| p).collect()
        };
        for placeholder in placeholders {
            placeholder.mark_disposed();
        }
    }
}

impl<K> Default for DedupRegistry<K>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Debug for DedupRegistry<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DedupRegistry")
            .field("placeholders", &inner.placeholders.len())
            .field("in_flight", &inner.in_flight.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_create_placeholder_is_idempotent() {
        let registry = DedupRegistry::new();
        let first = registry.create_placeholder(&"schema");
        let second = registry.create_placeholder(&"schema");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_gate_round_trip() {
        let registry = DedupRegistry::new();
        assert!(registry.try_begin_load(&1));
        assert!(!registry.try_begin_load(&1));
        assert!(!registry.try_begin_load(&1));
        assert!(registry.is_loading(&1));

        registry.dispose(&1);
        assert!(!registry.is_loading(&1));
        assert!(registry.try_begin_load(&1));
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let registry = DedupRegistry::new();
        let placeholder = registry.create_placeholder(&"k");
        registry.try_begin_load(&"k");

        registry.dispose(&"k");
        registry.dispose(&"k");
        registry.dispose(&"never-registered");

        assert!(placeholder.is_disposed());
        assert!(registry.is_empty());
        assert!(registry.placeholder(&"k").is_none());
    }

    #[test]
    fn test_new_placeholder_after_dispose() {
        let registry = DedupRegistry::new();
        let first = registry.create_placeholder(&"k");
        registry.dispose(&"k");
        let second = registry.create_placeholder(&"k");
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_disposed());
    }

    #[test]
    fn test_clear_disposes_everything() {
        let registry = DedupRegistry::new();
        let a = registry.create_placeholder(&"a");
        let b = registry.create_placeholder(&"b");
        registry.try_begin_load(&"a");

        registry.clear();
        assert!(a.is_disposed());
        assert!(b.is_disposed());
        assert!(registry.is_empty());
        assert!(registry.try_begin_load(&"a"));
    }

    #[test]
    fn test_concurrent_begin_grants_once() {
        const CALLERS: usize = 16;
        let registry = Arc::new(DedupRegistry::new());
        let barrier = Arc::new(Barrier::new(CALLERS));
        let granted = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..CALLERS)
            .map(|_| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                let granted = granted.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.create_placeholder(&"node");
                    if registry.try_begin_load(&"node") {
                        granted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(granted.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }
}
