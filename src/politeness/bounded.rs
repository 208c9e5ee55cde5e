//! Capacity-bounded shared cache

use crate::politeness::recency::{EvictionPolicy, RecencyIndex};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of [`BoundedCache::get_or_create`]
pub struct Lookup<K, V> {
    /// The cached (or freshly created) value
    pub value: Arc<V>,

    /// Whether the value was created by this lookup
    pub created: bool,

    /// The entry dropped to stay within capacity, if any
    pub evicted: Option<(K, Arc<V>)>,
}

struct Inner<K, V, P> {
    entries: HashMap<K, Arc<V>>,
    policy: P,
}

/// A map from keys to shared values that never holds more than `capacity`
/// entries
///
/// Every lookup is serialized by one internal lock and counts as a use for the
/// eviction policy. When an insertion pushes the size past capacity, the
/// policy's victim is removed. Values are handed out as `Arc`s, so an evicted
/// value stays alive for callers that still hold it.
pub struct BoundedCache<K, V, P = RecencyIndex<K>> {
    inner: Mutex<Inner<K, V, P>>,
    capacity: usize,
}

impl<K, V, P> BoundedCache<K, V, P>
where
    K: Eq + Hash + Clone,
    P: EvictionPolicy<K>,
{
    /// Creates an empty cache; a capacity of zero is raised to one
    pub fn with_policy(capacity: usize, policy: P) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                policy,
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V, P>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the value for `key`, creating it with `make` if absent
    pub fn get_or_create(&self, key: &K, make: impl FnOnce() -> V) -> Lookup<K, V> {
        let mut inner = self.lock();
        inner.policy.touch(key);

        if let Some(value) = inner.entries.get(key) {
            return Lookup {
                value: Arc::clone(value),
                created: false,
                evicted: None,
            };
        }

        let value = Arc::new(make());
        inner.entries.insert(key.clone(), Arc::clone(&value));

        let mut evicted = None;
        while inner.entries.len() > self.capacity {
            let Some(victim) = inner.policy.victim() else {
                break;
            };
            if let Some(old) = inner.entries.remove(&victim) {
                evicted = Some((victim, old));
            }
        }

        Lookup {
            value,
            created: true,
            evicted,
        }
    }

    /// Returns the value for `key` without counting it as a use
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.lock().entries.get(key).cloned()
    }

    /// Removes `key` from the cache
    pub fn evict(&self, key: &K) -> Option<Arc<V>> {
        let mut inner = self.lock();
        inner.policy.remove(key);
        inner.entries.remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<K, V> BoundedCache<K, V, RecencyIndex<K>>
where
    K: Eq + Hash + Clone + Send,
{
    /// Creates an empty least-recently-used cache
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, RecencyIndex::new())
    }

    /// Keys from least to most recently used
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.lock().policy.iter().cloned().collect()
    }
}
