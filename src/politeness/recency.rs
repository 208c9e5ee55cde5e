//! Least-recently-touched ordering for cache eviction

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Chooses which entry a bounded cache drops when it grows past capacity
pub trait EvictionPolicy<K>: Send {
    /// Records a use of `key`
    fn touch(&mut self, key: &K);

    /// Forgets `key`
    fn remove(&mut self, key: &K);

    /// Removes and returns the next entry to evict
    fn victim(&mut self) -> Option<K>;
}

/// An ordered, de-duplicated queue of keys by recency of use
///
/// `touch` moves a key to the most-recent end (remove then append); the
/// least-recent key is the eviction candidate.
#[derive(Debug, Clone)]
pub struct RecencyIndex<K> {
    ticks: HashMap<K, u64>,
    order: BTreeMap<u64, K>,
    next_tick: u64,
}

impl<K: Eq + Hash + Clone> RecencyIndex<K> {
    pub fn new() -> Self {
        Self {
            ticks: HashMap::new(),
            order: BTreeMap::new(),
            next_tick: 0,
        }
    }

    /// Moves `key` to the most-recent end, inserting it if absent
    pub fn touch(&mut self, key: &K) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
        let tick = self.next_tick;
        self.next_tick += 1;
        self.ticks.insert(key.clone(), tick);
        self.order.insert(tick, key.clone());
    }

    /// Removes `key`, returning whether it was present
    pub fn remove(&mut self, key: &K) -> bool {
        match self.ticks.remove(key) {
            Some(tick) => {
                self.order.remove(&tick);
                true
            }
            None => false,
        }
    }

    /// Removes and returns the least recently touched key
    pub fn pop_least_recent(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    /// Keys from least to most recently touched
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for RecencyIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + Send> EvictionPolicy<K> for RecencyIndex<K> {
    fn touch(&mut self, key: &K) {
        RecencyIndex::touch(self, key);
    }

    fn remove(&mut self, key: &K) {
        RecencyIndex::remove(self, key);
    }

    fn victim(&mut self) -> Option<K> {
        self.pop_least_recent()
    }
}
