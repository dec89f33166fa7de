//! Bounded mapping that evicts the least-recently *inserted* key.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

use tracing::debug;

const DEFAULT_MAX_ITEMS: usize = 128;

/// Insertion-ordered cache with a fixed capacity.
///
/// Unlike a textbook LRU, [`get`](LruCache::get) never refreshes a key's
/// position: entries age out by time of last insert, so a value that is
/// consulted forever but never re-added still eventually falls out.
pub struct LruCache<K, V> {
    max_items: usize,
    map: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new(max_items: usize) -> Self {
        LruCache {
            max_items,
            map: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Insert `value` at the newest position, displacing any previous
    /// binding for `key`, then evict from the oldest end down to capacity.
    pub fn add(&mut self, key: K, value: V) {
        if self.map.remove(&key).is_some() {
            self.order.retain(|known| known != &key);
        }
        self.order.push_back(key.clone());
        self.map.insert(key, value);

        while self.map.len() > self.max_items {
            if let Some(oldest) = self.order.pop_front() {
                debug!(key = ?oldest, "evicting cached entry");
                self.map.remove(&oldest);
            }
        }
    }

    /// Read-only lookup; does not affect eviction order.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.map.get(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K, V> Default for LruCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITEMS)
    }
}
