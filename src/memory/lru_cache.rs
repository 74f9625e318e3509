//! Capacity-bounded key/value cache with least-recently-used eviction
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::error::ConfigError;
use crate::sync::lock;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub current_size: usize,
    pub utilization_pct: f64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    pub access_count: u64,
    pub hit_rate_pct: f64,
}

struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Recency list threaded through a slab of nodes. `head` is the most recently
/// used entry, `tail` the eviction candidate.
struct CacheInner<K, V> {
    index: HashMap<K, usize>,
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    hit_count: u64,
    miss_count: u64,
    eviction_count: u64,
    access_count: u64,
}

impl<K: Eq + Hash + Clone, V> CacheInner<K, V> {
    fn node(&self, idx: usize) -> &Node<K, V> {
        self.nodes[idx].as_ref().expect("indexed slot is occupied")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node<K, V> {
        self.nodes[idx].as_mut().expect("indexed slot is occupied")
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = self.node(idx);
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let node = self.node_mut(idx);
        node.prev = None;
        node.next = None;
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(idx);
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.node_mut(h).prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.detach(idx);
            self.push_front(idx);
        }
    }

    fn take(&mut self, idx: usize) -> Node<K, V> {
        self.detach(idx);
        let node = self.nodes[idx].take().expect("indexed slot is occupied");
        self.index.remove(&node.key);
        self.free.push(idx);
        node
    }

    fn insert_front(&mut self, key: K, value: V) {
        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.push_front(idx);
    }
}

/// Thread-safe LRU cache. Every operation runs in a single critical section;
/// `get` and `put` are O(1).
pub struct LruCache<K, V> {
    capacity: usize,
    inner: Mutex<CacheInner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::Zero("cache_capacity"));
        }

        Ok(LruCache {
            capacity,
            inner: Mutex::new(CacheInner {
                index: HashMap::with_capacity(capacity),
                nodes: Vec::with_capacity(capacity),
                free: Vec::new(),
                head: None,
                tail: None,
                hit_count: 0,
                miss_count: 0,
                eviction_count: 0,
                access_count: 0,
            }),
        })
    }

    /// Looks a key up. Every call counts as an access; only hits reorder.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = lock(&self.inner);
        inner.access_count += 1;

        match inner.index.get(key).copied() {
            Some(idx) => {
                inner.hit_count += 1;
                inner.promote(idx);
                Some(inner.node(idx).value.clone())
            }
            None => {
                inner.miss_count += 1;
                None
            }
        }
    }

    /// Inserts or replaces a value and marks it most recently used.
    /// Returns the entry evicted to make room, if any.
    pub fn put(&self, key: K, value: V) -> Option<(K, V)> {
        let mut inner = lock(&self.inner);

        if let Some(idx) = inner.index.get(&key).copied() {
            inner.node_mut(idx).value = value;
            inner.promote(idx);
            return None;
        }

        let evicted = match inner.tail {
            Some(lru) if inner.index.len() >= self.capacity => {
                let node = inner.take(lru);
                inner.eviction_count += 1;
                Some((node.key, node.value))
            }
            _ => None,
        };

        inner.insert_front(key, value);
        evicted
    }

    /// Deletes a key if present; returns whether it was.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = lock(&self.inner);
        match inner.index.get(key).copied() {
            Some(idx) => {
                inner.take(idx);
                true
            }
            None => false,
        }
    }

    /// Membership test that neither counts as an access nor reorders.
    pub fn contains(&self, key: &K) -> bool {
        lock(&self.inner).index.contains_key(key)
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<K> {
        let inner = lock(&self.inner);
        let mut keys = Vec::with_capacity(inner.index.len());
        let mut cursor = inner.head;
        while let Some(idx) = cursor {
            let node = inner.node(idx);
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).index.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Empties the cache and zeroes every counter.
    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.index.clear();
        inner.nodes.clear();
        inner.free.clear();
        inner.head = None;
        inner.tail = None;
        inner.hit_count = 0;
        inner.miss_count = 0;
        inner.eviction_count = 0;
        inner.access_count = 0;
    }

    /// Hits over accesses, in percent; 0 before the first access.
    pub fn hit_rate(&self) -> f64 {
        let inner = lock(&self.inner);
        hit_rate(inner.hit_count, inner.access_count)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = lock(&self.inner);
        CacheStats {
            capacity: self.capacity,
            current_size: inner.index.len(),
            utilization_pct: inner.index.len() as f64 / self.capacity as f64 * 100.0,
            hit_count: inner.hit_count,
            miss_count: inner.miss_count,
            eviction_count: inner.eviction_count,
            access_count: inner.access_count,
            hit_rate_pct: hit_rate(inner.hit_count, inner.access_count),
        }
    }
}

fn hit_rate(hits: u64, accesses: u64) -> f64 {
    if accesses == 0 {
        0.0
    } else {
        hits as f64 / accesses as f64 * 100.0
    }
}
