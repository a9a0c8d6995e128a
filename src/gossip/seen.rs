//! Capacity-bounded seen-set
//!
//! Check-and-insert is atomic under one lock, so when two peers deliver the
//! same transaction concurrently exactly one caller wins. Once full, the
//! oldest entry is evicted first.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

pub struct SeenSet<K> {
    inner: Mutex<SeenInner<K>>,
    capacity: usize,
}

struct SeenInner<K> {
    members: HashSet<K>,
    order: VecDeque<K>,
    evicted: u64,
}

impl<K: Eq + Hash + Clone> SeenSet<K> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(SeenInner {
                members: HashSet::with_capacity(capacity.min(4096)),
                order: VecDeque::with_capacity(capacity.min(4096)),
                evicted: 0,
            }),
            capacity,
        }
    }

    /// Insert `key`; returns `true` only for the first insertion
    pub fn insert(&self, key: K) -> bool {
        let mut inner = self.inner.lock();
        if inner.members.contains(&key) {
            return false;
        }

        if inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.members.remove(&oldest);
                inner.evicted += 1;
            }
        }

        inner.members.insert(key.clone());
        inner.order.push_back(key);
        true
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().members.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped to stay within capacity
    pub fn evicted(&self) -> u64 {
        self.inner.lock().evicted
    }
}
