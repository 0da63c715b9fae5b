//! Bounded least-recently-used cache of rendered reports

use crate::period::Period;
use crate::store::UserId;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

struct Entry<V> {
    value: V,
    last_used: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    clock: u64,
}

impl<K, V> Inner<K, V> {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Thread-safe LRU map
///
/// Values are cloned out under the lock, so readers never observe a
/// partially written entry.
pub struct LruCache<K, V> {
    capacity: usize,
    inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = inner.tick();
        let entry = inner.entries.get_mut(key)?;
        entry.last_used = now;
        Some(entry.value.clone())
    }

    pub fn put(&self, key: K, value: V) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let now = inner.tick();
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                inner.entries.remove(&oldest);
            }
        }
        inner.entries.insert(
            key,
            Entry {
                value,
                last_used: now,
            },
        );
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.remove(key).map(|entry| entry.value)
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

/// Rendered report text keyed by user and period
pub struct ReportCache {
    entries: LruCache<String, String>,
}

impl ReportCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// `<user id><period tag>`, e.g. `42m`
    pub fn key(user_id: UserId, period: Period) -> String {
        format!("{user_id}{}", period.tag())
    }

    pub fn get(&self, user_id: UserId, period: Period) -> Option<String> {
        self.entries.get(&Self::key(user_id, period))
    }

    pub fn put(&self, user_id: UserId, period: Period, text: String) {
        self.entries.put(Self::key(user_id, period), text);
    }

    /// Drop every cached period for the user
    pub fn invalidate_user(&self, user_id: UserId) {
        for period in Period::ALL {
            self.entries.remove(&Self::key(user_id, period));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
