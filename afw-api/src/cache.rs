//! Small TTL cache for record reads
//!
//! Capacity-bounded; when full, the oldest inserted entry is evicted.
//! Expired entries are dropped lazily on access.
//!
//! Every invalidation bumps a cache-wide generation. A reader that loads a
//! value outside the lock takes [`TtlCache::generation`] first and stores
//! with [`TtlCache::insert_if_unchanged`], so a write that invalidated in
//! between is never papered over by the older value.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Insertion order, oldest first. Each key appears once.
    order: VecDeque<K>,
    generation: u64,
}

pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    ttl: Duration,
    capacity: usize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                generation: 0,
            }),
            ttl,
            capacity,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<K, V>> {
        // A panic while holding the lock leaves the maps consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                inner.order.retain(|k| k != key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.lock();
        self.store(&mut inner, key, value);
    }

    /// Current invalidation generation
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Insert only if nothing was invalidated since `generation` was read
    ///
    /// Returns whether the value was stored.
    pub fn insert_if_unchanged(&self, key: K, value: V, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        self.store(&mut inner, key, value)
    }

    fn store(&self, inner: &mut Inner<K, V>, key: K, value: V) -> bool {
        if self.capacity == 0 {
            return false;
        }

        let entry = Entry {
            value,
            expires_at: Instant::now() + self.ttl,
        };

        inner.entries.insert(key.clone(), entry);
        inner.order.retain(|k| k != &key);
        inner.order.push_back(key);

        while inner.entries.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        true
    }

    pub fn invalidate(&self, key: &K) {
        self.invalidate_where(|k| k == key);
    }

    pub fn invalidate_where(&self, mut predicate: impl FnMut(&K) -> bool) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.entries.retain(|k, _| !predicate(k));
        let Inner { entries, order, .. } = &mut *inner;
        order.retain(|k| entries.contains_key(k));
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.entries.clear();
        inner.order.clear();
    }

    /// Live and not-yet-collected expired entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> TtlCache<String, V> {
    /// Drop every key starting with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) {
        self.invalidate_where(|k| k.starts_with(prefix));
    }
}
