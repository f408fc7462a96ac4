//! A bounded least-recently-used cache with an eviction callback.
//!
//! Recency is tracked with a monotonically increasing stamp per entry and a
//! `BTreeMap` from stamp to key, so the oldest entry is always the first key
//! of that map.
use std::{
    collections::{BTreeMap, HashMap},
    fmt::{self, Debug, Formatter},
    hash::Hash,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Capacity {
    Bounded(usize),
    /// Never evicts.
    Unbounded,
}

impl Capacity {
    pub fn exceeded_by(self, len: usize) -> bool {
        match self {
            Capacity::Bounded(max) => len > max,
            Capacity::Unbounded => false,
        }
    }
}

impl From<usize> for Capacity {
    fn from(max: usize) -> Self {
        Capacity::Bounded(max)
    }
}

type EvictionCallback<K, V> = Box<dyn FnMut(K, V) + Send>;

struct Entry<V> {
    value: V,
    stamp: u64,
}

pub struct LruCache<K, V> {
    capacity: Capacity,
    entries: HashMap<K, Entry<V>>,
    order: BTreeMap<u64, K>,
    next_stamp: u64,
    on_evict: Option<EvictionCallback<K, V>>,
}

impl<K, V> Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("capacity", &self.capacity)
            .field("len", &self.entries.len())
            .field("has_eviction_callback", &self.on_evict.is_some())
            .finish()
    }
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_stamp: 0,
            on_evict: None,
        }
    }

    /// The callback runs once for every entry pushed out by [`LruCache::set`]
    /// or [`LruCache::drain_with_callback`].
    pub fn with_eviction(
        capacity: Capacity,
        on_evict: impl FnMut(K, V) + Send + 'static,
    ) -> Self {
        let mut cache = Self::new(capacity);
        cache.on_evict = Some(Box::new(on_evict));
        cache
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn stamp(&mut self) -> u64 {
        let s = self.next_stamp;
        self.next_stamp += 1;
        s
    }

    fn touch(&mut self, key: &K) {
        let stamp = self.stamp();
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.stamp);
            entry.stamp = stamp;
            self.order.insert(stamp, key.clone());
        }
    }

    /// Looks up `key` and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.touch(key);
        self.entries.get(key).map(|e| &e.value)
    }

    /// Looks up `key` without touching its recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Inserts or replaces `key`. Replacing refreshes recency and does not
    /// run the eviction callback for the old value.
    pub fn set(&mut self, key: K, value: V) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            self.touch(&key);
            return;
        }

        let stamp = self.stamp();
        self.order.insert(stamp, key.clone());
        self.entries.insert(key, Entry { value, stamp });

        if self.capacity.exceeded_by(self.entries.len()) {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        let Some((_, key)) = self.order.pop_first() else {
            return;
        };
        if let Some(entry) = self.entries.remove(&key) {
            if let Some(cb) = &mut self.on_evict {
                cb(key, entry.value);
            }
        }
    }

    pub fn get_or_create(&mut self, key: K, create: impl FnOnce() -> V) -> V
    where
        V: Clone,
    {
        if let Some(v) = self.get(&key) {
            return v.clone();
        }
        let value = create();
        self.set(key, value.clone());
        value
    }

    /// Like [`LruCache::get_or_create`], but a failed creation caches nothing.
    pub fn get_or_try_create<E>(
        &mut self,
        key: K,
        create: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E>
    where
        V: Clone,
    {
        if let Some(v) = self.get(&key) {
            return Ok(v.clone());
        }
        let value = create()?;
        self.set(key, value.clone());
        Ok(value)
    }

    /// Removes `key` without running the eviction callback.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.stamp);
        Some(entry.value)
    }

    /// Drops every entry without running the eviction callback.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Evicts every entry, oldest first, through the eviction callback.
    pub fn drain_with_callback(&mut self) {
        while !self.order.is_empty() {
            self.evict_oldest();
        }
    }
}
