use std::borrow::Borrow;
use std::hash::Hash;

use parking_lot::RwLock;

use crate::approx_lru::{ApproxLru, EvictCallback};
use crate::error::CacheError;

/// A thread-safe cache: one [`ApproxLru`] behind a read-write lock.
///
/// Read-only operations (`peek`, `contains`, `len`) share a read lock; anything
/// that stamps, inserts, or removes takes the write lock. This is the simple
/// variant: every operation serializes on the one lock, so under write
/// contention prefer [`ShardedCache`](crate::ShardedCache).
///
/// # Examples
///
/// ```rust
/// use sampled_lru::Cache;
///
/// let cache: Cache<u64, String> = Cache::new(1024).unwrap();
/// cache.add(7, "seven".to_string());
/// assert_eq!(cache.get(&7), Some("seven".to_string()));
/// assert!(cache.contains(&7));
/// ```
pub struct Cache<K, V> {
    lru: RwLock<ApproxLru<K, V>>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates a cache holding at most `size` entries.
    pub fn new(size: usize) -> Result<Self, CacheError> {
        Self::with_evict(size, None)
    }

    /// Creates a cache with an eviction callback.
    ///
    /// The callback runs while the write lock is held; it must not call back
    /// into this cache.
    pub fn with_evict(
        size: usize,
        on_evict: Option<EvictCallback<K, V>>,
    ) -> Result<Self, CacheError> {
        Ok(Cache {
            lru: RwLock::new(ApproxLru::with_evict(size, on_evict)?),
        })
    }

    /// Inserts or updates `key`. Returns `true` if an eviction ran.
    pub fn add(&self, key: K, value: V) -> bool {
        self.lru.write().add(key, value)
    }

    /// Looks up `key`, refreshing its recency on a hit.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.lru.write().get(key).cloned()
    }

    /// Looks up `key` without refreshing its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.lru.read().peek(key).cloned()
    }

    /// Returns whether `key` is present, without refreshing its recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lru.read().contains(key)
    }

    /// Checks for `key` and inserts `value` if it is absent, atomically.
    /// Returns `(found, evicted)`. The check does not refresh recency.
    pub fn contains_or_add(&self, key: K, value: V) -> (bool, bool) {
        let mut lru = self.lru.write();
        if lru.contains(&key) {
            return (true, false);
        }
        let evicted = lru.add(key, value);
        (false, evicted)
    }

    /// Peeks at `key` and inserts `value` if it is absent, atomically.
    /// Returns `(previous, evicted)`; `previous` is `Some` iff the key was
    /// already present, in which case nothing is inserted and recency is left
    /// alone.
    pub fn peek_or_add(&self, key: K, value: V) -> (Option<V>, bool)
    where
        V: Clone,
    {
        let mut lru = self.lru.write();
        if let Some(previous) = lru.peek(&key).cloned() {
            return (Some(previous), false);
        }
        let evicted = lru.add(key, value);
        (None, evicted)
    }

    /// Removes `key`, firing the eviction callback if it was present.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lru.write().remove(key)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.lru.read().len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lru.read().is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.lru.read().capacity()
    }

    /// Removes every entry, firing the eviction callback for each.
    pub fn purge(&self) {
        self.lru.write().purge()
    }

    /// Changes the capacity, evicting the oldest entries if shrinking.
    /// Returns the number evicted.
    pub fn resize(&self, size: usize) -> usize {
        self.lru.write().resize(size)
    }
}
