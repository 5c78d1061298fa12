use std::mem;

use ahash::RandomState;
use parking_lot::Mutex;

use crate::approx_lru::{ApproxLru, EvictCallback};
use crate::error::CacheError;

/// Number of independently locked shards.
pub const SHARD_COUNT: usize = 256;

/// One lock plus one engine, padded out to exactly two cache lines so that
/// adjacent shards never share a line. The engine header and the 1-byte
/// parking_lot mutex fit in 128 bytes; the alignment supplies the rest.
#[repr(C, align(128))]
struct Shard<V> {
    lru: Mutex<ApproxLru<String, V>>,
}

/// A thread-safe, fixed-capacity approximate LRU cache over string keys.
///
/// The key space is partitioned across [`SHARD_COUNT`] shards by a seeded
/// 64-bit hash; each shard is an independent [`ApproxLru`] behind its own
/// mutex, so operations on keys in different shards never contend. The hash
/// seed is drawn per instance, giving HashDoS resistance across instances.
///
/// Every operation takes exactly one shard lock. `len` and `purge` visit the
/// shards one at a time and are therefore not snapshots: mutations that race
/// with them are reflected partially.
///
/// # Examples
///
/// ```rust
/// use sampled_lru::ShardedCache;
///
/// let cache: ShardedCache<u64> = ShardedCache::new(65536).unwrap();
/// cache.add("answer".to_string(), 42);
/// assert_eq!(cache.get("answer"), Some(42));
/// assert_eq!(cache.peek("answer"), Some(42));
/// ```
pub struct ShardedCache<V> {
    hasher: RandomState,
    shards: Box<[Shard<V>; SHARD_COUNT]>,
    size: usize,
}

impl<V> ShardedCache<V> {
    /// Creates a cache with roughly `size` total capacity.
    ///
    /// `size` is raised to [`SHARD_COUNT`] if smaller, then rounded down to a
    /// multiple of it: each shard holds `size / SHARD_COUNT` entries.
    /// Returns [`CacheError::InvalidCapacity`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self, CacheError> {
        Self::with_evict(size, None)
    }

    /// Creates a cache with an eviction callback, shared by every shard.
    ///
    /// The callback runs while the owning shard's lock is held: it must not
    /// call back into this cache (same shard would self-deadlock) and should
    /// not block.
    pub fn with_evict(
        size: usize,
        on_evict: Option<EvictCallback<String, V>>,
    ) -> Result<Self, CacheError> {
        const {
            assert!(
                mem::size_of::<Shard<V>>() == 128,
                "shard must be exactly two cache lines"
            )
        };
        if size == 0 {
            return Err(CacheError::InvalidCapacity);
        }
        let size = size.max(SHARD_COUNT);
        let per_shard = size / SHARD_COUNT;

        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Shard {
                lru: Mutex::new(ApproxLru::with_evict(per_shard, on_evict.clone())?),
            });
        }
        let Ok(shards) = <Box<[Shard<V>; SHARD_COUNT]>>::try_from(shards.into_boxed_slice()) else {
            unreachable!("vector length matches the shard count");
        };

        Ok(ShardedCache {
            hasher: RandomState::new(),
            shards,
            size: per_shard * SHARD_COUNT,
        })
    }

    /// Routes `key` to a shard index. The pre-seeded hasher template is copied
    /// per call, so the hot path performs no allocation.
    fn shard_idx(&self, key: &str) -> usize {
        (self.hasher.hash_one(key) % SHARD_COUNT as u64) as usize
    }

    fn shard(&self, key: &str) -> &Shard<V> {
        &self.shards[self.shard_idx(key)]
    }

    /// Inserts or updates `key`. Returns `true` if an eviction ran in the
    /// key's shard.
    pub fn add(&self, key: String, value: V) -> bool {
        self.shard(&key).lru.lock().add(key, value)
    }

    /// Looks up `key`, refreshing its recency on a hit.
    pub fn get(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.shard(key).lru.lock().get(key).cloned()
    }

    /// Looks up `key` without refreshing its recency.
    pub fn peek(&self, key: &str) -> Option<V>
    where
        V: Clone,
    {
        self.shard(key).lru.lock().peek(key).cloned()
    }

    /// Returns whether `key` is present, without refreshing its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.shard(key).lru.lock().contains(key)
    }

    /// Checks for `key` and inserts `value` if it is absent, under a single
    /// shard lock acquisition. Returns `(found, evicted)`.
    pub fn contains_or_add(&self, key: String, value: V) -> (bool, bool) {
        let shard = self.shard(&key);
        let mut lru = shard.lru.lock();
        if lru.contains(key.as_str()) {
            return (true, false);
        }
        let evicted = lru.add(key, value);
        (false, evicted)
    }

    /// Peeks at `key` and inserts `value` if it is absent, under a single
    /// shard lock acquisition. Returns `(previous, evicted)`; `previous` is
    /// `Some` iff the key was already present, in which case nothing is
    /// inserted and recency is left alone.
    pub fn peek_or_add(&self, key: String, value: V) -> (Option<V>, bool)
    where
        V: Clone,
    {
        let shard = self.shard(&key);
        let mut lru = shard.lru.lock();
        if let Some(previous) = lru.peek(key.as_str()).cloned() {
            return (Some(previous), false);
        }
        let evicted = lru.add(key, value);
        (None, evicted)
    }

    /// Removes `key`, firing the eviction callback if it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.shard(key).lru.lock().remove(key)
    }

    /// Total number of live entries, summed shard by shard.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lru.lock().len()).sum()
    }

    /// Returns `true` if no shard holds an entry.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lru.lock().is_empty())
    }

    /// Effective total capacity, `(size / SHARD_COUNT) * SHARD_COUNT`.
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Purges every shard in turn, firing the eviction callback per entry.
    /// Not globally atomic.
    pub fn purge(&self) {
        for shard in self.shards.iter() {
            shard.lru.lock().purge();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn shard_layout_is_two_cache_lines() {
        assert_eq!(mem::size_of::<Shard<u64>>(), 128);
        assert_eq!(mem::size_of::<Shard<String>>(), 128);
        assert_eq!(mem::size_of::<Shard<Vec<u8>>>(), 128);
        assert_eq!(
            mem::size_of::<[Shard<u64>; SHARD_COUNT]>(),
            128 * SHARD_COUNT
        );
    }

    #[test]
    fn basic_operations() {
        let cache: ShardedCache<String> = ShardedCache::new(1024).unwrap();

        assert!(cache.is_empty());
        assert!(!cache.add("one".to_string(), "1".to_string()));
        assert!(!cache.add("two".to_string(), "2".to_string()));
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.get("one"), Some("1".to_string()));
        assert_eq!(cache.peek("two"), Some("2".to_string()));
        assert!(cache.contains("one"));
        assert!(!cache.contains("three"));

        assert!(cache.remove("one"));
        assert!(!cache.remove("one"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn small_sizes_are_raised_to_shard_count() {
        let cache: ShardedCache<u64> = ShardedCache::new(10).unwrap();
        assert_eq!(cache.capacity(), SHARD_COUNT);

        let cache: ShardedCache<u64> = ShardedCache::new(1000).unwrap();
        assert_eq!(cache.capacity(), (1000 / SHARD_COUNT) * SHARD_COUNT);

        assert!(matches!(
            ShardedCache::<u64>::new(0),
            Err(CacheError::InvalidCapacity)
        ));
    }

    #[test]
    fn shard_routing_is_deterministic() {
        let cache: ShardedCache<u64> = ShardedCache::new(65536).unwrap();
        for i in 0..1000 {
            let key = format!("key_{i}");
            let first = cache.shard_idx(&key);
            let second = cache.shard_idx(&key);
            assert_eq!(first, second, "key {key} moved between shards");
        }
    }

    #[test]
    fn keys_spread_across_shards() {
        let cache: ShardedCache<u64> = ShardedCache::new(65536).unwrap();

        let keys = 10_000usize;
        let mut counts = [0usize; SHARD_COUNT];
        for i in 0..keys {
            let key = format!("{:x}-{i}", i.wrapping_mul(0x9e37_79b9_7f4a_7c15));
            counts[cache.shard_idx(&key)] += 1;
        }

        // Loose sanity bound on the hash: no shard should see more than twice
        // the expected load.
        let bound = 2 * keys / SHARD_COUNT;
        for (idx, count) in counts.iter().enumerate() {
            assert!(
                *count <= bound,
                "shard {idx} received {count} keys, bound {bound}"
            );
        }
    }

    #[test]
    fn composite_ops_hold_one_lock() {
        let cache: ShardedCache<u64> = ShardedCache::new(1024).unwrap();

        cache.add("a".to_string(), 1);
        assert_eq!(cache.contains_or_add("a".to_string(), 9), (true, false));
        assert_eq!(cache.peek("a"), Some(1));

        assert_eq!(cache.contains_or_add("b".to_string(), 2), (false, false));
        assert!(cache.contains("b"));

        assert_eq!(cache.peek_or_add("a".to_string(), 9), (Some(1), false));
        assert_eq!(cache.peek_or_add("c".to_string(), 3), (None, false));
        assert_eq!(cache.peek("c"), Some(3));
    }

    #[test]
    fn every_entry_is_reported_exactly_once() {
        let evictions = Arc::new(AtomicUsize::new(0));
        let cb: EvictCallback<String, usize> = {
            let evictions = Arc::clone(&evictions);
            Arc::new(move |_k, _v| {
                evictions.fetch_add(1, Ordering::SeqCst);
            })
        };
        // per-shard capacity of 1, so colliding keys evict each other
        let cache = ShardedCache::with_evict(SHARD_COUNT, Some(cb)).unwrap();

        let inserted = 300usize;
        for i in 0..inserted {
            cache.add(format!("key_{i}"), i);
        }
        cache.purge();

        // every insert was either evicted by a collision or purged
        assert_eq!(evictions.load(Ordering::SeqCst), inserted);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn concurrent_mixed_operations() {
        let cache: Arc<ShardedCache<String>> = Arc::new(ShardedCache::new(2048).unwrap());
        let mut handles = Vec::new();

        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    let key = format!("key_{}", i % 100);
                    if i % 2 == 0 {
                        cache.add(key, format!("writer_{t}_{i}"));
                    } else if let Some(value) = cache.get(&key) {
                        assert!(value.starts_with("writer_"), "bad value: {value}");
                    }
                }
            }));
        }
        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    let key = format!("key_{}", (i + t) % 100);
                    let _ = cache.contains(&key);
                    let _ = cache.peek(&key);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= cache.capacity());
    }

    #[test]
    fn concurrent_purge_keeps_bound() {
        let cache: Arc<ShardedCache<usize>> = Arc::new(ShardedCache::new(1024).unwrap());
        for i in 0..500 {
            cache.add(format!("init_{i}"), i);
        }

        let mut handles = Vec::new();
        {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                cache.purge();
            }));
        }
        for t in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    cache.add(format!("key_{t}_{i}"), i);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= cache.capacity());
    }
}
