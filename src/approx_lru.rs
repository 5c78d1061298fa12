use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::CacheError;

/// Callback invoked with the owned `(key, value)` whenever an entry leaves the
/// cache: capacity eviction, explicit removal, purge, or a downsizing resize.
///
/// The callback is shared (`Arc`) so a single function can serve every shard of
/// a [`ShardedCache`](crate::ShardedCache). It runs synchronously on the thread
/// that triggered the removal, before the slot is reused; when the cache sits
/// behind a lock, the lock is still held, so the callback must not re-enter the
/// same cache and should not block.
pub type EvictCallback<K, V> = Arc<dyn Fn(K, V) + Send + Sync>;

/// Number of adjacent slots examined per eviction. The window is contiguous so
/// the scan stays within at most two cache lines of the slot array; the prior
/// shuffle makes neighboring slots independent in age. 6 also works, trading a
/// little accuracy for a shorter scan.
const PROBES: usize = 8;

// A vacated slot keeps `last_used == 0`; live stamps start at 1.
struct Slot<K, V> {
    last_used: u64,
    entry: Option<(K, V)>,
}

/// A fixed-capacity approximate LRU cache.
///
/// Instead of a recency list, every entry carries a strictly increasing
/// "last used" stamp, and eviction removes the oldest entry found in a small
/// random sample. This keeps `add`/`get` to an array write plus a map lookup
/// while evicting entries that are old, if not always the globally oldest.
///
/// `ApproxLru` is **not** thread-safe. Wrap it in a lock, or use
/// [`Cache`](crate::Cache) / [`ShardedCache`](crate::ShardedCache).
///
/// # Examples
///
/// ```rust
/// use sampled_lru::ApproxLru;
///
/// let mut lru = ApproxLru::new(2).unwrap();
/// assert!(!lru.add("a", 1));
/// assert!(!lru.add("b", 2));
/// // the cache is full, so a third key evicts one of the first two
/// assert!(lru.add("c", 3));
/// assert_eq!(lru.len(), 2);
/// ```
pub struct ApproxLru<K, V> {
    rng: fastrand::Rng,
    cap: usize,
    counter: u64,
    data: Vec<Slot<K, V>>,
    items: HashMap<K, usize>,
    on_evict: Option<EvictCallback<K, V>>,
}

impl<K, V> ApproxLru<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// Returns [`CacheError::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        Self::with_evict(capacity, None)
    }

    /// Creates a cache with an eviction callback.
    ///
    /// See [`EvictCallback`] for when and how the callback runs.
    pub fn with_evict(
        capacity: usize,
        on_evict: Option<EvictCallback<K, V>>,
    ) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::InvalidCapacity);
        }
        Ok(ApproxLru {
            rng: fastrand::Rng::new(),
            cap: capacity,
            counter: 1,
            data: Vec::with_capacity(capacity),
            items: HashMap::with_capacity(capacity),
            on_evict,
        })
    }

    /// Inserts or updates `key`. Returns `true` if room had to be made, i.e.
    /// the slot array was full and an eviction probe ran.
    pub fn add(&mut self, key: K, value: V) -> bool {
        if let Some(&i) = self.items.get(&key) {
            let stamp = self.next_stamp();
            let slot = &mut self.data[i];
            slot.last_used = stamp;
            if let Some((_, v)) = slot.entry.as_mut() {
                *v = value;
            }
            return false;
        }

        let stamp = self.next_stamp();
        if self.data.len() < self.cap {
            let i = self.data.len();
            self.data.push(Slot {
                last_used: stamp,
                entry: Some((key.clone(), value)),
            });
            self.items.insert(key, i);
            if self.data.len() == self.cap {
                // Entries were appended in age order, so slot position still
                // correlates with stamp. Break the correlation once, here;
                // eviction keeps the array mixed from now on.
                self.shuffle();
            }
            false
        } else {
            let i = self.evict_oldest();
            self.data[i] = Slot {
                last_used: stamp,
                entry: Some((key.clone(), value)),
            };
            self.items.insert(key, i);
            true
        }
    }

    /// Looks up `key`, marking it as the most recently used entry on a hit.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = match self.items.get(key) {
            Some(&i) => i,
            None => return None,
        };
        let stamp = self.next_stamp();
        let slot = &mut self.data[i];
        slot.last_used = stamp;
        slot.entry.as_ref().map(|(_, v)| v)
    }

    /// Looks up `key` without touching its recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let i = *self.items.get(key)?;
        self.data[i].entry.as_ref().map(|(_, v)| v)
    }

    /// Returns whether `key` is present, without touching its recency.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.items.contains_key(key)
    }

    /// Removes `key`, firing the eviction callback if it was present.
    ///
    /// The vacated slot keeps its position and is preferentially reused by a
    /// later eviction probe that samples it.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        match self.items.remove(key) {
            Some(i) => {
                self.data[i].last_used = 0;
                if let Some((k, v)) = self.data[i].entry.take() {
                    self.notify_evict(k, v);
                }
                true
            }
            None => false,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Removes every entry, firing the eviction callback for each.
    ///
    /// Afterwards the slot array refills from the front, and the one-time
    /// shuffle runs again when it next reaches capacity.
    pub fn purge(&mut self) {
        for slot in self.data.drain(..) {
            if let Some((key, value)) = slot.entry {
                if let Some(cb) = &self.on_evict {
                    cb(key, value);
                }
            }
        }
        self.items.clear();
    }

    /// Changes the capacity to `capacity`, evicting the oldest entries if the
    /// cache currently holds more than that. Returns the number evicted.
    pub fn resize(&mut self, capacity: usize) -> usize {
        // Newest first; vacated slots (stamp 0) sort to the back, so the live
        // entries end up in positions 0..live with the oldest at the tail.
        self.data
            .sort_unstable_by(|a, b| b.last_used.cmp(&a.last_used));
        self.items.clear();
        for (i, slot) in self.data.iter().enumerate() {
            if let Some((key, _)) = slot.entry.as_ref() {
                self.items.insert(key.clone(), i);
            }
        }

        let live = self.items.len();
        let evicted = live.saturating_sub(capacity);
        for i in capacity..live {
            self.data[i].last_used = 0;
            if let Some((key, value)) = self.data[i].entry.take() {
                self.items.remove(&key);
                self.notify_evict(key, value);
            }
        }

        self.data.truncate(capacity.min(self.data.len()));
        self.data.shrink_to(capacity);
        self.data
            .reserve_exact(capacity.saturating_sub(self.data.len()));
        self.cap = capacity;

        // Re-mix so positional probing stays unbiased under the new layout.
        self.shuffle();

        let live_slots = self.data.iter().filter(|s| s.last_used != 0).count();
        assert_eq!(
            live_slots,
            self.items.len(),
            "slot array and key index out of sync after resize"
        );
        evicted
    }

    /// Dispenses the next recency stamp. Strictly increasing, starting at 1;
    /// 0 is reserved for vacant slots.
    fn next_stamp(&mut self) -> u64 {
        let stamp = self.counter;
        self.counter = self
            .counter
            .checked_add(1)
            .expect("last-used stamp counter overflowed");
        stamp
    }

    /// Picks the oldest entry in a window of [`PROBES`] adjacent slots starting
    /// at a uniformly random base, removes it, and returns its index for the
    /// caller to fill. A sampled vacant slot (stamp 0) wins the comparison and
    /// is handed back directly, without a callback.
    fn evict_oldest(&mut self) -> usize {
        let n = self.data.len();
        let base = self.rng.usize(..n);
        let mut oldest = base;
        if base + PROBES <= n {
            // Window fits: plain indexing, no modular arithmetic.
            for i in base + 1..base + PROBES {
                if self.data[i].last_used < self.data[oldest].last_used {
                    oldest = i;
                }
            }
        } else {
            for step in 1..PROBES {
                let i = (base + step) % n;
                if self.data[i].last_used < self.data[oldest].last_used {
                    oldest = i;
                }
            }
        }

        if self.data[oldest].last_used != 0 {
            self.data[oldest].last_used = 0;
            if let Some((key, value)) = self.data[oldest].entry.take() {
                self.items.remove(&key);
                self.notify_evict(key, value);
            }
        }
        oldest
    }

    /// Fisher-Yates over the slot array, keeping the key index in step.
    fn shuffle(&mut self) {
        for i in (1..self.data.len()).rev() {
            let j = self.rng.usize(..=i);
            self.data.swap(i, j);
            for idx in [i, j] {
                if let Some((key, _)) = self.data[idx].entry.as_ref() {
                    if let Some(pos) = self.items.get_mut(key) {
                        *pos = idx;
                    }
                }
            }
        }
    }

    fn notify_evict(&self, key: K, value: V) {
        if let Some(cb) = &self.on_evict {
            cb(key, value);
        }
    }
}
