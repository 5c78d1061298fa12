//! A fixed-capacity approximate LRU cache for concurrent workloads.
//!
//! This crate provides three cache types built on one eviction engine:
//!
//! 1. [`ApproxLru`] - The single-shard engine. Fast and compact, but not
//!    thread-safe.
//! 2. [`Cache`] - The engine behind one read-write lock. Thread-safe, simple,
//!    serializes writers.
//! 3. [`ShardedCache`] - 256 independently locked shards keyed by string hash,
//!    for workloads where a single lock would be the bottleneck.
//!
//! Rather than maintaining a strict recency list, every entry carries a
//! monotonically increasing last-used stamp and eviction removes the oldest of
//! a small random sample of entries. This approximates LRU eviction quality
//! while keeping the store a flat array plus a key-to-index map: no linked
//! list, no per-entry allocation, no pointer chasing on the hot path.
//!
//! # Features
//!
//! - Approximate LRU eviction via random probing over a shuffled slot array
//! - Flat, allocation-free steady-state operation
//! - Optional eviction callback for every logical removal
//! - Sharded variant with 128-byte (two cache line) shard layout and a
//!   per-instance seeded key hash
//! - Generic keys and values on the engine and the locked facade
//!
//! # Examples
//!
//! ```rust
//! use sampled_lru::{Cache, ShardedCache};
//!
//! // single engine behind one lock, generic keys
//! let cache: Cache<u64, String> = Cache::new(1024).unwrap();
//! cache.add(7, "seven".to_string());
//! assert_eq!(cache.get(&7), Some("seven".to_string()));
//!
//! // sharded variant, string keys
//! let sharded: ShardedCache<u64> = ShardedCache::new(65536).unwrap();
//! sharded.add("answer".to_string(), 42);
//! assert_eq!(sharded.get("answer"), Some(42));
//! ```

pub mod approx_lru;
pub mod cache;
mod error;
pub mod sharded_cache;

pub use approx_lru::{ApproxLru, EvictCallback};
pub use cache::Cache;
pub use error::CacheError;
pub use sharded_cache::{ShardedCache, SHARD_COUNT};
