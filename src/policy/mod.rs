//! Eviction policies for the local store.

pub mod lru;

pub use lru::{CacheStats, CacheValue, ConcurrentLruStore, EvictionCallback, LruStore};
