//! Cache Module
//!
//! Provides in-memory caching with TTL expiration and LRU eviction.

mod entry;
mod expiry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use expiry::{ExpirationEntry, ExpirationHeap};
pub use lru::LruIndex;
pub use stats::CacheStats;
pub use store::CacheStore;
