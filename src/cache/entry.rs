//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with age tracking.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored bytes
    pub value: Bytes,
    /// Accounting cost, usually the byte length
    pub cost: u64,
    /// When the entry was stored
    pub inserted_at: Instant,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new cache entry stamped with `inserted_at`.
    pub fn new(value: Bytes, cost: u64, inserted_at: Instant) -> Self {
        Self {
            value,
            cost,
            inserted_at,
        }
    }

    // == Age ==
    /// How long the entry has been stored as of `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    // == Is Stale ==
    /// Checks whether the entry has outlived `max_age`.
    ///
    /// Boundary condition: an entry whose age equals `max_age` is stale.
    pub fn is_stale(&self, max_age: Duration, now: Instant) -> bool {
        self.age(now) >= max_age
    }
}
