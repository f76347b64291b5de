//! Expiration Heap Module
//!
//! Min-heap of absolute expiry times with lazy tombstoning.
//!
//! Removing an arbitrary element from a binary heap is O(n), so invalidation
//! only forgets which heap entry is current for a key. Stale heap entries are
//! skipped when they surface at the top and are dropped in bulk by
//! [`ExpirationHeap::compact`].

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use tokio::time::Instant;
use tracing::debug;

// == Compaction Thresholds ==
/// Compact once more than this fraction of heap entries are tombstones.
pub const COMPACT_INVALID_RATIO: f64 = 0.10;
/// Compact once this many tombstones have accumulated.
pub const COMPACT_INVALID_COUNT: usize = 50;
/// Compact after this many mutations since the last compaction.
pub const COMPACT_OPERATION_COUNT: usize = 100;

// == Expiration Entry ==
/// A scheduled expiry. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationEntry {
    pub key: String,
    pub expires_at: Instant,
    /// Generation stamp; the entry is valid while it matches the key's live stamp
    seq: u64,
}

impl Ord for ExpirationEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.expires_at
            .cmp(&other.expires_at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ExpirationEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// == Expiration Heap ==
#[derive(Debug, Default)]
pub struct ExpirationHeap {
    heap: BinaryHeap<Reverse<ExpirationEntry>>,
    /// Key to the stamp of its only valid heap entry
    live: HashMap<String, u64>,
    next_seq: u64,
    /// Tombstoned entries still physically in `heap`
    invalid: usize,
    ops_since_compaction: usize,
}

impl ExpirationHeap {
    pub fn new() -> Self {
        Self::default()
    }

    // == Push ==
    /// Schedules `key` to expire at `expires_at`. O(log n).
    ///
    /// Any earlier schedule for the same key is tombstoned first.
    pub fn push(&mut self, key: &str, expires_at: Instant) {
        self.invalidate(key);

        let seq = self.next_seq;
        self.next_seq += 1;
        self.live.insert(key.to_string(), seq);
        self.heap.push(Reverse(ExpirationEntry {
            key: key.to_string(),
            expires_at,
            seq,
        }));
        self.ops_since_compaction += 1;

        self.compact_if_needed();
    }

    // == Invalidate ==
    /// Tombstones the valid entry for `key` in O(1), without touching the heap.
    ///
    /// Returns false if the key had no valid entry.
    pub fn invalidate(&mut self, key: &str) -> bool {
        if self.live.remove(key).is_some() {
            self.invalid += 1;
            self.ops_since_compaction += 1;
            true
        } else {
            false
        }
    }

    // == Pop Expired ==
    /// Removes and returns every valid key whose expiry is `<= now`, earliest first.
    ///
    /// Tombstones reaching the top are discarded on the way.
    pub fn pop_expired(&mut self, now: Instant) -> Vec<String> {
        let mut expired = Vec::new();

        while let Some(Reverse(top)) = self.heap.peek() {
            let valid = self.is_valid(top);
            if valid && top.expires_at > now {
                break;
            }

            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            if valid {
                self.live.remove(&entry.key);
                expired.push(entry.key);
            } else {
                self.invalid -= 1;
            }
        }

        if !expired.is_empty() {
            self.ops_since_compaction += 1;
        }
        expired
    }


    // == Compaction ==
    /// Whether the tombstone thresholds call for a rebuild.
    pub fn needs_compaction(&self) -> bool {
        if self.invalid == 0 {
            return false;
        }
        let ratio = self.invalid as f64 / self.heap.len() as f64;
        ratio > COMPACT_INVALID_RATIO
            || self.invalid >= COMPACT_INVALID_COUNT
            || self.ops_since_compaction >= COMPACT_OPERATION_COUNT
    }

    /// Compacts when [`needs_compaction`](Self::needs_compaction) says so.
    ///
    /// Returns true if a rebuild happened.
    pub fn compact_if_needed(&mut self) -> bool {
        if self.needs_compaction() {
            self.compact();
            true
        } else {
            if self.invalid == 0 && self.ops_since_compaction >= COMPACT_OPERATION_COUNT {
                self.ops_since_compaction = 0;
            }
            false
        }
    }

    /// Rebuilds the heap from valid entries only. O(n).
    pub fn compact(&mut self) {
        let before = self.heap.len();
        let entries: Vec<_> = std::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .filter(|Reverse(entry)| self.is_valid(entry))
            .collect();
        self.heap = BinaryHeap::from(entries);
        self.invalid = 0;
        self.ops_since_compaction = 0;

        debug!(before, after = self.heap.len(), "Compacted expiration heap");
    }

    // == Accessors ==
    /// Number of valid (scheduled) keys.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Physical heap size including tombstones.
    pub fn physical_len(&self) -> usize {
        self.heap.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid
    }

    pub fn contains(&self, key: &str) -> bool {
        self.live.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
        self.invalid = 0;
        self.ops_since_compaction = 0;
    }

    fn is_valid(&self, entry: &ExpirationEntry) -> bool {
        self.live.get(&entry.key) == Some(&entry.seq)
    }
}
