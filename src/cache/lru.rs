//! LRU Index Module
//!
//! Implements Least Recently Used tracking for cache eviction.

use std::collections::HashMap;

// == LRU Node ==
/// One slot of the recency list. Neighbours are arena indices.
#[derive(Debug)]
struct LruNode {
    key: String,
    prev: Option<usize>,
    next: Option<usize>,
}

// == LRU Index ==
/// Tracks access order for LRU eviction strategy.
///
/// Nodes live in an arena (`Vec`) and link to each other by index, so every
/// operation is O(1) and there are no reference cycles:
/// - Head = Most recently used
/// - Tail = Least recently used
///
/// The index never evicts on its own; the owner decides when to call
/// [`LruIndex::evict_tail`].
#[derive(Debug, Default)]
pub struct LruIndex {
    /// Node arena; `None` marks a free slot
    nodes: Vec<Option<LruNode>>,
    /// Free slots available for reuse
    free: Vec<usize>,
    /// Key to arena slot
    slots: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl LruIndex {
    // == Constructor ==
    /// Creates a new empty LRU index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as recently used (moves to head).
    ///
    /// Returns false if the key is not tracked.
    pub fn touch(&mut self, key: &str) -> bool {
        match self.slots.get(key).copied() {
            Some(idx) => {
                if self.head != Some(idx) {
                    self.unlink(idx);
                    self.link_front(idx);
                }
                true
            }
            None => false,
        }
    }

    // == Insert Front ==
    /// Creates a node for `key` at the head.
    ///
    /// A key that is already tracked is only moved to the head, keeping one
    /// node per key.
    pub fn insert_front(&mut self, key: &str) {
        if self.touch(key) {
            return;
        }

        let node = LruNode {
            key: key.to_string(),
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };

        self.slots.insert(key.to_string(), idx);
        self.link_front(idx);
    }

    // == Remove ==
    /// Removes a key from the index. Returns false if it was not tracked.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.slots.remove(key) {
            Some(idx) => {
                self.unlink(idx);
                self.release(idx);
                true
            }
            None => false,
        }
    }

    // == Evict Tail ==
    /// Removes and returns the least recently used key.
    ///
    /// Returns None if the index is empty.
    pub fn evict_tail(&mut self) -> Option<String> {
        let idx = self.tail?;
        self.unlink(idx);
        let node = self.release(idx)?;
        self.slots.remove(&node.key);
        Some(node.key)
    }

    // == Peek Tail ==
    /// Returns the least recently used key without removing it.
    pub fn peek_tail(&self) -> Option<&str> {
        self.tail.and_then(|idx| self.node(idx)).map(|n| n.key.as_str())
    }

    /// Keys from most to least recently used.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(node) = self.node(idx) else { break };
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    // == Link Helpers ==
    fn node(&self, idx: usize) -> Option<&LruNode> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut LruNode> {
        self.nodes.get_mut(idx).and_then(Option::as_mut)
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head.and_then(|h| self.node_mut(h)) {
            Some(head) => head.prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.node_mut(idx) {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };

        match prev.and_then(|p| self.node_mut(p)) {
            Some(p) => p.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.node_mut(n)) {
            Some(n) => n.prev = prev,
            None => self.tail = prev,
        }
    }

    fn release(&mut self, idx: usize) -> Option<LruNode> {
        let node = self.nodes.get_mut(idx)?.take();
        if node.is_some() {
            self.free.push(idx);
        }
        node
    }
}
