//! Expiry Heap Module
//!
//! Implements the eviction-order structure for the store: a binary min-heap
//! of cache entries ordered by expiry time.
//!
//! The heap's backing vector owns the entries; the store's key map holds
//! each key's current slot in that vector. Every mutation that moves an
//! entry rewrites its slot in the map, so deletion by key can remove an
//! arbitrary element in O(log n), not just the minimum.

use std::collections::HashMap;

use crate::store::CacheEntry;

// == Expiry Heap ==
/// Min-heap of cache entries keyed on `expires`.
///
/// Invariant: for every index `i`, `slots[entries[i].key] == i`. Detached
/// entries are returned by value and have no slot.
#[derive(Debug, Default)]
pub(crate) struct ExpiryHeap {
    /// Heap-ordered entries; element 0 expires soonest
    entries: Vec<CacheEntry>,
}

impl ExpiryHeap {
    // == Constructor ==
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    // == Push ==
    /// Inserts an entry, recording its slot in `slots`.
    pub fn push(&mut self, slots: &mut HashMap<String, usize>, entry: CacheEntry) {
        let at = self.entries.len();
        slots.insert(entry.key.clone(), at);
        self.entries.push(entry);
        self.sift_up(slots, at);
    }

    // == Pop Minimum ==
    /// Detaches and returns the earliest-expiring entry, removing its slot.
    pub fn pop_min(&mut self, slots: &mut HashMap<String, usize>) -> Option<CacheEntry> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.remove(slots, 0))
        }
    }

    // == Remove At ==
    /// Detaches the entry at slot `at`, removing its slot entry and
    /// restoring heap order for the element moved into its place.
    ///
    /// Used when a specific key is deleted or overwritten, which is rarely
    /// the current minimum.
    pub fn remove(&mut self, slots: &mut HashMap<String, usize>, at: usize) -> CacheEntry {
        let last = self.entries.len() - 1;
        self.entries.swap(at, last);
        let removed = self.entries.pop().expect("remove on empty heap");
        slots.remove(&removed.key);

        if at < self.entries.len() {
            slots.insert(self.entries[at].key.clone(), at);
            // The swapped-in element came from the bottom; it may need to
            // move in either direction relative to an arbitrary slot.
            self.sift_down(slots, at);
            self.sift_up(slots, at);
        }

        removed
    }

    // == Peek ==
    /// Returns the earliest-expiring entry without removing it.
    pub fn peek(&self) -> Option<&CacheEntry> {
        self.entries.first()
    }

    // == Entry At ==
    /// Returns the entry at slot `at`.
    pub fn entry(&self, at: usize) -> &CacheEntry {
        &self.entries[at]
    }

    // == Iteration ==
    /// Iterates over all live entries in heap (not expiry) order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter()
    }

    // == Length ==
    /// Returns the number of entries in the heap.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Sift Up ==
    fn sift_up(&mut self, slots: &mut HashMap<String, usize>, mut at: usize) {
        while at > 0 {
            let parent = (at - 1) / 2;
            if self.entries[at].expires >= self.entries[parent].expires {
                break;
            }
            self.swap_slots(slots, at, parent);
            at = parent;
        }
    }

    // == Sift Down ==
    fn sift_down(&mut self, slots: &mut HashMap<String, usize>, mut at: usize) {
        loop {
            let left = 2 * at + 1;
            let right = 2 * at + 2;
            let mut smallest = at;

            if left < self.entries.len()
                && self.entries[left].expires < self.entries[smallest].expires
            {
                smallest = left;
            }
            if right < self.entries.len()
                && self.entries[right].expires < self.entries[smallest].expires
            {
                smallest = right;
            }
            if smallest == at {
                break;
            }
            self.swap_slots(slots, at, smallest);
            at = smallest;
        }
    }

    // == Swap ==
    /// Swaps two heap positions and rewrites both entries' slots.
    fn swap_slots(&mut self, slots: &mut HashMap<String, usize>, a: usize, b: usize) {
        self.entries.swap(a, b);
        slots.insert(self.entries[a].key.clone(), a);
        slots.insert(self.entries[b].key.clone(), b);
    }
}
