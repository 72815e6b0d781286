//! Memory Store Module
//!
//! The concurrency-safe cache core: a key map plus an expiry heap behind a
//! single per-store lock, with bounded-effort expiry sweeping and absolute
//! capacity enforcement on every put.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::error::{CacheError, Result};
use crate::store::heap::ExpiryHeap;
use crate::store::{CacheEntry, Store};

// == Memory Store ==
/// In-memory TTL cache with capacity-bounded eviction.
///
/// All operations take the store's single lock, so operations on one store
/// are linearizable with respect to each other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<CacheState>,
}

// == Cache State ==
/// Everything guarded by the store lock: the key map, the expiry heap and
/// the lazily applied put-derived settings.
#[derive(Debug)]
pub(crate) struct CacheState {
    /// Key to current heap slot; kept in step with every heap mutation
    slots: HashMap<String, usize>,
    /// Entries ordered by expiry time
    expiries: ExpiryHeap,
    /// Entry lifetime; `None` until a put-capable configuration arrives
    ttl: Option<Duration>,
    /// Maximum live entries; values <= 0 leave the store unbounded
    capacity: i64,
    /// Expired entries examined per eviction pass; <= 0 sweeps without bound
    effort: i64,
    /// True when in-memory state has mutated since the last write-out
    pub(crate) dirty: bool,
}

impl Default for CacheState {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            expiries: ExpiryHeap::new(),
            ttl: None,
            capacity: -1,
            effort: -1,
            dirty: false,
        }
    }
}

impl MemoryStore {
    // == Constructor ==
    /// Creates an empty store with unset put settings.
    pub fn new() -> Self {
        Self::default()
    }

    // == Settings Merge ==
    /// Applies put-derived settings exactly once.
    ///
    /// Configurations referencing the same logical ID may arrive in any
    /// order; the first one carrying put settings wins and later ones are
    /// ignored. Get/delete-only configurations never call this.
    pub(crate) fn apply_put_settings(&self, ttl: Duration, capacity: i64, effort: i64) {
        let mut state = self.state();
        if state.ttl.is_none() {
            state.ttl = Some(ttl);
            state.capacity = capacity;
            state.effort = effort;
        }
    }

    // == Length ==
    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.state().slots.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.state().slots.is_empty()
    }

    // == Lock ==
    /// Takes the store lock.
    pub(crate) fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().expect("cache state lock poisoned")
    }
}

// == Store Contract ==
impl Store for MemoryStore {
    fn put(&self, key: &str, value: Value) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state();
        state.evict_expired(now);
        state.upsert(key, value, now);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Value> {
        self.state().lookup(key, Utc::now())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.state().remove(key);
        Ok(())
    }
}

impl CacheState {
    // == Upsert ==
    /// Inserts or overwrites `key`. An overwrite detaches the previous heap
    /// slot first so map and heap stay one-to-one.
    fn upsert(&mut self, key: &str, value: Value, now: DateTime<Utc>) {
        if let Some(at) = self.slots.get(key).copied() {
            self.expiries.remove(&mut self.slots, at);
        }
        // No TTL configured yet: insert the entry already expired.
        let ttl = self.ttl.unwrap_or_else(|| Duration::seconds(-1));
        let entry = CacheEntry::new(key.to_string(), value, now, ttl);
        self.expiries.push(&mut self.slots, entry);
        self.dirty = true;
    }

    // == Lookup ==
    /// Returns the value for `key`, lazily deleting it when stale.
    fn lookup(&mut self, key: &str, now: DateTime<Utc>) -> Result<Value> {
        let at = match self.slots.get(key) {
            Some(&at) => at,
            None => return Err(CacheError::NoData(key.to_string())),
        };
        if self.expiries.entry(at).is_expired(now) {
            // Lazy expiration is permanent: the stale entry leaves both the
            // map and the heap.
            self.expiries.remove(&mut self.slots, at);
            return Err(CacheError::NoData(key.to_string()));
        }
        Ok(self.expiries.entry(at).value.clone())
    }

    // == Remove ==
    /// Removes `key` from the map and heap. Absent keys are a no-op.
    fn remove(&mut self, key: &str) {
        if let Some(at) = self.slots.get(key).copied() {
            self.expiries.remove(&mut self.slots, at);
            self.dirty = true;
        }
    }

    // == Eviction ==
    /// Runs before every insert.
    ///
    /// Pass 1 pops entries whose expiry has passed, examining at most
    /// `effort` of them per call. Pass 2 enforces the capacity cap
    /// unconditionally, evicting the soonest-expiring entries (expired or
    /// not) until the insert fits.
    fn evict_expired(&mut self, now: DateTime<Utc>) {
        let mut examined = 0i64;
        while !self.expiries.is_empty() && (self.effort <= 0 || examined < self.effort) {
            let stale = self.expiries.peek().is_some_and(|e| e.is_expired(now));
            if !stale {
                break;
            }
            self.expiries.pop_min(&mut self.slots);
            examined += 1;
        }

        if self.capacity > 0 {
            while self.expiries.len() as i64 >= self.capacity {
                self.expiries.pop_min(&mut self.slots);
            }
        }
    }

    // == Loaded Entries ==
    /// Inserts an entry reloaded from disk, keeping its original expiry.
    pub(crate) fn insert_loaded(&mut self, entry: CacheEntry) {
        if let Some(at) = self.slots.get(&entry.key).copied() {
            self.expiries.remove(&mut self.slots, at);
        }
        self.expiries.push(&mut self.slots, entry);
    }

    // == Live Entries ==
    /// Iterates all entries currently held, in heap order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.expiries.iter()
    }

    // == Is Empty ==
    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
