//! In-memory entry store
//!
//! A single mutex guards the key map, the recency index and the byte
//! accounting, so eviction is atomic with the write that triggered it.
//! Reads hand out cloned entries; values are reference-counted `Bytes`, so a
//! reader holds a consistent snapshot even if the entry is evicted afterwards.

use crate::StoreError;
use crate::config::StorageConfig;
use crate::metrics::StatsRecorder;
use crate::storage::clock::Clock;
use crate::storage::entry::{Entry, calculate_expires_at, entry_size};
use crate::storage::eviction::{LruIndex, LruPolicy};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// State guarded by the store lock
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) entries: HashMap<Bytes, Entry>,
    pub(crate) lru: LruIndex,
    pub(crate) used_bytes: usize,
    next_tick: u64,
    /// Tick the next expiry sweep resumes from
    sweep_cursor: u64,
}

impl StoreState {
    fn bump_tick(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    /// Insert `entry` as the most recently used, replacing any previous one
    pub(crate) fn insert(&mut self, mut entry: Entry) -> Option<Entry> {
        let previous = self.remove(&entry.key);
        entry.last_touched = self.bump_tick();
        self.lru.insert(entry.last_touched, entry.key.clone());
        self.used_bytes += entry.size_bytes;
        self.entries.insert(entry.key.clone(), entry);
        previous
    }

    pub(crate) fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(entry.last_touched);
        self.used_bytes -= entry.size_bytes;
        Some(entry)
    }

    /// Mark `key` as most recently used
    fn touch(&mut self, key: &[u8]) {
        let tick = self.bump_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.lru.touch(entry.last_touched, tick);
            entry.last_touched = tick;
        }
    }

    /// Swap the value of `key`, keeping flags and expiry
    fn update_value(&mut self, key: &[u8], value: Bytes) {
        let tick = self.bump_tick();
        if let Some(entry) = self.entries.get_mut(key) {
            self.used_bytes -= entry.size_bytes;
            entry.set_value(value);
            self.used_bytes += entry.size_bytes;
            self.lru.touch(entry.last_touched, tick);
            entry.last_touched = tick;
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.used_bytes = 0;
        self.sweep_cursor = 0;
    }
}

/// Bounded in-memory key/value store with TTL and LRU eviction
pub struct EntryStore {
    state: Mutex<StoreState>,
    policy: LruPolicy,
    memory_budget: usize,
    clock: Arc<dyn Clock>,
    stats: Arc<dyn StatsRecorder>,
}

impl EntryStore {
    /// Create an empty store
    pub fn new(
        config: &StorageConfig,
        clock: Arc<dyn Clock>,
        stats: Arc<dyn StatsRecorder>,
    ) -> Self {
        info!(
            memory_budget = config.memory_budget_bytes,
            eviction_scan_threshold = config.eviction_scan_threshold,
            "Entry store initialized"
        );
        Self {
            state: Mutex::new(StoreState::default()),
            policy: LruPolicy::new(config.eviction_scan_threshold),
            memory_budget: config.memory_budget_bytes,
            clock,
            stats,
        }
    }

    /// Drop every entry
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        let dropped = state.entries.len();
        state.clear();
        self.publish(&state);
        info!(dropped, "Entry store shut down");
    }

    /// Get a live entry (with lazy expiration)
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let found = self.lookup(&mut state, key, now);
        self.publish(&state);
        found
    }

    /// Get several entries under one lock acquisition
    pub fn get_multi<K: AsRef<[u8]>>(&self, keys: &[K]) -> Vec<Option<Entry>> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let results = keys
            .iter()
            .map(|key| self.lookup(&mut state, key.as_ref(), now))
            .collect();
        self.publish(&state);
        results
    }

    /// Store unconditionally
    pub fn set(&self, key: &[u8], value: Bytes, flags: u32, exptime: i64) -> Result<(), StoreError> {
        self.write(key, value, flags, exptime, |_| Ok(()))
    }

    /// Store only if no live entry exists
    pub fn add(&self, key: &[u8], value: Bytes, flags: u32, exptime: i64) -> Result<(), StoreError> {
        self.write(key, value, flags, exptime, |live| {
            if live {
                Err(StoreError::AlreadyExists)
            } else {
                Ok(())
            }
        })
    }

    /// Store only if a live entry exists
    pub fn replace(
        &self,
        key: &[u8],
        value: Bytes,
        flags: u32,
        exptime: i64,
    ) -> Result<(), StoreError> {
        self.write(key, value, flags, exptime, |live| {
            if live {
                Ok(())
            } else {
                Err(StoreError::NotFound)
            }
        })
    }

    /// Append to an existing value
    pub fn append(&self, key: &[u8], data: &[u8]) -> Result<(), StoreError> {
        self.concat(key, data, true)
    }

    /// Prepend to an existing value
    pub fn prepend(&self, key: &[u8], data: &[u8]) -> Result<(), StoreError> {
        self.concat(key, data, false)
    }

    /// Add `delta`, wrapping around at `u64::MAX`
    pub fn incr(&self, key: &[u8], delta: u64) -> Result<u64, StoreError> {
        self.apply_delta(key, |current| current.wrapping_add(delta))
    }

    /// Subtract `delta`, never going below zero
    pub fn decr(&self, key: &[u8], delta: u64) -> Result<u64, StoreError> {
        self.apply_delta(key, |current| current.saturating_sub(delta))
    }

    /// Reset the expiry of a live entry
    pub fn touch(&self, key: &[u8], exptime: i64) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let result = match self.live_entry(&mut state, key, now) {
            Some(entry) => {
                entry.expires_at = calculate_expires_at(exptime, now);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        };
        if result.is_ok() {
            state.touch(key);
        }
        self.publish(&state);
        result
    }

    /// Remove a live entry
    pub fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let live = self.live_entry(&mut state, key, now).is_some();
        let result = if live {
            state.remove(key);
            Ok(())
        } else {
            Err(StoreError::NotFound)
        };
        self.publish(&state);
        result
    }

    /// Invalidate everything now, or make every current entry expire within
    /// `delay` seconds
    pub fn flush_all(&self, delay: u64) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if delay == 0 {
            let dropped = state.entries.len();
            state.clear();
            debug!(dropped, "Flushed all entries");
        } else {
            let deadline = now.saturating_add(delay);
            for entry in state.entries.values_mut() {
                entry.expires_at = Some(entry.expires_at.map_or(deadline, |at| at.min(deadline)));
            }
            debug!(deadline, "Scheduled flush of all entries");
        }
        self.publish(&state);
    }

    /// Drop expired entries among the next `eviction_scan_threshold` slots of
    /// the recency index, resuming where the previous pass stopped and
    /// wrapping around at the most recent end. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let limit = self.policy.scan_threshold();
        let mut state = self.state.lock();

        let mut next_cursor = 0;
        let mut expired = Vec::new();
        for (scanned, (tick, key)) in state.lru.range_from(state.sweep_cursor).enumerate() {
            if scanned == limit {
                next_cursor = tick;
                break;
            }
            if state
                .entries
                .get(&key[..])
                .is_some_and(|entry| entry.is_expired(now))
            {
                expired.push(key.clone());
            }
        }
        state.sweep_cursor = next_cursor;

        for key in &expired {
            state.remove(key);
        }
        if !expired.is_empty() {
            self.stats.record_expired(expired.len());
        }
        self.publish(&state);
        expired.len()
    }

    /// Number of stored entries, including expired ones not yet reclaimed
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Accounted size of all stored entries
    pub fn used_bytes(&self) -> usize {
        self.state.lock().used_bytes
    }

    pub fn memory_budget(&self) -> usize {
        self.memory_budget
    }

    fn write(
        &self,
        key: &[u8],
        value: Bytes,
        flags: u32,
        exptime: i64,
        precondition: impl FnOnce(bool) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let live = self.live_entry(&mut state, key, now).is_some();
        let outcome = precondition(live)
            .and_then(|()| self.check_fits(entry_size(key.len(), value.len())));
        if let Err(e) = outcome {
            self.publish(&state);
            return Err(e);
        }

        let expires_at = calculate_expires_at(exptime, now);
        if expires_at.is_some_and(|at| at <= now) {
            // Already expired: the write only invalidates the previous value
            state.remove(key);
            self.publish(&state);
            return Ok(());
        }

        let entry = Entry::new(Bytes::copy_from_slice(key), value, flags, expires_at);
        state.insert(entry);
        self.enforce_budget(&mut state, now);
        self.publish(&state);
        Ok(())
    }

    fn concat(&self, key: &[u8], data: &[u8], append: bool) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let current = self
            .live_entry(&mut state, key, now)
            .map(|entry| entry.value.clone());
        let Some(current) = current else {
            self.publish(&state);
            return Err(StoreError::NotFound);
        };
        self.check_fits(entry_size(key.len(), current.len() + data.len()))?;

        let mut value = BytesMut::with_capacity(current.len() + data.len());
        if append {
            value.extend_from_slice(&current);
            value.extend_from_slice(data);
        } else {
            value.extend_from_slice(data);
            value.extend_from_slice(&current);
        }
        state.update_value(key, value.freeze());
        self.enforce_budget(&mut state, now);
        self.publish(&state);
        Ok(())
    }

    fn apply_delta(&self, key: &[u8], op: impl FnOnce(u64) -> u64) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let current = self
            .live_entry(&mut state, key, now)
            .map(|entry| entry.as_u64());
        let Some(current) = current else {
            self.publish(&state);
            return Err(StoreError::NotFound);
        };
        let current = current?;

        let updated = op(current);
        let mut digits = itoa::Buffer::new();
        let value = Bytes::copy_from_slice(digits.format(updated).as_bytes());
        self.check_fits(entry_size(key.len(), value.len()))?;

        state.update_value(key, value);
        self.enforce_budget(&mut state, now);
        self.publish(&state);
        Ok(updated)
    }

    /// Hit/miss-recording lookup used by reads
    fn lookup(&self, state: &mut StoreState, key: &[u8], now: u64) -> Option<Entry> {
        if self.live_entry(state, key, now).is_none() {
            self.stats.record_miss();
            return None;
        }
        state.touch(key);
        self.stats.record_hit();
        state.entries.get(key).cloned()
    }

    /// Live entry for `key`, dropping it first if it has expired
    fn live_entry<'s>(
        &self,
        state: &'s mut StoreState,
        key: &[u8],
        now: u64,
    ) -> Option<&'s mut Entry> {
        if state.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            state.remove(key);
            self.stats.record_expired(1);
            debug!(key = %String::from_utf8_lossy(key), "Lazy expiration: removed expired key");
            return None;
        }
        state.entries.get_mut(key)
    }

    fn check_fits(&self, size: usize) -> Result<(), StoreError> {
        if size > self.memory_budget {
            return Err(StoreError::OutOfMemory {
                size,
                budget: self.memory_budget,
            });
        }
        Ok(())
    }

    fn enforce_budget(&self, state: &mut StoreState, now: u64) {
        if state.used_bytes <= self.memory_budget {
            return;
        }
        let reclaimed = self.policy.reclaim(state, self.memory_budget, now);
        if reclaimed.expired > 0 {
            self.stats.record_expired(reclaimed.expired);
        }
        for _ in 0..reclaimed.evicted {
            self.stats.record_eviction();
        }
        debug!(
            expired = reclaimed.expired,
            evicted = reclaimed.evicted,
            used_bytes = state.used_bytes,
            "Reclaimed memory"
        );
    }

    fn publish(&self, state: &StoreState) {
        self.stats.set_item_count(state.entries.len());
        self.stats.set_used_bytes(state.used_bytes);
    }
}
