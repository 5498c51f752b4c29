//! LRU eviction
//!
//! Recency is tracked with a tick-ordered index so that finding the least
//! recently used entry never requires scanning the store. Expired entries are
//! reclaimed before any live entry is evicted.

use crate::storage::store::StoreState;
use bytes::Bytes;
use std::collections::BTreeMap;
use tracing::trace;

/// Keys ordered by their last access tick (smallest = least recently used)
#[derive(Debug, Default)]
pub struct LruIndex {
    order: BTreeMap<u64, Bytes>,
}

impl LruIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tick: u64, key: Bytes) {
        self.order.insert(tick, key);
    }

    pub fn remove(&mut self, tick: u64) -> Option<Bytes> {
        self.order.remove(&tick)
    }

    /// Move the key recorded at `old` to `new`
    pub fn touch(&mut self, old: u64, new: u64) {
        if let Some(key) = self.order.remove(&old) {
            self.order.insert(new, key);
        }
    }

    pub fn oldest(&self) -> Option<&Bytes> {
        self.order.first_key_value().map(|(_, key)| key)
    }

    /// Entries from `tick` onwards, least recently used first
    pub fn range_from(&self, tick: u64) -> impl Iterator<Item = (u64, &Bytes)> {
        self.order.range(tick..).map(|(tick, key)| (*tick, key))
    }

    /// Keys from least to most recently used
    pub fn iter_oldest(&self) -> impl Iterator<Item = &Bytes> {
        self.order.values()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }
}

/// Outcome of a reclaim pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reclaimed {
    /// Expired entries dropped
    pub expired: usize,
    /// Live entries evicted
    pub evicted: usize,
}

/// Least-recently-used reclaim policy
#[derive(Debug, Clone, Copy)]
pub struct LruPolicy {
    scan_threshold: usize,
}

impl LruPolicy {
    pub fn new(scan_threshold: usize) -> Self {
        Self {
            scan_threshold: scan_threshold.max(1),
        }
    }

    /// Number of entries a single expiry scan may inspect
    pub fn scan_threshold(&self) -> usize {
        self.scan_threshold
    }

    /// Bring `state` back within `budget`.
    ///
    /// Small stores are scanned in full for expired entries; larger ones only
    /// have their `scan_threshold` oldest entries checked. Live entries are
    /// then evicted oldest first.
    pub(crate) fn reclaim(&self, state: &mut StoreState, budget: usize, now: u64) -> Reclaimed {
        let mut reclaimed = Reclaimed::default();
        if state.used_bytes <= budget {
            return reclaimed;
        }

        let expired: Vec<Bytes> = if state.entries.len() <= self.scan_threshold {
            state
                .entries
                .values()
                .filter(|entry| entry.is_expired(now))
                .map(|entry| entry.key.clone())
                .collect()
        } else {
            state
                .lru
                .iter_oldest()
                .take(self.scan_threshold)
                .filter(|key| {
                    state
                        .entries
                        .get(&key[..])
                        .is_some_and(|entry| entry.is_expired(now))
                })
                .cloned()
                .collect()
        };

        for key in expired {
            if state.remove(&key).is_some() {
                trace!(key = %String::from_utf8_lossy(&key), "Reclaimed expired entry");
                reclaimed.expired += 1;
            }
        }

        while state.used_bytes > budget {
            let Some(key) = state.lru.oldest().cloned() else {
                break;
            };
            if let Some(entry) = state.remove(&key) {
                trace!(
                    key = %String::from_utf8_lossy(&key),
                    size = entry.size_bytes,
                    "Evicted entry"
                );
                reclaimed.evicted += 1;
            }
        }

        reclaimed
    }
}
