//! Stored entry and TTL arithmetic
//!
//! TTL Rules (memcached-compatible):
//! - 0 = never expire
//! - negative = already expired
//! - <= 2592000 (30 days) = relative seconds from now
//! - > 2592000 = absolute Unix timestamp

use crate::StoreError;
use bytes::Bytes;

/// Maximum relative TTL value (30 days in seconds)
const MAX_RELATIVE_TTL: i64 = 2_592_000;

/// Fixed bookkeeping charge added to every entry's accounted size
pub const ENTRY_OVERHEAD: usize = 48;

/// One stored item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Bytes,
    pub value: Bytes,
    /// Opaque client flags
    pub flags: u32,
    /// Absolute expiration timestamp, `None` = never expire
    pub expires_at: Option<u64>,
    /// Accounted size of key, value and metadata
    pub size_bytes: usize,
    /// Logical access tick, larger is more recent
    pub last_touched: u64,
}

impl Entry {
    pub fn new(key: Bytes, value: Bytes, flags: u32, expires_at: Option<u64>) -> Self {
        let size_bytes = entry_size(key.len(), value.len());
        Self {
            key,
            value,
            flags,
            expires_at,
            size_bytes,
            last_touched: 0,
        }
    }

    /// Check if the entry has expired at `now`
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Replace the value and recompute the accounted size
    pub fn set_value(&mut self, value: Bytes) {
        self.size_bytes = entry_size(self.key.len(), value.len());
        self.value = value;
    }

    /// Get the data as a numeric value for incr/decr
    pub fn as_u64(&self) -> Result<u64, StoreError> {
        let s = std::str::from_utf8(&self.value).map_err(|_| StoreError::NotNumeric)?;
        s.trim().parse::<u64>().map_err(|_| StoreError::NotNumeric)
    }
}

/// Accounted size of an entry with the given key and value lengths
pub fn entry_size(key_len: usize, value_len: usize) -> usize {
    key_len + value_len + ENTRY_OVERHEAD
}

/// Calculate the absolute expiration timestamp from memcached exptime
pub fn calculate_expires_at(exptime: i64, now: u64) -> Option<u64> {
    if exptime == 0 {
        None
    } else if exptime < 0 {
        Some(0)
    } else if exptime <= MAX_RELATIVE_TTL {
        Some(now.saturating_add(exptime as u64))
    } else {
        Some(exptime as u64)
    }
}
