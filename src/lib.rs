//! # lrucached
//!
//! Memcached-compatible in-memory cache server with a byte budget and LRU
//! eviction.
//!
//! ## Features
//!
//! - Memcached ASCII protocol (get/gets, set/add/replace/append/prepend,
//!   incr/decr, delete, touch, flush_all, version, quit)
//! - Byte-budgeted store: expired entries are reclaimed first, then the least
//!   recently used ones
//! - TTL support with lazy expiration and a background sweep
//! - Prometheus metrics registry
//!
//! ## Example
//!
//! ```ignore
//! use lrucached::config::Config;
//! use lrucached::metrics::Metrics;
//! use lrucached::storage::{EntryStore, SystemClock};
//!
//! let config = Config::default();
//! let metrics = Arc::new(Metrics::new());
//! let store = EntryStore::new(&config.storage, Arc::new(SystemClock), metrics);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────────────────────────┐
//! │ memcache     │────▶│ lrucached                                │
//! │ client       │     │  ├─ Server (accept loop, connection cap) │
//! └──────────────┘     │  ├─ Connection (parse, batch replies)    │
//!                      │  └─ EntryStore (TTL, byte budget, LRU)   │
//!                      └──────────────────────────────────────────┘
//! ```

// Modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod prelude;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use error::{CacheError, ProtocolError, Result, StoreError};
