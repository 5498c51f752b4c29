//! Prelude module for common imports.
//!
//! This module re-exports commonly used types and traits for convenience.
//!
//! # Usage
//!
//! ```ignore
//! use lrucached::prelude::*;
//! ```

// Error types
pub use crate::error::{CacheError, ProtocolError, Result, StoreError};

// Configuration
pub use crate::config::{Config, ServerConfig, StorageConfig};

// Storage
pub use crate::storage::{Clock, Entry, EntryStore, ManualClock, SystemClock};

// Protocol
pub use crate::protocol::{Command, ParseResult, ResponseWriter};

// Metrics
pub use crate::metrics::{Metrics, StatsRecorder};

// Server
pub use crate::server::{Server, TcpTransport, Transport};

// Common external crates
pub use std::sync::Arc;
pub use tracing::{debug, error, info, trace, warn};
