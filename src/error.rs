//! Error types for lrucached

use thiserror::Error;

/// Main error type for lrucached
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Protocol parsing errors
///
/// The display strings are sent verbatim after `CLIENT_ERROR`/`SERVER_ERROR`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Unknown verb or empty command line, answered with a bare `ERROR`
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("bad command line format")]
    BadCommandLine,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key too long (max 250 bytes)")]
    KeyTooLong,

    #[error("bad command line format: invalid flags")]
    InvalidFlags,

    #[error("bad command line format: invalid exptime")]
    InvalidExptime,

    #[error("bad command line format: invalid bytes length")]
    InvalidBytesLength,

    #[error("invalid numeric delta argument")]
    InvalidDelta,

    #[error("bad data chunk")]
    BadDataChunk,

    #[error("object too large for cache")]
    ValueTooLarge,

    #[error("line too long")]
    LineTooLong,
}

impl ProtocolError {
    /// Whether the stream can no longer be resynchronized
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::LineTooLong)
    }
}

/// Entry store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Key not found")]
    NotFound,

    #[error("Key already exists")]
    AlreadyExists,

    #[error("cannot increment or decrement non-numeric value")]
    NotNumeric,

    #[error("out of memory storing object")]
    OutOfMemory { size: usize, budget: usize },
}

pub type Result<T> = std::result::Result<T, CacheError>;
