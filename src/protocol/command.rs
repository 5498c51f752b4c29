//! Memcached ASCII protocol command types

use std::borrow::Cow;

/// Maximum key length (memcached protocol limit)
pub const MAX_KEY_LENGTH: usize = 250;

/// Largest data block accepted by storage commands (1MB, memcached's default
/// item size limit)
pub const MAX_VALUE_LENGTH: usize = 1024 * 1024;

/// Longest command line accepted before the stream is considered corrupt
pub const MAX_LINE_LENGTH: usize = 8192;

/// Storage verb sharing the `<key> <flags> <exptime> <bytes>` layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
}

impl StoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMode::Set => "set",
            StoreMode::Add => "add",
            StoreMode::Replace => "replace",
            StoreMode::Append => "append",
            StoreMode::Prepend => "prepend",
        }
    }
}

/// Parsed memcached command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// get <key>*
    Get { keys: Vec<Cow<'a, [u8]>> },

    /// gets <key>*
    Gets { keys: Vec<Cow<'a, [u8]>> },

    /// set|add|replace|append|prepend <key> <flags> <exptime> <bytes> [noreply]
    Store {
        mode: StoreMode,
        key: Cow<'a, [u8]>,
        flags: u32,
        exptime: i64,
        data: Cow<'a, [u8]>,
        noreply: bool,
    },

    /// delete <key> [noreply]
    Delete { key: Cow<'a, [u8]>, noreply: bool },

    /// incr <key> <delta> [noreply]
    Incr {
        key: Cow<'a, [u8]>,
        delta: u64,
        noreply: bool,
    },

    /// decr <key> <delta> [noreply]
    Decr {
        key: Cow<'a, [u8]>,
        delta: u64,
        noreply: bool,
    },

    /// touch <key> <exptime> [noreply]
    Touch {
        key: Cow<'a, [u8]>,
        exptime: i64,
        noreply: bool,
    },

    /// flush_all [delay] [noreply]
    FlushAll { delay: u64, noreply: bool },

    /// version
    Version,

    /// quit
    Quit,
}

impl<'a> Command<'a> {
    /// Returns true if this command should not send a response
    pub fn is_noreply(&self) -> bool {
        match self {
            Command::Store { noreply, .. }
            | Command::Delete { noreply, .. }
            | Command::Incr { noreply, .. }
            | Command::Decr { noreply, .. }
            | Command::Touch { noreply, .. }
            | Command::FlushAll { noreply, .. } => *noreply,
            _ => false,
        }
    }
}

/// Check if a key is valid
pub fn is_valid_key(key: &[u8]) -> bool {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return false;
    }
    // Keys cannot contain control characters or whitespace
    key.iter().all(|&b| b > 32 && b < 127)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_key() {
        assert!(is_valid_key(b"valid_key"));
        assert!(is_valid_key(b"key-with-dashes"));
        assert!(is_valid_key(b"key:with:colons"));
        assert!(is_valid_key(&[b'a'; 250]));
        assert!(!is_valid_key(b""));
        assert!(!is_valid_key(b"key with space"));
        assert!(!is_valid_key(b"key\twith\ttab"));
        assert!(!is_valid_key(&[b'a'; 251])); // Too long
    }

    #[test]
    fn test_is_noreply() {
        let cmd = Command::Store {
            mode: StoreMode::Set,
            key: Cow::Borrowed(b"key"),
            flags: 0,
            exptime: 0,
            data: Cow::Borrowed(b"data"),
            noreply: true,
        };
        assert!(cmd.is_noreply());

        let cmd = Command::Incr {
            key: Cow::Borrowed(b"key"),
            delta: 1,
            noreply: true,
        };
        assert!(cmd.is_noreply());

        let cmd = Command::Get {
            keys: vec![Cow::Borrowed(b"key" as &[u8])],
        };
        assert!(!cmd.is_noreply());
        assert!(!Command::Quit.is_noreply());
    }

    #[test]
    fn test_store_mode_names() {
        assert_eq!(StoreMode::Set.as_str(), "set");
        assert_eq!(StoreMode::Prepend.as_str(), "prepend");
    }
}
