//! Hand-written memcached ASCII protocol parser
//!
//! Two-phase parsing:
//! 1. Parse command line (up to \r\n)
//! 2. For storage commands, read data block
//!
//! Every error carries the number of bytes the caller must discard to get
//! back to the start of the next command.

use crate::ProtocolError;
use crate::protocol::command::{
    Command, MAX_KEY_LENGTH, MAX_LINE_LENGTH, MAX_VALUE_LENGTH, StoreMode, is_valid_key,
};
use std::borrow::Cow;

/// Case-insensitive command comparison (avoids allocation from to_ascii_lowercase)
#[inline]
fn cmd_eq(cmd: &[u8], expected: &[u8]) -> bool {
    cmd.len() == expected.len()
        && cmd
            .iter()
            .zip(expected.iter())
            .all(|(a, b)| a.to_ascii_lowercase() == *b)
}

/// Result of parsing
#[derive(Debug)]
pub enum ParseResult<'a> {
    /// Command fully parsed, with the number of bytes it occupied
    Complete(Command<'a>, usize),
    /// Storage command line parsed, data block not yet checked
    Pending(PendingStorageCommand),
    /// Need more data to complete parsing
    NeedMoreData,
    /// Parse error, with the number of bytes to discard (may exceed the
    /// buffered length when a rejected data block is still in flight)
    Error(ProtocolError, usize),
}

/// Parser state for handling storage commands that need data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStorageCommand {
    pub mode: StoreMode,
    pub key: Vec<u8>,
    pub flags: u32,
    pub exptime: i64,
    pub bytes: usize,
    pub noreply: bool,
    pub command_line_end: usize,
}

/// Parse a complete memcached command (command line and any data block)
pub fn parse(buf: &[u8]) -> ParseResult<'_> {
    match parse_command_line(buf) {
        ParseResult::Pending(pending) => parse_storage_data(buf, &pending),
        other => other,
    }
}

/// Parse the command line at the start of `buf`.
///
/// Storage commands yield [`ParseResult::Pending`]; their data block is
/// handled by [`parse_storage_data`].
pub fn parse_command_line(buf: &[u8]) -> ParseResult<'_> {
    // Find the end of the command line
    let line_end = match find_crlf(buf) {
        Some(pos) => pos,
        None if buf.len() > MAX_LINE_LENGTH => {
            return ParseResult::Error(ProtocolError::LineTooLong, buf.len());
        }
        None => return ParseResult::NeedMoreData,
    };

    let line = &buf[..line_end];
    let consumed = line_end + 2;

    let mut parts = line.split(|&b| b == b' ').filter(|part| !part.is_empty());
    let cmd_name = match parts.next() {
        Some(name) => name,
        None => {
            return ParseResult::Error(ProtocolError::UnknownCommand(String::new()), consumed);
        }
    };

    // Match command (case-insensitive, no allocation)
    let result = if cmd_eq(cmd_name, b"get") {
        parse_get(parts).map(|keys| Command::Get { keys })
    } else if cmd_eq(cmd_name, b"gets") {
        parse_get(parts).map(|keys| Command::Gets { keys })
    } else if let Some(mode) = store_mode(cmd_name) {
        return parse_storage_line(mode, parts, line_end);
    } else if cmd_eq(cmd_name, b"delete") {
        parse_delete(parts)
    } else if cmd_eq(cmd_name, b"incr") {
        parse_arith(parts).map(|(key, delta, noreply)| Command::Incr {
            key,
            delta,
            noreply,
        })
    } else if cmd_eq(cmd_name, b"decr") {
        parse_arith(parts).map(|(key, delta, noreply)| Command::Decr {
            key,
            delta,
            noreply,
        })
    } else if cmd_eq(cmd_name, b"touch") {
        parse_touch(parts)
    } else if cmd_eq(cmd_name, b"flush_all") {
        parse_flush_all(parts)
    } else if cmd_eq(cmd_name, b"version") {
        Ok(Command::Version)
    } else if cmd_eq(cmd_name, b"quit") {
        Ok(Command::Quit)
    } else {
        Err(ProtocolError::UnknownCommand(
            String::from_utf8_lossy(cmd_name).to_string(),
        ))
    };

    match result {
        Ok(cmd) => ParseResult::Complete(cmd, consumed),
        Err(e) => ParseResult::Error(e, consumed),
    }
}

/// Continue parsing a storage command after receiving data block
pub fn parse_storage_data<'a>(buf: &'a [u8], pending: &PendingStorageCommand) -> ParseResult<'a> {
    // Need: command_line_end + data_bytes + 2 (for \r\n after data)
    let data_start = pending.command_line_end + 2;
    let data_end = data_start + pending.bytes;
    let total_needed = data_end + 2; // +2 for trailing \r\n

    if buf.len() < total_needed {
        return ParseResult::NeedMoreData;
    }

    // Data block longer than announced: drop it through the next line end
    if &buf[data_end..total_needed] != b"\r\n" {
        let rest = &buf[data_end..];
        return match find_crlf(rest) {
            Some(pos) => ParseResult::Error(ProtocolError::BadDataChunk, data_end + pos + 2),
            None if rest.len() > MAX_LINE_LENGTH => {
                ParseResult::Error(ProtocolError::LineTooLong, buf.len())
            }
            None => ParseResult::NeedMoreData,
        };
    }

    let cmd = Command::Store {
        mode: pending.mode,
        key: Cow::Owned(pending.key.clone()),
        flags: pending.flags,
        exptime: pending.exptime,
        data: Cow::Borrowed(&buf[data_start..data_end]),
        noreply: pending.noreply,
    };

    ParseResult::Complete(cmd, total_needed)
}

/// Find \r\n in buffer
#[inline]
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    memchr::memmem::find(buf, b"\r\n")
}

fn store_mode(cmd_name: &[u8]) -> Option<StoreMode> {
    if cmd_eq(cmd_name, b"set") {
        Some(StoreMode::Set)
    } else if cmd_eq(cmd_name, b"add") {
        Some(StoreMode::Add)
    } else if cmd_eq(cmd_name, b"replace") {
        Some(StoreMode::Replace)
    } else if cmd_eq(cmd_name, b"append") {
        Some(StoreMode::Append)
    } else if cmd_eq(cmd_name, b"prepend") {
        Some(StoreMode::Prepend)
    } else {
        None
    }
}

fn validate_key(key: &[u8]) -> Result<(), ProtocolError> {
    if is_valid_key(key) {
        return Ok(());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(ProtocolError::KeyTooLong);
    }
    Err(ProtocolError::InvalidKey(
        String::from_utf8_lossy(key).to_string(),
    ))
}

fn next_key<'a>(parts: &mut impl Iterator<Item = &'a [u8]>) -> Result<&'a [u8], ProtocolError> {
    let key = parts.next().ok_or(ProtocolError::BadCommandLine)?;
    validate_key(key)?;
    Ok(key)
}

fn is_noreply(part: Option<&[u8]>) -> bool {
    part.is_some_and(|s| s == b"noreply")
}

/// Parse get/gets keys
fn parse_get<'a>(
    parts: impl Iterator<Item = &'a [u8]>,
) -> Result<Vec<Cow<'a, [u8]>>, ProtocolError> {
    let mut keys = Vec::new();
    for part in parts {
        validate_key(part)?;
        keys.push(Cow::Borrowed(part));
    }

    if keys.is_empty() {
        return Err(ProtocolError::BadCommandLine);
    }
    Ok(keys)
}

/// Parse `<key> <flags> <exptime> <bytes> [noreply]`
fn parse_storage_line<'a>(
    mode: StoreMode,
    mut parts: impl Iterator<Item = &'a [u8]>,
    line_end: usize,
) -> ParseResult<'a> {
    let line_consumed = line_end + 2;

    let key = parts.next();
    let flags = parts.next();
    let exptime = parts.next();

    // <bytes> decides how much input belongs to this request, so it is
    // checked before anything else on the line
    let bytes = match parts.next().and_then(parse_usize) {
        Some(b) => b,
        None if key.is_none() => {
            return ParseResult::Error(ProtocolError::BadCommandLine, line_consumed);
        }
        None => return ParseResult::Error(ProtocolError::InvalidBytesLength, line_consumed),
    };

    // From here on every rejection swallows the announced data block too
    let request_consumed = line_consumed + bytes + 2;

    if bytes > MAX_VALUE_LENGTH {
        return ParseResult::Error(ProtocolError::ValueTooLarge, request_consumed);
    }

    let Some(key) = key else {
        return ParseResult::Error(ProtocolError::BadCommandLine, request_consumed);
    };
    if let Err(e) = validate_key(key) {
        return ParseResult::Error(e, request_consumed);
    }

    let Some(flags) = flags.and_then(parse_u32) else {
        return ParseResult::Error(ProtocolError::InvalidFlags, request_consumed);
    };

    let Some(exptime) = exptime.and_then(parse_i64) else {
        return ParseResult::Error(ProtocolError::InvalidExptime, request_consumed);
    };

    let noreply = is_noreply(parts.next());

    ParseResult::Pending(PendingStorageCommand {
        mode,
        key: key.to_vec(),
        flags,
        exptime,
        bytes,
        noreply,
        command_line_end: line_end,
    })
}

/// Parse delete command
/// Format: delete <key> [exptime] [noreply]\r\n
/// exptime is parsed but ignored (legacy clients still send `0`)
fn parse_delete<'a>(
    mut parts: impl Iterator<Item = &'a [u8]>,
) -> Result<Command<'a>, ProtocolError> {
    let key = next_key(&mut parts)?;
    let noreply = parts.any(|part| part == b"noreply");

    Ok(Command::Delete {
        key: Cow::Borrowed(key),
        noreply,
    })
}

/// Parse `<key> <delta> [noreply]` for incr/decr
fn parse_arith<'a>(
    mut parts: impl Iterator<Item = &'a [u8]>,
) -> Result<(Cow<'a, [u8]>, u64, bool), ProtocolError> {
    let key = next_key(&mut parts)?;
    let delta = parts
        .next()
        .and_then(parse_u64)
        .ok_or(ProtocolError::InvalidDelta)?;
    let noreply = is_noreply(parts.next());
    Ok((Cow::Borrowed(key), delta, noreply))
}

/// Parse `touch <key> <exptime> [noreply]`
fn parse_touch<'a>(
    mut parts: impl Iterator<Item = &'a [u8]>,
) -> Result<Command<'a>, ProtocolError> {
    let key = next_key(&mut parts)?;
    let exptime = parts
        .next()
        .and_then(parse_i64)
        .ok_or(ProtocolError::InvalidExptime)?;
    let noreply = is_noreply(parts.next());
    Ok(Command::Touch {
        key: Cow::Borrowed(key),
        exptime,
        noreply,
    })
}

/// Parse `flush_all [delay] [noreply]`
fn parse_flush_all<'a>(
    mut parts: impl Iterator<Item = &'a [u8]>,
) -> Result<Command<'a>, ProtocolError> {
    let (delay, noreply) = match parts.next() {
        None => (0, false),
        Some(b"noreply") => (0, true),
        Some(part) => {
            let delay = parse_u64(part).ok_or(ProtocolError::BadCommandLine)?;
            (delay, is_noreply(parts.next()))
        }
    };
    Ok(Command::FlushAll { delay, noreply })
}

/// Parse bytes as u32
fn parse_u32(bytes: &[u8]) -> Option<u32> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Parse bytes as u64
fn parse_u64(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Parse bytes as i64
fn parse_i64(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// Parse bytes as usize
fn parse_usize(bytes: &[u8]) -> Option<usize> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
