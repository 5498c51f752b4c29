//! Command handlers for memcached protocol commands

use super::Shared;
use crate::protocol::{Command, ResponseWriter, StoreMode};
use crate::{ProtocolError, StoreError};
use bytes::Bytes;
use std::borrow::Cow;
use tracing::trace;

/// Execute a parsed command, appending its reply to `response`
pub(crate) fn execute(shared: &Shared, cmd: Command<'_>, response: &mut ResponseWriter) {
    let _timer = shared.metrics.cmd_latency.start_timer();
    let noreply = cmd.is_noreply();
    let mark = response.len();

    match cmd {
        Command::Get { keys } => {
            shared.metrics.cmd_get.inc();
            handle_get(shared, &keys, false, response);
        }
        Command::Gets { keys } => {
            shared.metrics.cmd_get.inc();
            handle_get(shared, &keys, true, response);
        }
        Command::Store {
            mode,
            key,
            flags,
            exptime,
            data,
            ..
        } => {
            trace!(command = mode.as_str(), bytes = data.len(), "Storage command");
            handle_store(shared, mode, &key, flags, exptime, &data, response);
        }
        Command::Delete { key, .. } => {
            shared.metrics.cmd_delete.inc();
            match shared.store.delete(&key) {
                Ok(()) => response.deleted(),
                Err(e) => not_found_or_error(shared, e, response),
            }
        }
        Command::Incr { key, delta, .. } => {
            shared.metrics.cmd_incr.inc();
            match shared.store.incr(&key, delta) {
                Ok(value) => response.number(value),
                Err(e) => not_found_or_error(shared, e, response),
            }
        }
        Command::Decr { key, delta, .. } => {
            shared.metrics.cmd_decr.inc();
            match shared.store.decr(&key, delta) {
                Ok(value) => response.number(value),
                Err(e) => not_found_or_error(shared, e, response),
            }
        }
        Command::Touch { key, exptime, .. } => {
            shared.metrics.cmd_touch.inc();
            match shared.store.touch(&key, exptime) {
                Ok(()) => response.touched(),
                Err(e) => not_found_or_error(shared, e, response),
            }
        }
        Command::FlushAll { delay, .. } => {
            shared.metrics.cmd_flush.inc();
            shared.store.flush_all(delay);
            response.ok();
        }
        Command::Version => {
            response.version(concat!("lrucached ", env!("CARGO_PKG_VERSION")));
        }
        Command::Quit => {
            // Handled in connection loop
        }
    }

    if noreply {
        response.truncate(mark);
    }
}

/// Write the reply for a request that failed to parse
pub(crate) fn protocol_error(err: &ProtocolError, response: &mut ResponseWriter) {
    match err {
        ProtocolError::UnknownCommand(_) => response.error(),
        ProtocolError::ValueTooLarge => response.server_error(&err.to_string()),
        _ => response.client_error(&err.to_string()),
    }
}

fn handle_get(
    shared: &Shared,
    keys: &[Cow<'_, [u8]>],
    with_cas: bool,
    response: &mut ResponseWriter,
) {
    let entries = shared.store.get_multi(keys);
    for (key, entry) in keys.iter().zip(entries) {
        let Some(entry) = entry else { continue };
        if with_cas {
            // compare-and-swap is not supported, every item reports 0
            response.value_with_cas(key, entry.flags, &entry.value, 0);
        } else {
            response.value(key, entry.flags, &entry.value);
        }
    }
    response.end();
}

fn handle_store(
    shared: &Shared,
    mode: StoreMode,
    key: &[u8],
    flags: u32,
    exptime: i64,
    data: &[u8],
    response: &mut ResponseWriter,
) {
    let store = &shared.store;
    let metrics = &shared.metrics;
    let result = match mode {
        StoreMode::Set => {
            metrics.cmd_set.inc();
            store.set(key, Bytes::copy_from_slice(data), flags, exptime)
        }
        StoreMode::Add => {
            metrics.cmd_add.inc();
            store.add(key, Bytes::copy_from_slice(data), flags, exptime)
        }
        StoreMode::Replace => {
            metrics.cmd_replace.inc();
            store.replace(key, Bytes::copy_from_slice(data), flags, exptime)
        }
        StoreMode::Append => {
            metrics.cmd_append.inc();
            store.append(key, data)
        }
        StoreMode::Prepend => {
            metrics.cmd_prepend.inc();
            store.prepend(key, data)
        }
    };

    match result {
        Ok(()) => response.stored(),
        Err(StoreError::NotFound | StoreError::AlreadyExists) => response.not_stored(),
        Err(e) => store_error(shared, &e, response),
    }
}

fn not_found_or_error(shared: &Shared, err: StoreError, response: &mut ResponseWriter) {
    match err {
        StoreError::NotFound => response.not_found(),
        e => store_error(shared, &e, response),
    }
}

fn store_error(shared: &Shared, err: &StoreError, response: &mut ResponseWriter) {
    shared.metrics.storage_errors.inc();
    match err {
        StoreError::NotNumeric => response.client_error(&err.to_string()),
        StoreError::OutOfMemory { .. } => response.server_error("out of memory storing object"),
        _ => response.server_error(&err.to_string()),
    }
}
