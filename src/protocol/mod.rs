//! Memcached ASCII protocol implementation

pub mod command;
pub mod parser;
pub mod response;

pub use command::{
    Command, MAX_KEY_LENGTH, MAX_LINE_LENGTH, MAX_VALUE_LENGTH, StoreMode, is_valid_key,
};
pub use parser::{
    ParseResult, PendingStorageCommand, parse, parse_command_line, parse_storage_data,
};
pub use response::ResponseWriter;
