//! In-memory storage for lrucached

mod clock;
mod entry;
mod eviction;
mod store;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{ENTRY_OVERHEAD, Entry, calculate_expires_at, entry_size};
pub use eviction::{LruIndex, LruPolicy, Reclaimed};
pub use store::EntryStore;
pub use sweeper::spawn_sweeper;
