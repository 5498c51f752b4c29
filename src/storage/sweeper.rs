//! Background expiry sweep
//!
//! Lazy expiration only reclaims entries that are read again or that sit at
//! the cold end of the LRU. The sweeper walks the recency index a bounded
//! slice at a time, one slice per tick, so that memory held by abandoned keys
//! is returned without holding the store lock for a full scan.

use crate::storage::EntryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Spawn the sweeper. It stops when `cancel_token` is cancelled.
pub fn spawn_sweeper(
    store: Arc<EntryStore>,
    interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting expiry sweeper with interval of {:?}", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    break;
                }
                _ = ticker.tick() => {
                    // lock is taken and released inside purge_expired
                    let removed = store.purge_expired();
                    if removed > 0 {
                        info!("Expiry sweep: removed {} expired entries", removed);
                    } else {
                        debug!("Expiry sweep: no expired entries found");
                    }
                }
            }
        }

        info!("Expiry sweeper stopped");
    })
}
