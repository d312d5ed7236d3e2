//! Background maintenance for the SQLite key-value store.
//!
//! Expired rows already read as absent; this only reclaims their space.

use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use coinpulse_storage_sqlite::SqliteKvStore;

/// Prune interval: 15 minutes
const PRUNE_INTERVAL_SECS: u64 = 15 * 60;

/// Initial delay before the first prune, so startup traffic goes first.
const INITIAL_DELAY_SECS: u64 = 60;

pub fn start_kv_prune_scheduler(store: Arc<SqliteKvStore>) {
    tokio::spawn(async move {
        info!("Key-value prune scheduler started (15-minute interval)");

        tokio::time::sleep(Duration::from_secs(INITIAL_DELAY_SECS)).await;

        let mut prune_interval = interval(Duration::from_secs(PRUNE_INTERVAL_SECS));
        loop {
            prune_interval.tick().await;
            match store.prune_expired().await {
                Ok(0) => debug!("Scheduled prune found no expired entries"),
                Ok(pruned) => info!("Scheduled prune removed {} expired entries", pruned),
                Err(e) => warn!("Scheduled prune failed: {}", e),
            }
        }
    });
}
