//! Backoff store persisted through the key-value layer.
//!
//! Cooldowns written here outlive the process, so a throttled resource stays
//! gated across restarts and across instances sharing the same store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use coinpulse_upstream::{BackoffStore, BackoffStoreError, Clock, ResourceKey, SystemClock};
use log::debug;

use crate::kv::KeyValueStore;

/// Key prefix for cooldown records.
pub const BACKOFF_KEY_PREFIX: &str = "backoff:";

/// How long a record outlives its cooldown before the store drops it.
const RECORD_GRACE: Duration = Duration::from_secs(60);

/// [`BackoffStore`] over any [`KeyValueStore`].
///
/// Records are stored as epoch milliseconds under `backoff:{resource_key}`
/// with a store TTL slightly past the cooldown, so they expire on their own.
pub struct KvBackoffStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl KvBackoffStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn storage_key(key: &ResourceKey) -> String {
        format!("{}{}", BACKOFF_KEY_PREFIX, key)
    }
}

#[async_trait]
impl BackoffStore for KvBackoffStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<DateTime<Utc>>, BackoffStoreError> {
        let raw = self
            .kv
            .get(&Self::storage_key(key))
            .await
            .map_err(|e| BackoffStoreError(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let millis: i64 = raw.trim().parse().map_err(|_| {
            BackoffStoreError(format!("malformed cooldown record for '{}': {}", key, raw))
        })?;

        match Utc.timestamp_millis_opt(millis).single() {
            Some(until) => Ok(Some(until)),
            None => Err(BackoffStoreError(format!(
                "cooldown record for '{}' is out of range: {}",
                key, millis
            ))),
        }
    }

    async fn set(&self, key: &ResourceKey, until: DateTime<Utc>) -> Result<(), BackoffStoreError> {
        let remaining = (until - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        debug!("Persisting cooldown for '{}' until {}", key, until);

        self.kv
            .put(
                &Self::storage_key(key),
                until.timestamp_millis().to_string(),
                Some(remaining + RECORD_GRACE),
            )
            .await
            .map_err(|e| BackoffStoreError(e.to_string()))
    }
}
