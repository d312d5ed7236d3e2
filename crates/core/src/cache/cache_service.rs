//! Response cache over the key-value layer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use coinpulse_upstream::{Clock, ResourceKey, SystemClock};
use log::{debug, warn};
use serde_json::Value;

use super::cache_model::{CacheEntry, Provenance, DEFAULT_STALE_RETENTION};
use crate::errors::Result;
use crate::kv::KeyValueStore;

/// Key prefix for cached responses.
pub const CACHE_KEY_PREFIX: &str = "cache:";

/// Stores upstream payloads keyed by resource.
///
/// Entries are kept for `stale_retention` past their TTL so they can serve as
/// a last-known-good fallback. The cache itself does not judge provenance;
/// reads that reach clients go through [`LegacySentinel`](crate::sentinel::LegacySentinel).
pub struct ResponseCache {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    stale_retention: Duration,
}

impl ResponseCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            clock: Arc::new(SystemClock),
            stale_retention: DEFAULT_STALE_RETENTION,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_stale_retention(mut self, stale_retention: Duration) -> Self {
        self.stale_retention = stale_retention;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn storage_key(key: &ResourceKey) -> String {
        format!("{}{}", CACHE_KEY_PREFIX, key)
    }

    /// Read the raw entry for `key`, whatever its provenance or age.
    ///
    /// A stored value that does not parse is deleted and reported as a miss.
    pub async fn read(&self, key: &ResourceKey) -> Result<Option<CacheEntry>> {
        let storage_key = Self::storage_key(key);
        let Some(raw) = self.kv.get(&storage_key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!("Dropping malformed cache entry for '{}': {}", key, e);
                if let Err(e) = self.kv.delete(&storage_key).await {
                    warn!("Failed to delete malformed cache entry '{}': {}", key, e);
                }
                Ok(None)
            }
        }
    }

    /// Store a freshly fetched payload. Writes are always tagged current.
    pub async fn write(
        &self,
        key: &ResourceKey,
        payload: Value,
        source: &str,
        ttl: Duration,
    ) -> Result<CacheEntry> {
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            source: source.to_string(),
            provenance: Provenance::Current,
            fetched_at: self.clock.now(),
            ttl_seconds: ttl.as_secs(),
        };

        let raw = serde_json::to_string(&entry)?;
        self.kv
            .put(
                &Self::storage_key(key),
                raw,
                Some(ttl.saturating_add(self.stale_retention)),
            )
            .await?;

        debug!("Cached '{}' from {} (ttl {:?})", key, source, ttl);
        Ok(entry)
    }

    /// Remove the entry for `key`. Returns whether one existed.
    pub async fn delete(&self, key: &ResourceKey) -> Result<bool> {
        self.kv.delete(&Self::storage_key(key)).await
    }

    /// Whether `entry` is within `ttl` at `now`.
    pub fn is_fresh(entry: &CacheEntry, ttl: Duration, now: DateTime<Utc>) -> bool {
        entry.is_fresh(ttl, now)
    }
}
