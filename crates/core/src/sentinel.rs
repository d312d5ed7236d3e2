//! Legacy-data sentinel.
//!
//! Guards every cache read that can reach a client. An entry whose provenance
//! is legacy (untagged, tagged with anything but `current`, or attributed to a
//! retired provider) is never returned under any freshness condition. It is
//! deleted on sight and the read is treated as a miss.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use coinpulse_upstream::ResourceKey;
use log::{info, warn};
use serde::Serialize;

use crate::cache::{CacheEntry, EntryState, Provenance, ResponseCache};
use crate::errors::Result;

/// Internal signal raised when a legacy entry is encountered and evicted.
///
/// Logged and counted; never surfaced to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyDataEvicted {
    pub key: String,
    pub source: String,
    pub deleted: bool,
}

// Implemented by hand: thiserror treats a field named `source` as the error
// source, which requires it to implement `std::error::Error`.
impl std::fmt::Display for LegacyDataEvicted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Evicted legacy cache entry '{}' (source '{}', deleted: {})",
            self.key, self.source, self.deleted
        )
    }
}

impl std::error::Error for LegacyDataEvicted {}

/// Result of a sentinel-filtered cache read.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    Fresh(CacheEntry),
    Stale(CacheEntry),
    Miss,
}

impl Lookup {
    /// Any usable entry, fresh or stale.
    pub fn into_entry(self) -> Option<CacheEntry> {
        match self {
            Lookup::Fresh(entry) | Lookup::Stale(entry) => Some(entry),
            Lookup::Miss => None,
        }
    }
}

/// Outcome of an administrative legacy purge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub deleted_count: usize,
    pub deleted_keys: Vec<String>,
    pub errors: Vec<String>,
}

pub struct LegacySentinel {
    cache: Arc<ResponseCache>,
    retired_sources: HashSet<String>,
    evictions: AtomicU64,
}

impl LegacySentinel {
    pub fn new<I, S>(cache: Arc<ResponseCache>, retired_sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            cache,
            retired_sources: retired_sources
                .into_iter()
                .map(|s| s.as_ref().trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            evictions: AtomicU64::new(0),
        }
    }

    /// Effective provenance of `entry`: the stored tag, overridden to legacy
    /// when the source is a retired provider.
    pub fn provenance_of(&self, entry: &CacheEntry) -> Provenance {
        if entry.provenance != Provenance::Current
            || self
                .retired_sources
                .contains(&entry.source.trim().to_ascii_lowercase())
        {
            Provenance::Legacy
        } else {
            Provenance::Current
        }
    }

    pub fn classify(&self, entry: &CacheEntry, ttl: Duration, now: DateTime<Utc>) -> EntryState {
        match self.provenance_of(entry) {
            Provenance::Legacy => EntryState::Legacy,
            Provenance::Current if entry.is_fresh(ttl, now) => EntryState::FreshCurrent,
            Provenance::Current => EntryState::StaleCurrent,
        }
    }

    /// Read `key` through the provenance filter.
    ///
    /// Legacy entries are deleted (best effort) and read as [`Lookup::Miss`].
    pub async fn lookup(&self, key: &ResourceKey, ttl: Duration) -> Result<Lookup> {
        let Some(entry) = self.cache.read(key).await? else {
            return Ok(Lookup::Miss);
        };

        match self.classify(&entry, ttl, self.cache.now()) {
            EntryState::FreshCurrent => Ok(Lookup::Fresh(entry)),
            EntryState::StaleCurrent => Ok(Lookup::Stale(entry)),
            EntryState::Legacy => {
                let signal = self.evict(key, &entry).await;
                info!("{}", signal);
                Ok(Lookup::Miss)
            }
        }
    }

    /// Delete every legacy entry among `keys`.
    ///
    /// Idempotent: a second sweep over the same keys deletes nothing. Per-key
    /// failures are collected and do not stop the sweep.
    pub async fn sweep(&self, keys: &[ResourceKey]) -> PurgeReport {
        let mut report = PurgeReport::default();

        for key in keys {
            let entry = match self.cache.read(key).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    report.errors.push(format!("{}: {}", key, e));
                    continue;
                }
            };

            if self.provenance_of(&entry) != Provenance::Legacy {
                continue;
            }

            match self.cache.delete(key).await {
                Ok(true) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    report.deleted_count += 1;
                    report.deleted_keys.push(key.to_string());
                }
                Ok(false) => {}
                Err(e) => report.errors.push(format!("{}: {}", key, e)),
            }
        }

        info!(
            "Legacy purge swept {} key(s): {} deleted, {} error(s)",
            keys.len(),
            report.deleted_count,
            report.errors.len()
        );
        report
    }

    /// Legacy entries evicted since startup.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    async fn evict(&self, key: &ResourceKey, entry: &CacheEntry) -> LegacyDataEvicted {
        let deleted = match self.cache.delete(key).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Failed to delete legacy cache entry '{}': {}", key, e);
                false
            }
        };
        self.evictions.fetch_add(1, Ordering::Relaxed);

        LegacyDataEvicted {
            key: key.to_string(),
            source: entry.source.clone(),
            deleted,
        }
    }
}
