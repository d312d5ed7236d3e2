//! Cache domain models.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default time a cached response outlives its TTL as a stale fallback.
pub const DEFAULT_STALE_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(600);
pub const DEFAULT_NEWS_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_SENTIMENT_TTL: Duration = Duration::from_secs(3600);

/// Where a cached payload came from.
///
/// Anything not explicitly tagged `current` deserializes as [`Provenance::Legacy`],
/// so data written before provenance tagging existed is never trusted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Current,
    #[serde(other)]
    Legacy,
}

impl Provenance {
    fn untagged() -> Self {
        Provenance::Legacy
    }
}

/// A cached upstream payload as stored in the key-value layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    #[serde(default)]
    pub source: String,
    #[serde(default = "Provenance::untagged")]
    pub provenance: Provenance,
    pub fetched_at: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    /// Whether the entry is still within `ttl` at `now`.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now < self.fetched_at + ttl,
            Err(_) => true,
        }
    }
}

/// What a read found, once provenance has been checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// Current provenance, within TTL. Served directly.
    FreshCurrent,
    /// Current provenance, past TTL. Usable only as a fallback on upstream failure.
    StaleCurrent,
    /// Decommissioned source. Never served; deleted on sight.
    Legacy,
}

/// How a response was satisfied, reported to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStatus {
    Fresh,
    Miss,
    StaleIfError,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Fresh => "fresh",
            CacheStatus::Miss => "miss",
            CacheStatus::StaleIfError => "stale-if-error",
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Freshness windows per resource family plus the stale retention period.
#[derive(Clone, Debug, PartialEq)]
pub struct CachePolicy {
    pub price_ttl: Duration,
    pub history_ttl: Duration,
    pub news_ttl: Duration,
    pub sentiment_ttl: Duration,
    pub stale_retention: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            price_ttl: DEFAULT_PRICE_TTL,
            history_ttl: DEFAULT_HISTORY_TTL,
            news_ttl: DEFAULT_NEWS_TTL,
            sentiment_ttl: DEFAULT_SENTIMENT_TTL,
            stale_retention: DEFAULT_STALE_RETENTION,
        }
    }
}
