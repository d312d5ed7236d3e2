//! Backoff store: per-resource cooldown expiry.
//!
//! A cooldown is written when an upstream throttles a resource (HTTP 429) and
//! read before every attempt for that resource. Records expire by timestamp
//! comparison; nothing ever deletes them explicitly.
//!
//! Stores may be remote and unreliable. The coordinator treats every store
//! error as "no active backoff" (fail open), so implementations simply report
//! errors and never block.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use thiserror::Error;

use crate::models::ResourceKey;

/// The backoff store could not be read or written.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Backoff store unavailable: {0}")]
pub struct BackoffStoreError(pub String);

/// Durable get/set of a cooldown expiry per resource key.
#[async_trait]
pub trait BackoffStore: Send + Sync {
    /// Cooldown expiry for `key`, or `None` if no record exists.
    /// An expired record may be returned; callers compare against the clock.
    async fn get(&self, key: &ResourceKey) -> Result<Option<DateTime<Utc>>, BackoffStoreError>;

    /// Record a cooldown for `key`. Last write wins.
    async fn set(&self, key: &ResourceKey, until: DateTime<Utc>) -> Result<(), BackoffStoreError>;
}

/// Process-local backoff store.
///
/// Suitable for tests and single-instance deployments. State is lost on restart.
pub struct InMemoryBackoffStore {
    records: Mutex<HashMap<ResourceKey, DateTime<Utc>>>,
}

impl InMemoryBackoffStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the records mutex, recovering from poison if necessary.
    ///
    /// A poisoned map holds at worst a slightly wrong cooldown.
    fn lock_records(&self) -> MutexGuard<'_, HashMap<ResourceKey, DateTime<Utc>>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            warn!("Backoff store mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Number of records held, expired ones included.
    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBackoffStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackoffStore for InMemoryBackoffStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<DateTime<Utc>>, BackoffStoreError> {
        Ok(self.lock_records().get(key).copied())
    }

    async fn set(&self, key: &ResourceKey, until: DateTime<Utc>) -> Result<(), BackoffStoreError> {
        self.lock_records().insert(key.clone(), until);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> ResourceKey {
        ResourceKey::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = InMemoryBackoffStore::new();
        assert_eq!(store.get(&key("price:bitcoin")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let store = InMemoryBackoffStore::new();
        let until = Utc::now() + chrono::Duration::seconds(5);

        store.set(&key("price:bitcoin"), until).await.unwrap();

        assert_eq!(store.get(&key("price:bitcoin")).await.unwrap(), Some(until));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = InMemoryBackoffStore::new();
        let k = key("price:bitcoin");
        let later = Utc::now() + chrono::Duration::seconds(30);
        let sooner = Utc::now() + chrono::Duration::seconds(2);

        store.set(&k, later).await.unwrap();
        store.set(&k, sooner).await.unwrap();

        assert_eq!(store.get(&k).await.unwrap(), Some(sooner));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let store = InMemoryBackoffStore::new();
        store
            .set(&key("price:bitcoin"), Utc::now() + chrono::Duration::seconds(5))
            .await
            .unwrap();

        assert_eq!(store.get(&key("price:ethereum")).await.unwrap(), None);
    }
}
