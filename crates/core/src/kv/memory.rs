use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coinpulse_upstream::{Clock, SystemClock};
use dashmap::DashMap;

use super::KeyValueStore;
use crate::errors::Result;

#[derive(Clone, Debug)]
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-local [`KeyValueStore`] backed by a concurrent map.
///
/// Expired values are dropped lazily on access.
pub struct InMemoryKvStore {
    values: DashMap<String, StoredValue>,
    clock: Arc<dyn Clock>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            values: DashMap::new(),
            clock,
        }
    }

    /// Number of stored values, expired ones included.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn is_live(&self, stored: &StoredValue, now: DateTime<Utc>) -> bool {
        stored.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        if let Some(stored) = self.values.get(key) {
            if self.is_live(&stored, now) {
                return Ok(Some(stored.value.clone()));
            }
        } else {
            return Ok(None);
        }

        self.values
            .remove_if(key, |_, stored| !self.is_live(stored, now));
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        // A TTL too large to represent means no expiry.
        let expires_at = ttl.and_then(|ttl| {
            let ttl = chrono::Duration::from_std(ttl).ok()?;
            self.clock.now().checked_add_signed(ttl)
        });
        self.values
            .insert(key.to_string(), StoredValue { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = self.clock.now();
        Ok(self
            .values
            .remove(key)
            .is_some_and(|(_, stored)| self.is_live(&stored, now)))
    }
}
