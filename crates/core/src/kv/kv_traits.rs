use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;

/// Persistent get/put/delete of string values.
///
/// Implementations treat an expired value as absent. Writes to a single key
/// are atomic; concurrent writers to the same key are last-write-wins.
///
/// Callers bound these calls with `tokio::time::timeout`, which only fires
/// when the future yields. Implementations must not block the runtime
/// thread while waiting on I/O or a connection.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, expiring after `ttl` when given.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()>;

    /// Remove `key`. Returns whether a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Cheap reachability check for health reporting.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
