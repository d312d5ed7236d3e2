use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use log::debug;
use std::sync::Arc;
use std::time::Duration;

use super::model::KvEntryDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::kv_entries;
use coinpulse_core::errors::Result;
use coinpulse_core::kv::KeyValueStore;

/// [`KeyValueStore`] backed by the `kv_entries` table.
///
/// Reads use the pool; writes go through the single writer actor. Expired
/// rows read as absent and are removed lazily.
pub struct SqliteKvStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteKvStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        SqliteKvStore { pool, writer }
    }

    /// Delete every expired row. Returns the number removed.
    pub async fn prune_expired(&self) -> Result<usize> {
        let now_ms = Utc::now().timestamp_millis();
        let pruned = self
            .writer
            .exec(move |conn| {
                let pruned =
                    diesel::delete(kv_entries::table.filter(kv_entries::expires_at.le(now_ms)))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                Ok(pruned)
            })
            .await?;

        if pruned > 0 {
            debug!("Pruned {} expired key-value entries", pruned);
        }
        Ok(pruned)
    }
}

fn expires_at_ms(now_ms: i64, ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_ms.saturating_add(ttl_ms)
    })
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        // Waiting on the pool blocks the thread, so the read runs off the
        // runtime where a caller's timeout can still fire.
        let pool = Arc::clone(&self.pool);
        let lookup = key.to_string();
        let row = tokio::task::spawn_blocking(move || -> Result<Option<KvEntryDB>> {
            let mut conn = get_connection(&pool)?;
            let row = kv_entries::table
                .find(lookup.as_str())
                .select(KvEntryDB::as_select())
                .first::<KvEntryDB>(&mut conn)
                .optional()
                .map_err(StorageError::from)?;
            Ok(row)
        })
        .await
        .map_err(|e| StorageError::CoreError(format!("Read task failed: {}", e)))??;

        let now_ms = Utc::now().timestamp_millis();
        match row {
            Some(row) if row.is_live(now_ms) => Ok(Some(row.value)),
            Some(_) => {
                let key = key.to_string();
                self.writer
                    .exec(move |conn| {
                        diesel::delete(
                            kv_entries::table
                                .find(key.as_str())
                                .filter(kv_entries::expires_at.le(now_ms)),
                        )
                        .execute(conn)
                        .map_err(StorageError::from)?;
                        Ok(())
                    })
                    .await?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        let row = KvEntryDB {
            key: key.to_string(),
            value,
            expires_at: expires_at_ms(now_ms, ttl),
            updated_at: now_ms,
        };

        self.writer
            .exec(move |conn| {
                diesel::replace_into(kv_entries::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now_ms = Utc::now().timestamp_millis();
        let key = key.to_string();

        self.writer
            .exec(move |conn| {
                let live = diesel::delete(
                    kv_entries::table.find(key.as_str()).filter(
                        kv_entries::expires_at
                            .is_null()
                            .or(kv_entries::expires_at.gt(now_ms)),
                    ),
                )
                .execute(conn)
                .map_err(StorageError::from)?;

                // Whatever is left under the key has expired.
                diesel::delete(kv_entries::table.find(key.as_str()))
                    .execute(conn)
                    .map_err(StorageError::from)?;

                Ok(live > 0)
            })
            .await
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = get_connection(&self.pool)?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .map_err(StorageError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, spawn_writer};
    use tempfile::tempdir;

    /// Store over a fresh migrated database. Keep the temp dir alive for the test.
    fn create_test_store() -> (SqliteKvStore, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test.db");
        let db_path_str = db_path.to_string_lossy().to_string();

        let pool = create_pool(&db_path_str).expect("Failed to create pool");
        run_migrations(&pool).expect("Failed to run migrations");
        let writer = spawn_writer(Arc::clone(&pool));

        (SqliteKvStore::new(pool, writer), temp_dir)
    }

    #[tokio::test]
    async fn test_put_get_and_overwrite() {
        let (store, _temp_dir) = create_test_store();

        assert_eq!(store.get("cache:price:bitcoin:usd").await.unwrap(), None);

        store
            .put("cache:price:bitcoin:usd", "one".to_string(), None)
            .await
            .unwrap();
        store
            .put("cache:price:bitcoin:usd", "two".to_string(), None)
            .await
            .unwrap();

        assert_eq!(
            store.get("cache:price:bitcoin:usd").await.unwrap(),
            Some("two".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let (store, _temp_dir) = create_test_store();
        store
            .put("backoff:coingecko", "1".to_string(), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(store.delete("backoff:coingecko").await.unwrap());
        assert!(!store.delete("backoff:coingecko").await.unwrap());
        assert_eq!(store.get("backoff:coingecko").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_rows_read_as_absent() {
        let (store, _temp_dir) = create_test_store();
        store
            .put("cache:sentiment:fear-greed", "{}".to_string(), Some(Duration::ZERO))
            .await
            .unwrap();

        assert_eq!(store.get("cache:sentiment:fear-greed").await.unwrap(), None);
        // The lazy delete already removed it.
        assert!(!store.delete("cache:sentiment:fear-greed").await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_expired_keeps_live_rows() {
        let (store, _temp_dir) = create_test_store();
        store
            .put("expired:a", "a".to_string(), Some(Duration::ZERO))
            .await
            .unwrap();
        store
            .put("expired:b", "b".to_string(), Some(Duration::ZERO))
            .await
            .unwrap();
        store
            .put("live", "c".to_string(), Some(Duration::from_secs(3600)))
            .await
            .unwrap();
        store.put("forever", "d".to_string(), None).await.unwrap();

        assert_eq!(store.prune_expired().await.unwrap(), 2);
        assert_eq!(store.prune_expired().await.unwrap(), 0);
        assert_eq!(store.get("live").await.unwrap(), Some("c".to_string()));
        assert_eq!(store.get("forever").await.unwrap(), Some("d".to_string()));
    }

    #[tokio::test]
    async fn test_read_waiting_on_pool_can_time_out() {
        let (store, _temp_dir) = create_test_store();
        store.put("cache:price:bitcoin:usd", "1".to_string(), None).await.unwrap();

        let mut held = Vec::new();
        while let Ok(conn) = store.pool.get_timeout(Duration::from_millis(100)) {
            held.push(conn);
        }

        let waited = tokio::time::timeout(
            Duration::from_millis(200),
            store.get("cache:price:bitcoin:usd"),
        )
        .await;
        assert!(waited.is_err());

        drop(held);
        assert_eq!(
            store.get("cache:price:bitcoin:usd").await.unwrap(),
            Some("1".to_string())
        );
    }

    #[tokio::test]
    async fn test_ping_and_huge_ttl() {
        let (store, _temp_dir) = create_test_store();
        store.ping().await.unwrap();

        store
            .put("cache:news:all", "[]".to_string(), Some(Duration::MAX))
            .await
            .unwrap();
        assert_eq!(
            store.get("cache:news:all").await.unwrap(),
            Some("[]".to_string())
        );
    }
}
