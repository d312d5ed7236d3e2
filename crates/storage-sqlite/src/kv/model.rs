//! Database model for key-value entries.

use diesel::prelude::*;

/// Row of `kv_entries`. Timestamps are epoch milliseconds.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq)]
#[diesel(table_name = crate::schema::kv_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct KvEntryDB {
    pub key: String,
    pub value: String,
    pub expires_at: Option<i64>,
    pub updated_at: i64,
}

impl KvEntryDB {
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now_ms)
    }
}
