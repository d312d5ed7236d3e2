//! SQLite storage for CoinPulse.
//!
//! This crate holds every Diesel dependency in the workspace. It implements
//! the [`KeyValueStore`](coinpulse_core::kv::KeyValueStore) trait from
//! `coinpulse-core`, so the response cache and the provider backoff state
//! survive restarts.
//!
//! ```text
//!   core (cache, backoff, sentinel)
//!                  │  KeyValueStore
//!                  ▼
//!        storage-sqlite (this crate)
//!                  │
//!                  ▼
//!              SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod kv;
pub mod schema;

// Re-export database utilities
pub use db::{
    create_pool, get_connection, init, run_migrations, spawn_writer, DbConnection, DbPool,
    WriteHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

pub use kv::{KvEntryDB, SqliteKvStore};

// Re-export from coinpulse-core for convenience
pub use coinpulse_core::errors::{Error, Result, StorageFailure};
