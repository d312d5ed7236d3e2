//! Key-value persistence primitive.
//!
//! Everything the service persists (cached responses and throttle cooldowns)
//! goes through [`KeyValueStore`]. The durable implementation lives in the
//! `storage-sqlite` crate; [`InMemoryKvStore`] backs tests and ephemeral runs.

mod kv_traits;
mod memory;

pub use kv_traits::KeyValueStore;
pub use memory::InMemoryKvStore;
