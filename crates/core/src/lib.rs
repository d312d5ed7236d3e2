//! CoinPulse Core - caching, provenance and resource orchestration.
//!
//! This crate sits between the HTTP layer and the upstream coordinator.
//! It is storage-agnostic: persistence goes through the [`kv::KeyValueStore`]
//! trait, implemented durably by the `storage-sqlite` crate.

pub mod backoff;
pub mod cache;
pub mod errors;
pub mod kv;
pub mod resources;
pub mod sentinel;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
