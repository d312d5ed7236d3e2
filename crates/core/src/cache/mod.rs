//! Response cache.
//!
//! - **Models** (`cache_model.rs`) - CacheEntry, Provenance, EntryState, CacheStatus, CachePolicy
//! - **Service** (`cache_service.rs`) - ResponseCache read/write/delete over the KV layer

mod cache_model;
mod cache_service;

pub use cache_model::{
    CacheEntry, CachePolicy, CacheStatus, EntryState, Provenance, DEFAULT_HISTORY_TTL,
    DEFAULT_NEWS_TTL, DEFAULT_PRICE_TTL, DEFAULT_SENTIMENT_TTL, DEFAULT_STALE_RETENTION,
};
pub use cache_service::{ResponseCache, CACHE_KEY_PREFIX};
