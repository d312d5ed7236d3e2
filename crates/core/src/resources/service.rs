//! Resource service: cache-first serving with stale fallback.
//!
//! Per request:
//! 1. Sentinel-filtered cache read; a fresh current entry is returned as `fresh`
//! 2. Otherwise fetch through the coordinator, validate, cache, return as `miss`
//! 3. On upstream failure (invalid payloads included), a current entry of any
//!    age is returned as `stale-if-error`; without one the typed error propagates

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coinpulse_upstream::{FetchCoordinator, ResourceKey};
use log::{debug, warn};

use super::catalog::ResourceCatalog;
use super::endpoints::ProviderEndpoints;
use super::resources_model::{Resource, Served};
use crate::cache::{CacheEntry, CachePolicy, CacheStatus, ResponseCache};
use crate::errors::{Error, Result};
use crate::sentinel::{LegacySentinel, Lookup, PurgeReport};

/// Point-in-time counters for health reporting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub inflight_fetches: usize,
    pub legacy_evictions: u64,
}

#[async_trait]
pub trait ResourceServiceTrait: Send + Sync {
    fn catalog(&self) -> &ResourceCatalog;

    /// Serve `resource`, from cache when possible.
    async fn get(&self, resource: &Resource) -> Result<Served>;

    /// Delete legacy entries under every catalogued key.
    async fn purge_legacy(&self) -> Result<PurgeReport>;

    fn stats(&self) -> ServiceStats;
}

pub struct ResourceService {
    coordinator: Arc<FetchCoordinator>,
    cache: Arc<ResponseCache>,
    sentinel: Arc<LegacySentinel>,
    endpoints: ProviderEndpoints,
    catalog: ResourceCatalog,
    cache_policy: CachePolicy,
}

impl ResourceService {
    pub fn new(
        coordinator: Arc<FetchCoordinator>,
        cache: Arc<ResponseCache>,
        sentinel: Arc<LegacySentinel>,
        endpoints: ProviderEndpoints,
        catalog: ResourceCatalog,
        cache_policy: CachePolicy,
    ) -> Self {
        Self {
            coordinator,
            cache,
            sentinel,
            endpoints,
            catalog,
            cache_policy,
        }
    }

    async fn fetch_and_store(
        &self,
        resource: &Resource,
        key: &ResourceKey,
        ttl: Duration,
    ) -> Result<Served> {
        let request = resource.request(&self.endpoints)?;
        let outcome = self.coordinator.fetch(request).await?;

        let data = resource
            .parse_payload(&outcome.body)
            .map_err(|message| Error::invalid_payload(key.as_str(), message))?;

        let fetched_at = match self
            .cache
            .write(key, data.clone(), resource.source(), ttl)
            .await
        {
            Ok(entry) => entry.fetched_at,
            Err(e) => {
                warn!("Failed to cache '{}', serving uncached: {}", key, e);
                self.cache.now()
            }
        };

        Ok(Served {
            data,
            source: resource.source().to_string(),
            fetched_at,
            cache_status: CacheStatus::Miss,
        })
    }

    async fn fallback(&self, key: &ResourceKey, ttl: Duration, error: Error) -> Result<Served> {
        match self.sentinel.lookup(key, ttl).await {
            // Written by a concurrent caller since the first read.
            Ok(Lookup::Fresh(entry)) => Ok(served_from(entry, CacheStatus::Fresh)),
            Ok(Lookup::Stale(entry)) => {
                warn!(
                    "Serving stale '{}' (fetched {}) after upstream failure: {}",
                    key, entry.fetched_at, error
                );
                Ok(served_from(entry, CacheStatus::StaleIfError))
            }
            Ok(Lookup::Miss) => Err(error),
            Err(e) => {
                warn!("Fallback cache read for '{}' failed: {}", key, e);
                Err(error)
            }
        }
    }
}

#[async_trait]
impl ResourceServiceTrait for ResourceService {
    fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    async fn get(&self, resource: &Resource) -> Result<Served> {
        let key = resource.resource_key()?;
        let ttl = resource.ttl(&self.cache_policy);

        match self.sentinel.lookup(&key, ttl).await {
            Ok(Lookup::Fresh(entry)) => {
                debug!("Cache hit for '{}'", key);
                return Ok(served_from(entry, CacheStatus::Fresh));
            }
            Ok(_) => {}
            Err(e) => warn!("Cache read for '{}' failed, fetching upstream: {}", key, e),
        }

        match self.fetch_and_store(resource, &key, ttl).await {
            Ok(served) => Ok(served),
            Err(error) if error.allows_stale_fallback() => self.fallback(&key, ttl, error).await,
            Err(error) => Err(error),
        }
    }

    async fn purge_legacy(&self) -> Result<PurgeReport> {
        let keys = self.catalog.keys()?;
        Ok(self.sentinel.sweep(&keys).await)
    }

    fn stats(&self) -> ServiceStats {
        ServiceStats {
            inflight_fetches: self.coordinator.inflight_count(),
            legacy_evictions: self.sentinel.evictions(),
        }
    }
}

fn served_from(entry: CacheEntry, cache_status: CacheStatus) -> Served {
    Served {
        data: entry.payload,
        source: entry.source,
        fetched_at: entry.fetched_at,
        cache_status,
    }
}
