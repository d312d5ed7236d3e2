//! Tests for ResourceService serving and fallback behavior.
//!
//! # Contract Points
//!
//! 1. Fresh current entries are served without touching the upstream
//! 2. Upstream failures fall back to a current entry of any age
//! 3. Legacy entries are never served, not even as a fallback
//! 4. Invalid payloads are never cached and count as upstream failures

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use coinpulse_upstream::testing::{ScriptStep, ScriptedTransport};
    use coinpulse_upstream::{Clock, FetchCoordinator, FetchError, RetryPolicy, TokioClock};
    use futures::future::join_all;
    use serde_json::json;

    use crate::backoff::KvBackoffStore;
    use crate::cache::{CachePolicy, CacheStatus, Provenance, ResponseCache};
    use crate::errors::Error;
    use crate::kv::{InMemoryKvStore, KeyValueStore};
    use crate::resources::{
        ProviderEndpoints, Resource, ResourceCatalog, ResourceService, ResourceServiceTrait,
    };
    use crate::sentinel::LegacySentinel;

    const BITCOIN_PRICE: &str = r#"{"bitcoin":{"usd":64000.5}}"#;
    const BITCOIN_PRICE_LATER: &str = r#"{"bitcoin":{"usd":65000}}"#;
    const PRICE_CACHE_KEY: &str = "cache:price:bitcoin:usd";

    struct Fixture {
        service: ResourceService,
        transport: Arc<ScriptedTransport>,
        kv: Arc<InMemoryKvStore>,
        cache: Arc<ResponseCache>,
    }

    fn fixture(steps: Vec<ScriptStep>) -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let kv = Arc::new(InMemoryKvStore::with_clock(clock.clone()));
        let transport = ScriptedTransport::new(steps);

        let backoff = Arc::new(KvBackoffStore::new(kv.clone()).with_clock(clock.clone()));
        let coordinator = Arc::new(
            FetchCoordinator::new(transport.clone(), backoff)
                .with_clock(clock.clone())
                .with_policy(RetryPolicy::default().without_jitter()),
        );
        let cache = Arc::new(ResponseCache::new(kv.clone()).with_clock(clock.clone()));
        let sentinel = Arc::new(LegacySentinel::new(cache.clone(), ["coincap"]));

        let service = ResourceService::new(
            coordinator,
            cache.clone(),
            sentinel,
            ProviderEndpoints::default(),
            ResourceCatalog::default(),
            CachePolicy::default(),
        );

        Fixture {
            service,
            transport,
            kv,
            cache,
        }
    }

    fn bitcoin() -> Resource {
        Resource::Price {
            coin: "bitcoin".to_string(),
            vs: "usd".to_string(),
        }
    }

    async fn store_legacy(kv: &InMemoryKvStore, storage_key: &str, source: &str) {
        let entry = json!({
            "key": storage_key.trim_start_matches("cache:"),
            "payload": {"coin": "bitcoin", "vs": "usd", "price": 1.0},
            "source": source,
            "provenance": "legacy",
            "fetchedAt": Utc::now().to_rfc3339(),
            "ttlSeconds": 60
        });
        kv.put(storage_key, entry.to_string(), None).await.unwrap();
    }

    // =========================================================================
    // Cache hits and misses
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_miss_then_fresh_hit() {
        let f = fixture(vec![ScriptStep::ok(BITCOIN_PRICE)]);

        let first = f.service.get(&bitcoin()).await.unwrap();
        assert_eq!(first.cache_status, CacheStatus::Miss);
        assert_eq!(first.source, "coingecko");
        assert_eq!(first.data["coin"], json!("bitcoin"));

        let second = f.service.get(&bitcoin()).await.unwrap();
        assert_eq!(second.cache_status, CacheStatus::Fresh);
        assert_eq!(second.data, first.data);
        assert_eq!(f.transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refreshed() {
        let f = fixture(vec![
            ScriptStep::ok(BITCOIN_PRICE),
            ScriptStep::ok(BITCOIN_PRICE_LATER),
        ]);

        f.service.get(&bitcoin()).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let refreshed = f.service.get(&bitcoin()).await.unwrap();
        assert_eq!(refreshed.cache_status, CacheStatus::Miss);
        assert_eq!(refreshed.data["price"], json!(65000.0));
        assert_eq!(f.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_upstream_call() {
        let f = fixture(vec![
            ScriptStep::ok(BITCOIN_PRICE).after(Duration::from_millis(100))
        ]);

        let resource = bitcoin();
        let results = join_all((0..8).map(|_| f.service.get(&resource))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(f.transport.calls(), 1);
    }

    // =========================================================================
    // Stale fallback
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_served_on_upstream_failure() {
        let f = fixture(vec![ScriptStep::ok(BITCOIN_PRICE), ScriptStep::status(503)]);

        let original = f.service.get(&bitcoin()).await.unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;

        let served = f.service.get(&bitcoin()).await.unwrap();
        assert_eq!(served.cache_status, CacheStatus::StaleIfError);
        assert_eq!(served.data, original.data);
        assert_eq!(served.fetched_at, original.fetched_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_served_while_backoff_in_effect() {
        let f = fixture(vec![ScriptStep::ok(BITCOIN_PRICE), ScriptStep::throttled(Some(30))]);

        f.service.get(&bitcoin()).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        // Throttled: cooldown persisted, stale served.
        let throttled = f.service.get(&bitcoin()).await.unwrap();
        assert_eq!(throttled.cache_status, CacheStatus::StaleIfError);
        assert_eq!(f.transport.calls(), 2);

        // Within the cooldown: no upstream call at all.
        tokio::time::advance(Duration::from_secs(5)).await;
        let gated = f.service.get(&bitcoin()).await.unwrap();
        assert_eq!(gated.cache_status, CacheStatus::StaleIfError);
        assert_eq!(f.transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_propagates_without_cache() {
        let f = fixture(vec![ScriptStep::status(404)]);

        let err = f.service.get(&bitcoin()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Upstream(FetchError::UpstreamHttpError { status: 404, .. })
        ));
    }

    // =========================================================================
    // Payload validation
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_invalid_payload_is_not_cached() {
        let f = fixture(vec![ScriptStep::ok(r#"{"bitcoin":{"usd":-1}}"#)]);

        let err = f.service.get(&bitcoin()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { .. }));
        assert!(f.kv.get(PRICE_CACHE_KEY).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_payload_falls_back_to_stale() {
        let f = fixture(vec![
            ScriptStep::ok(BITCOIN_PRICE),
            ScriptStep::ok(r#"{"status":{"error_code":429}}"#),
        ]);

        f.service.get(&bitcoin()).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let served = f.service.get(&bitcoin()).await.unwrap();
        assert_eq!(served.cache_status, CacheStatus::StaleIfError);
    }

    // =========================================================================
    // Legacy data
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_legacy_entry_is_refetched_and_replaced() {
        let f = fixture(vec![ScriptStep::ok(BITCOIN_PRICE)]);
        store_legacy(&f.kv, PRICE_CACHE_KEY, "coingecko").await;

        let served = f.service.get(&bitcoin()).await.unwrap();

        assert_eq!(served.cache_status, CacheStatus::Miss);
        assert_eq!(f.transport.calls(), 1);

        let key = bitcoin().resource_key().unwrap();
        let entry = f.cache.read(&key).await.unwrap().unwrap();
        assert_eq!(entry.provenance, Provenance::Current);
        assert_eq!(entry.source, "coingecko");
    }

    #[tokio::test(start_paused = true)]
    async fn test_legacy_entry_is_never_a_fallback() {
        let f = fixture(vec![ScriptStep::status(503)]);
        store_legacy(&f.kv, PRICE_CACHE_KEY, "coincap").await;

        let err = f.service.get(&bitcoin()).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Upstream(FetchError::RetriesExhausted { .. })
        ));
        assert!(f.kv.get(PRICE_CACHE_KEY).await.unwrap().is_none());
        assert_eq!(f.service.stats().legacy_evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_legacy_is_idempotent() {
        let f = fixture(vec![ScriptStep::ok("{}")]);
        store_legacy(&f.kv, PRICE_CACHE_KEY, "coincap").await;
        store_legacy(&f.kv, "cache:history:ethereum:usd:7", "coincap").await;

        let first = f.service.purge_legacy().await.unwrap();
        assert_eq!(first.deleted_count, 2);
        assert!(first.deleted_keys.contains(&"price:bitcoin:usd".to_string()));
        assert!(first.deleted_keys.contains(&"history:ethereum:usd:7".to_string()));

        let second = f.service.purge_legacy().await.unwrap();
        assert_eq!(second.deleted_count, 0);
        assert!(second.deleted_keys.is_empty());
        assert_eq!(f.transport.calls(), 0);
    }
}
