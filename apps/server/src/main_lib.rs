use std::sync::Arc;

use crate::{
    auth::AdminAuth,
    config::{Config, StorageBackend},
    scheduler,
};
use coinpulse_core::{
    backoff::KvBackoffStore,
    cache::ResponseCache,
    kv::{InMemoryKvStore, KeyValueStore},
    resources::{ResourceCatalog, ResourceService, ResourceServiceTrait},
    sentinel::LegacySentinel,
};
use coinpulse_storage_sqlite::{db, SqliteKvStore};
use coinpulse_upstream::{FetchCoordinator, HttpTransport, ReqwestTransport};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub struct AppState {
    pub resource_service: Arc<dyn ResourceServiceTrait>,
    pub kv_store: Arc<dyn KeyValueStore>,
    pub admin_auth: Option<Arc<AdminAuth>>,
    pub storage: StorageBackend,
}

pub fn init_tracing() {
    let log_format = std::env::var("CP_LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("text") {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    } else {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let transport = ReqwestTransport::new(config.retry_policy.attempt_timeout);
    build_state_with_transport(config, Arc::new(transport)).await
}

/// Wire the service graph over the given transport.
pub async fn build_state_with_transport(
    config: &Config,
    transport: Arc<dyn HttpTransport>,
) -> anyhow::Result<Arc<AppState>> {
    let kv_store: Arc<dyn KeyValueStore> = match config.storage {
        StorageBackend::Sqlite => {
            let db_path = db::init(&config.db_path)?;
            tracing::info!("Database path in use: {}", db_path);
            let pool = db::create_pool(&db_path)?;
            db::run_migrations(&pool)?;
            let writer = db::spawn_writer(pool.clone());

            let store = Arc::new(SqliteKvStore::new(pool, writer));
            scheduler::start_kv_prune_scheduler(store.clone());
            store
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; cache and cooldowns are lost on restart");
            Arc::new(InMemoryKvStore::new())
        }
    };

    config.endpoints.validate()?;
    let catalog = ResourceCatalog::new(
        &config.tracked_coins,
        &config.vs_currencies,
        config.history_days.clone(),
        &config.news_categories,
    )?;

    let backoff = Arc::new(KvBackoffStore::new(kv_store.clone()));
    let coordinator = Arc::new(
        FetchCoordinator::new(transport, backoff).with_policy(config.retry_policy.clone()),
    );
    let cache = Arc::new(
        ResponseCache::new(kv_store.clone())
            .with_stale_retention(config.cache_policy.stale_retention),
    );
    let sentinel = Arc::new(LegacySentinel::new(
        cache.clone(),
        &config.retired_sources,
    ));

    let resource_service: Arc<dyn ResourceServiceTrait> = Arc::new(ResourceService::new(
        coordinator,
        cache,
        sentinel,
        config.endpoints.clone(),
        catalog,
        config.cache_policy.clone(),
    ));

    if config.admin_token.is_none() {
        tracing::info!("CP_ADMIN_TOKEN not set; admin routes are disabled");
    }
    let admin_auth = config
        .admin_token
        .as_deref()
        .map(|token| Arc::new(AdminAuth::new(token)));

    Ok(Arc::new(AppState {
        resource_service,
        kv_store,
        admin_auth,
        storage: config.storage,
    }))
}
