use std::sync::Arc;

use crate::{config::StorageBackend, main_lib::AppState};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StorageHealth {
    backend: &'static str,
    reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    storage: StorageHealth,
    inflight_fetches: usize,
    legacy_evictions: u64,
    timestamp: DateTime<Utc>,
}

/// Liveness plus storage reachability. Answers 503 when storage is down.
async fn healthz(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let ping = state.kv_store.ping().await;
    if let Err(e) = &ping {
        tracing::warn!("Health check could not reach storage: {}", e);
    }

    let stats = state.resource_service.stats();
    let reachable = ping.is_ok();
    let storage = StorageHealth {
        backend: match state.storage {
            StorageBackend::Sqlite => "sqlite",
            StorageBackend::Memory => "memory",
        },
        reachable,
        error: ping.err().map(|e| e.to_string()),
    };

    let (status, label) = if reachable {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(HealthResponse {
            status: label,
            storage,
            inflight_fetches: stats.inflight_fetches,
            legacy_evictions: stats.legacy_evictions,
            timestamp: Utc::now(),
        }),
    )
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/healthz", get(healthz))
}
