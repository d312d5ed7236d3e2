use std::sync::Arc;

use crate::{auth::require_admin_token, error::ApiResult, main_lib::AppState};
use axum::{extract::State, middleware, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use coinpulse_core::sentinel::PurgeReport;
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PurgeResponse {
    status: &'static str,
    #[serde(flatten)]
    report: PurgeReport,
    timestamp: DateTime<Utc>,
}

/// Delete every legacy cache entry under the configured keys.
async fn purge_legacy(State(state): State<Arc<AppState>>) -> ApiResult<Json<PurgeResponse>> {
    let report = state.resource_service.purge_legacy().await?;
    tracing::info!(
        deleted = report.deleted_count,
        errors = report.errors.len(),
        "Legacy purge finished"
    );

    let status = if report.errors.is_empty() { "ok" } else { "partial" };
    Ok(Json(PurgeResponse {
        status,
        report,
        timestamp: Utc::now(),
    }))
}

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/purge-legacy", post(purge_legacy))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}
