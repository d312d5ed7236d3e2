use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use coinpulse_core::resources::{Resource, Served};
use serde::Deserialize;

pub const CACHE_STATUS_HEADER: &str = "x-cache-status";

/// A served resource plus its `x-cache-status` header.
pub struct ServedResponse(Served);

impl IntoResponse for ServedResponse {
    fn into_response(self) -> Response {
        let status = self.0.cache_status;
        let mut response = Json(self.0).into_response();
        response.headers_mut().insert(
            CACHE_STATUS_HEADER,
            HeaderValue::from_static(status.as_str()),
        );
        response
    }
}

#[derive(Deserialize)]
struct PriceQuery {
    vs: Option<String>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    vs: Option<String>,
    days: Option<String>,
}

#[derive(Deserialize)]
struct NewsQuery {
    categories: Option<String>,
}

async fn serve(state: &AppState, resource: Resource) -> ApiResult<ServedResponse> {
    let served = state.resource_service.get(&resource).await?;
    Ok(ServedResponse(served))
}

async fn get_price(
    Path(coin): Path<String>,
    Query(query): Query<PriceQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<ServedResponse> {
    let resource = state
        .resource_service
        .catalog()
        .price(&coin, query.vs.as_deref())?;
    serve(&state, resource).await
}

async fn get_history(
    Path(coin): Path<String>,
    Query(query): Query<HistoryQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<ServedResponse> {
    let days = query
        .days
        .as_deref()
        .map(|raw| {
            raw.trim()
                .parse::<u32>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid days value '{}'", raw)))
        })
        .transpose()?;

    let resource = state
        .resource_service
        .catalog()
        .history(&coin, query.vs.as_deref(), days)?;
    serve(&state, resource).await
}

async fn get_news(
    Query(query): Query<NewsQuery>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<ServedResponse> {
    let resource = state
        .resource_service
        .catalog()
        .news(query.categories.as_deref())?;
    serve(&state, resource).await
}

async fn get_sentiment(State(state): State<Arc<AppState>>) -> ApiResult<ServedResponse> {
    let resource = state.resource_service.catalog().sentiment();
    serve(&state, resource).await
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/prices/{coin}", get(get_price))
        .route("/history/{coin}", get(get_history))
        .route("/news", get(get_news))
        .route("/sentiment", get(get_sentiment))
}
