use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, Response},
    Router,
};
use coinpulse_server::{
    api::app_router,
    build_state_with_transport,
    config::{Config, StorageBackend},
    AppState,
};
use coinpulse_upstream::testing::{ScriptStep, ScriptedTransport};
use coinpulse_upstream::RetryPolicy;
use tempfile::TempDir;
use tower::ServiceExt;

const BITCOIN_PRICE: &str = r#"{"bitcoin":{"usd":64000.5}}"#;
const ADMIN_TOKEN: &str = "test-admin-token";

struct TestApp {
    app: Router,
    state: Arc<AppState>,
    transport: Arc<ScriptedTransport>,
    _tmp: TempDir,
}

fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::from_env().unwrap();
    config.storage = StorageBackend::Sqlite;
    config.db_path = tmp.path().join("test.db").to_string_lossy().to_string();
    config.cors_allow = vec!["*".to_string()];
    config.admin_token = Some(ADMIN_TOKEN.to_string());
    config.tracked_coins = vec!["bitcoin".to_string(), "ethereum".to_string()];
    config.vs_currencies = vec!["usd".to_string()];
    config.history_days = vec![1, 7, 30];
    config.news_categories = vec![];
    config.retired_sources = vec!["coincap".to_string()];
    config.endpoints = Default::default();
    config.retry_policy = RetryPolicy::default().with_max_attempts(1).without_jitter();
    config
}

async fn build_app(steps: Vec<ScriptStep>, customize: impl FnOnce(&mut Config)) -> TestApp {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(&tmp);
    customize(&mut config);

    let transport = ScriptedTransport::new(steps);
    let state = build_state_with_transport(&config, transport.clone())
        .await
        .unwrap();
    let app = app_router(state.clone(), &config).unwrap();

    TestApp {
        app,
        state,
        transport,
        _tmp: tmp,
    }
}

async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn purge(headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/admin/purge-legacy");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn cache_status(response: &Response<Body>) -> &str {
    response
        .headers()
        .get("x-cache-status")
        .unwrap()
        .to_str()
        .unwrap()
}

async fn store_legacy_price(state: &AppState) {
    let entry = serde_json::json!({
        "key": "price:bitcoin:usd",
        "payload": {"coin": "bitcoin", "vs": "usd", "price": 1.0},
        "source": "coincap",
        "fetchedAt": chrono::Utc::now().to_rfc3339(),
        "ttlSeconds": 60
    });
    state
        .kv_store
        .put("cache:price:bitcoin:usd", entry.to_string(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn price_is_fetched_then_served_fresh() {
    let t = build_app(vec![ScriptStep::ok(BITCOIN_PRICE)], |_| {}).await;

    let first = send(&t.app, get("/api/v1/prices/bitcoin?vs=usd")).await;
    assert_eq!(first.status(), 200);
    assert_eq!(cache_status(&first), "miss");
    let first_json = json_body(first).await;
    assert_eq!(first_json["source"], "coingecko");
    assert_eq!(first_json["cacheStatus"], "miss");
    assert_eq!(first_json["data"]["coin"], "bitcoin");
    assert!(first_json["timestamp"].is_string());

    let second = send(&t.app, get("/api/v1/prices/bitcoin")).await;
    assert_eq!(second.status(), 200);
    assert_eq!(cache_status(&second), "fresh");
    assert_eq!(json_body(second).await["data"], first_json["data"]);

    assert_eq!(t.transport.calls(), 1);
}

#[tokio::test]
async fn stale_price_is_served_when_upstream_fails() {
    let t = build_app(
        vec![ScriptStep::ok(BITCOIN_PRICE), ScriptStep::status(503)],
        |config| config.cache_policy.price_ttl = Duration::ZERO,
    )
    .await;

    let first = send(&t.app, get("/api/v1/prices/bitcoin")).await;
    assert_eq!(cache_status(&first), "miss");
    let first_json = json_body(first).await;

    let second = send(&t.app, get("/api/v1/prices/bitcoin")).await;
    assert_eq!(second.status(), 200);
    assert_eq!(cache_status(&second), "stale-if-error");
    let second_json = json_body(second).await;
    assert_eq!(second_json["cacheStatus"], "stale-if-error");
    assert_eq!(second_json["timestamp"], first_json["timestamp"]);
    assert_eq!(t.transport.calls(), 2);
}

#[tokio::test]
async fn unknown_coin_is_rejected_without_upstream_call() {
    let t = build_app(vec![ScriptStep::ok(BITCOIN_PRICE)], |_| {}).await;

    let response = send(&t.app, get("/api/v1/prices/dogecoin")).await;
    assert_eq!(response.status(), 400);
    let json = json_body(response).await;
    assert_eq!(json["code"], 400);
    assert_eq!(json["kind"], "InvalidRequest");

    let response = send(&t.app, get("/api/v1/history/bitcoin?days=abc")).await;
    assert_eq!(response.status(), 400);

    let response = send(&t.app, get("/api/v1/history/bitcoin?days=90")).await;
    assert_eq!(response.status(), 400);

    assert_eq!(t.transport.calls(), 0);
}

#[tokio::test]
async fn upstream_not_found_maps_to_404() {
    let t = build_app(vec![ScriptStep::status(404)], |_| {}).await;

    let response = send(&t.app, get("/api/v1/prices/ethereum")).await;
    assert_eq!(response.status(), 404);
    let json = json_body(response).await;
    assert_eq!(json["kind"], "UpstreamHttpError");
    assert!(json.get("retryAfterSeconds").is_none());
}

#[tokio::test]
async fn throttling_returns_retry_after_and_gates_later_calls() {
    let t = build_app(vec![ScriptStep::throttled(Some(30))], |_| {}).await;

    let first = send(&t.app, get("/api/v1/sentiment")).await;
    assert_eq!(first.status(), 503);
    assert_eq!(
        first.headers().get(header::RETRY_AFTER).unwrap(),
        "30"
    );
    assert_eq!(json_body(first).await["kind"], "RetriesExhausted");

    let second = send(&t.app, get("/api/v1/sentiment")).await;
    assert_eq!(second.status(), 503);
    let retry_after: u64 = second
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 30);
    let json = json_body(second).await;
    assert_eq!(json["kind"], "BackoffInEffect");
    assert_eq!(json["retryAfterSeconds"], retry_after);

    assert_eq!(t.transport.calls(), 1);
}

#[tokio::test]
async fn legacy_entry_is_never_served() {
    let t = build_app(vec![ScriptStep::status(503)], |_| {}).await;
    store_legacy_price(&t.state).await;

    let response = send(&t.app, get("/api/v1/prices/bitcoin")).await;

    assert_eq!(response.status(), 503);
    assert_eq!(t.transport.calls(), 1);
    assert!(t
        .state
        .kv_store
        .get("cache:price:bitcoin:usd")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn purge_requires_admin_token() {
    let t = build_app(vec![], |_| {}).await;

    let missing = send(&t.app, purge(&[])).await;
    assert_eq!(missing.status(), 401);

    let wrong = send(&t.app, purge(&[("authorization", "Bearer nope")])).await;
    assert_eq!(wrong.status(), 401);

    let wrong_header = send(&t.app, purge(&[("x-admin-token", "nope")])).await;
    assert_eq!(wrong_header.status(), 401);

    let ok = send(&t.app, purge(&[("x-admin-token", ADMIN_TOKEN)])).await;
    assert_eq!(ok.status(), 200);
}

#[tokio::test]
async fn purge_is_hidden_without_configured_token() {
    let t = build_app(vec![], |config| config.admin_token = None).await;

    let bearer = format!("Bearer {}", ADMIN_TOKEN);
    let response = send(&t.app, purge(&[("authorization", bearer.as_str())])).await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn purge_deletes_legacy_entries_once() {
    let t = build_app(vec![], |_| {}).await;
    store_legacy_price(&t.state).await;
    let bearer = format!("Bearer {}", ADMIN_TOKEN);

    let first = send(&t.app, purge(&[("authorization", bearer.as_str())])).await;
    assert_eq!(first.status(), 200);
    let first_json = json_body(first).await;
    assert_eq!(first_json["status"], "ok");
    assert_eq!(first_json["deletedCount"], 1);
    assert_eq!(
        first_json["deletedKeys"],
        serde_json::json!(["price:bitcoin:usd"])
    );
    assert_eq!(first_json["errors"], serde_json::json!([]));
    assert!(first_json["timestamp"].is_string());

    let second = send(&t.app, purge(&[("authorization", bearer.as_str())])).await;
    let second_json = json_body(second).await;
    assert_eq!(second_json["deletedCount"], 0);
    assert_eq!(t.transport.calls(), 0);
}
