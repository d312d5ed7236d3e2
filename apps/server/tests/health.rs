use axum::{
    body::{to_bytes, Body},
    http::Request,
};
use coinpulse_server::{
    api::app_router,
    build_state,
    config::{Config, StorageBackend},
};
use tempfile::tempdir;
use tower::ServiceExt;

async fn healthz_json(config: &Config) -> (u16, serde_json::Value) {
    let state = build_state(config).await.unwrap();
    let app = app_router(state, config).unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status().as_u16();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn healthz_reports_sqlite_storage() {
    let tmp = tempdir().unwrap();
    let mut config = Config::from_env().unwrap();
    config.storage = StorageBackend::Sqlite;
    config.db_path = tmp.path().join("test.db").to_string_lossy().to_string();

    let (status, json) = healthz_json(&config).await;

    assert_eq!(status, 200);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"]["backend"], "sqlite");
    assert_eq!(json["storage"]["reachable"], true);
    assert_eq!(json["inflightFetches"], 0);
    assert_eq!(json["legacyEvictions"], 0);
}

#[tokio::test]
async fn healthz_reports_memory_storage() {
    let mut config = Config::from_env().unwrap();
    config.storage = StorageBackend::Memory;

    let (status, json) = healthz_json(&config).await;

    assert_eq!(status, 200);
    assert_eq!(json["storage"]["backend"], "memory");
}
