use lawcast_server::api::{self, AppState};
use lawcast_server::config::ServerConfig;
use std::sync::Arc;

mod common;

struct TestApi {
    base_url: String,
    client: reqwest::Client,
    harness: common::TestHarness,
}

async fn spawn_api() -> TestApi {
    let harness = common::TestHarness::new().await;
    let state = AppState {
        webhook_service: harness.webhook_service(common::MockVerifier::accepting(), 100),
        cache: harness.cache.clone(),
        executor: harness.executor.clone(),
        cache_store: Arc::clone(&harness.store),
    };
    let server = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        frontend_url: None,
        shutdown_timeout_secs: 25,
    };
    let router = api::app_router(state, &server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    TestApi { base_url: format!("http://{addr}"), client: reqwest::Client::new(), harness }
}

#[tokio::test]
async fn health_reports_cache_connectivity() {
    let api = spawn_api().await;
    let response = api.client.get(format!("{}/api/health", api.base_url)).send().await.expect("request");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["cache"], "connected");
    assert!(body["data"]["timestamp"].is_string());
}

#[tokio::test]
async fn recent_notices_come_from_the_cache() {
    let api = spawn_api().await;
    api.harness.cache.initialize(common::notices(&[102, 101])).await.expect("seed cache");

    let response = api.client.get(format!("{}/api/notices/recent", api.base_url)).send().await.expect("request");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(body["data"]["notices"][0]["num"], 102);
    assert!(body["data"]["notices"][0]["proposerCategory"].is_string());
}

#[tokio::test]
async fn register_webhook_end_to_end() {
    let api = spawn_api().await;
    let url = common::webhook_url(1);

    let response = api
        .client
        .post(format!("{}/api/webhooks", api.base_url))
        .json(&serde_json::json!({ "url": url, "recaptchaToken": "token" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 201);

    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["url"], url);
    assert_eq!(body["testResult"]["success"], true);

    // Same URL again conflicts.
    let duplicate = api
        .client
        .post(format!("{}/api/webhooks", api.base_url))
        .json(&serde_json::json!({ "url": url, "recaptchaToken": "token" }))
        .send()
        .await
        .expect("request");
    assert_eq!(duplicate.status(), 409);
    let body: serde_json::Value = duplicate.json().await.expect("json");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn register_rejects_invalid_shape_with_400() {
    let api = spawn_api().await;
    let response = api
        .client
        .post(format!("{}/api/webhooks", api.base_url))
        .json(&serde_json::json!({ "url": "https://example.com/hook", "recaptchaToken": "token" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn stats_combine_webhooks_cache_and_batches() {
    let api = spawn_api().await;
    api.harness.register_endpoints(2).await;
    api.harness.cache.initialize(common::notices(&[101])).await.expect("seed cache");

    let response = api.client.get(format!("{}/api/stats", api.base_url)).send().await.expect("request");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["data"]["webhooks"]["total"], 2);
    assert_eq!(body["data"]["webhooks"]["active"], 2);
    assert_eq!(body["data"]["cache"]["size"], 1);
    assert_eq!(body["data"]["cache"]["isInitialized"], true);
    assert_eq!(body["data"]["batchProcessing"]["jobCount"], 0);
}

#[tokio::test]
async fn batch_status_exposes_executor_state() {
    let api = spawn_api().await;
    let response = api.client.get(format!("{}/api/batch/status", api.base_url)).send().await.expect("request");
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["data"]["shuttingDown"], false);
    assert!(body["data"]["activeJobs"].is_array());
}

#[tokio::test]
async fn detailed_stats_and_system_health() {
    let api = spawn_api().await;
    api.harness.register_endpoints(1).await;

    let response =
        api.client.get(format!("{}/api/webhooks/stats/detailed", api.base_url)).send().await.expect("request");
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["data"]["stats"]["total"], 1);
    assert_eq!(body["data"]["efficiency"], 100.0);

    let response =
        api.client.get(format!("{}/api/webhooks/system-health", api.base_url)).send().await.expect("request");
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["grade"], "excellent");
}
