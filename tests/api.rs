//! REST API tests, run in-process with axum-test

mod common;

use axum_test::TestServer;
use common::{MOCK_MODEL, MOCK_SOURCE, MockSource};
use devon::api::routes::{AppState, create_router};
use devon::config::{ApiKeyPolicy, Settings};
use devon::download::DownloadManager;
use devon::metrics;
use devon::sources::{ModelSource, SourceRegistry};
use devon::storage::ModelStorage;
use serde_json::{Value, json};
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

const API_KEY: &str = "test-secret";

// Global metrics handle - only initialize once per test process
static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| metrics::setup_metrics().expect("Failed to setup metrics"))
        .clone()
}

struct Harness {
    server: TestServer,
    source: Arc<MockSource>,
    storage: Arc<ModelStorage>,
    _temp_dir: TempDir,
}

async fn create_test_server(api_key: ApiKeyPolicy) -> Harness {
    create_test_server_with(api_key, |_| {}).await
}

async fn create_test_server_with(
    api_key: ApiKeyPolicy,
    configure: impl FnOnce(&mut Settings),
) -> Harness {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let mut settings = Settings::default();
    settings.storage.base_path = temp_dir.path().join("models");
    settings.sources.default = MOCK_SOURCE.to_string();
    settings.sources.enabled = vec![MOCK_SOURCE.to_string()];
    configure(&mut settings);

    let storage = Arc::new(
        ModelStorage::open(settings.storage.base_path.clone())
            .await
            .expect("Failed to open storage"),
    );

    let source = Arc::new(MockSource::new());
    let sources = SourceRegistry::new();
    let shared = source.clone();
    sources.register(
        MOCK_SOURCE,
        Arc::new(move || shared.clone() as Arc<dyn ModelSource>),
    );

    let state = AppState {
        storage: storage.clone(),
        downloads: Arc::new(DownloadManager::new(storage.clone())),
        sources,
        settings: Arc::new(settings),
        api_key,
        hsts: false,
        prometheus_handle: get_metrics_handle(),
    };

    let app = create_router(state);
    let server = TestServer::new(app).expect("Failed to create test server");

    Harness {
        server,
        source,
        storage,
        _temp_dir: temp_dir,
    }
}

async fn open_server() -> Harness {
    create_test_server(ApiKeyPolicy::Disabled).await
}

async fn download_mock(h: &Harness) {
    let response = h
        .server
        .post("/api/v1/downloads")
        .json(&json!({ "model_id": MOCK_MODEL }))
        .await;
    assert_eq!(response.status_code(), 200, "{}", response.text());
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = create_test_server(ApiKeyPolicy::Unconfigured).await;

    let response = h.server.get("/health").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_security_headers() {
    let h = open_server().await;

    let response = h.server.get("/health").await;

    assert_eq!(response.header("x-content-type-options"), "nosniff");
    assert_eq!(response.header("x-frame-options"), "DENY");
    assert_eq!(
        response.header("referrer-policy"),
        "strict-origin-when-cross-origin"
    );
    assert!(
        response
            .headers()
            .get("strict-transport-security")
            .is_none()
    );
}

#[tokio::test]
async fn test_unconfigured_key_returns_503() {
    let h = create_test_server(ApiKeyPolicy::Unconfigured).await;

    let response = h.server.get("/api/v1/models").await;

    assert_eq!(response.status_code(), 503);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("DEVON_API_KEY"));
}

#[tokio::test]
async fn test_bearer_token_required() {
    let h = create_test_server(ApiKeyPolicy::Required(API_KEY.to_string())).await;

    let response = h.server.get("/api/v1/status").await;
    assert_eq!(response.status_code(), 401);
    assert_eq!(response.header("www-authenticate"), "Bearer");

    let response = h
        .server
        .get("/api/v1/status")
        .authorization_bearer("wrong")
        .await;
    assert_eq!(response.status_code(), 401);

    let response = h
        .server
        .get("/api/v1/status")
        .authorization_bearer(API_KEY)
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_list_models_empty() {
    let h = open_server().await;

    let response = h.server.get("/api/v1/models").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["count"], 0);
    assert_eq!(body["models"], json!([]));
}

#[tokio::test]
async fn test_download_then_list_and_get() {
    let h = open_server().await;
    download_mock(&h).await;

    let response = h
        .server
        .get("/api/v1/models")
        .add_query_param("source", MOCK_SOURCE)
        .await;
    let body: Value = response.json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["models"][0]["model_id"], MOCK_MODEL);
    assert_eq!(body["models"][0]["file_count"], 2);

    let response = h
        .server
        .get("/api/v1/models")
        .add_query_param("source", "elsewhere")
        .await;
    let body: Value = response.json();
    assert_eq!(body["count"], 0);

    let response = h.server.get("/api/v1/models/mock/acme/tiny-7b").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["local"]["model_id"], MOCK_MODEL);
    assert_eq!(body["remote"]["parameter_count"], 7);
}

#[tokio::test]
async fn test_download_response_and_idempotency() {
    let h = open_server().await;

    let response = h
        .server
        .post("/api/v1/downloads")
        .json(&json!({
            "model_id": MOCK_MODEL,
            "source": MOCK_SOURCE,
            "include_patterns": ["*.json"]
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["files"], json!(["config.json"]));
    assert_eq!(body["size_bytes"], 16);

    let response = h
        .server
        .post("/api/v1/downloads")
        .json(&json!({ "model_id": MOCK_MODEL }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(h.source.downloads(), 1);

    let response = h
        .server
        .post("/api/v1/downloads")
        .json(&json!({ "model_id": MOCK_MODEL, "force": true }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(h.source.downloads(), 2);
}

#[tokio::test]
async fn test_download_errors_map_to_status_codes() {
    let h = open_server().await;

    let response = h
        .server
        .post("/api/v1/downloads")
        .json(&json!({ "model_id": "nobody/nothing" }))
        .await;
    assert_eq!(response.status_code(), 404);

    let response = h
        .server
        .post("/api/v1/downloads")
        .json(&json!({ "model_id": "../../etc" }))
        .await;
    assert_eq!(response.status_code(), 400);

    let response = h
        .server
        .post("/api/v1/downloads")
        .json(&json!({ "model_id": MOCK_MODEL, "source": "ollama" }))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("ollama"));

    let response = h
        .server
        .post("/api/v1/downloads")
        .json(&json!({ "model_id": MOCK_MODEL, "include_patterns": ["; rm"] }))
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(h.source.downloads(), 0);
}

#[tokio::test]
async fn test_download_respects_quota() {
    let h = create_test_server_with(ApiKeyPolicy::Disabled, |s| {
        s.storage.max_size_gb = Some(1);
    })
    .await;

    let response = h
        .server
        .post("/api/v1/downloads")
        .json(&json!({ "model_id": "other/big-70b" }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("quota"));
    assert_eq!(h.source.downloads(), 0);
}

#[tokio::test]
async fn test_delete_model() {
    let h = open_server().await;
    download_mock(&h).await;
    let path = h.storage.resolve_path(MOCK_SOURCE, MOCK_MODEL).unwrap();
    assert!(path.exists());

    let response = h.server.delete("/api/v1/models/mock/acme/tiny-7b").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["deleted"], true);
    assert!(!path.exists());

    let response = h.server.delete("/api/v1/models/mock/acme/tiny-7b").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_get_unknown_model_is_404() {
    let h = open_server().await;

    let response = h.server.get("/api/v1/models/mock/nobody/nothing").await;

    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_search_with_inline_and_explicit_filters() {
    let h = open_server().await;

    let response = h
        .server
        .get("/api/v1/search")
        .add_query_param("query", "7b")
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["source"], MOCK_SOURCE);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["model_id"], MOCK_MODEL);

    let response = h
        .server
        .get("/api/v1/search")
        .add_query_param("format", "safetensors")
        .await;
    let body: Value = response.json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["model_id"], "other/big-70b");

    let response = h
        .server
        .get("/api/v1/search")
        .add_query_param("limit", "1")
        .await;
    let body: Value = response.json();
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn test_status_reports_per_source_totals() {
    let h = open_server().await;
    download_mock(&h).await;

    let response = h.server.get("/api/v1/status").await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["model_count"], 1);
    assert_eq!(body["total_size_bytes"], 528);
    assert_eq!(body["sources"]["mock"]["count"], 1);
    assert_eq!(body["registered_sources"], json!(["mock"]));
    assert_eq!(body["downloads_in_flight"], 0);
}

#[tokio::test]
async fn test_clean_requires_a_policy() {
    let h = open_server().await;

    let response = h.server.post("/api/v1/clean").json(&json!({})).await;

    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_clean_dry_run_then_all() {
    let h = open_server().await;
    download_mock(&h).await;

    let response = h
        .server
        .post("/api/v1/clean")
        .json(&json!({ "all": true, "dry_run": true }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["dry_run"], true);
    assert_eq!(body["candidates"].as_array().unwrap().len(), 1);
    assert_eq!(body["removed"], json!([]));
    assert!(h.storage.is_present(MOCK_SOURCE, MOCK_MODEL).await);

    let response = h
        .server
        .post("/api/v1/clean")
        .json(&json!({ "unused": true, "days": 30 }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["removed"], json!([]));

    let response = h
        .server
        .post("/api/v1/clean")
        .json(&json!({ "all": true }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["removed"].as_array().unwrap().len(), 1);
    assert_eq!(body["freed_bytes"], 528);
    assert!(!h.storage.is_present(MOCK_SOURCE, MOCK_MODEL).await);
}

#[tokio::test]
async fn test_clean_with_maximum_days_keeps_everything() {
    let h = open_server().await;
    download_mock(&h).await;

    let response = h
        .server
        .post("/api/v1/clean")
        .json(&json!({ "unused": true, "days": u32::MAX }))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["candidates"], json!([]));
    assert_eq!(body["removed"], json!([]));
    assert!(h.storage.is_present(MOCK_SOURCE, MOCK_MODEL).await);
}

#[tokio::test]
async fn test_export_formats() {
    let h = open_server().await;
    download_mock(&h).await;
    let path = h.storage.resolve_path(MOCK_SOURCE, MOCK_MODEL).unwrap();

    let response = h.server.post("/api/v1/export").json(&json!({})).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["format"], "kitt");
    assert_eq!(body["count"], 1);
    assert_eq!(body["content"], json!([path.to_string_lossy()]));

    let response = h
        .server
        .post("/api/v1/export")
        .json(&json!({ "format": "json" }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["content"][0]["model_id"], MOCK_MODEL);
    assert_eq!(body["content"][0]["files"].as_array().unwrap().len(), 2);

    let response = h
        .server
        .post("/api/v1/export")
        .json(&json!({ "format": "yaml" }))
        .await;
    assert_eq!(response.status_code(), 400);

    let entry = h.storage.get_entry(MOCK_SOURCE, MOCK_MODEL).await.unwrap();
    assert!(entry.last_used.is_some());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = open_server().await;
    download_mock(&h).await;

    let response = h.server.get("/metrics").await;

    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("devon_downloads_completed_total"));
}
