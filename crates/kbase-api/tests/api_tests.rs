//! API Integration Tests
//!
//! All providers are stubs with call counters; no network access is needed.
//!
//! Author: hephaex@gmail.com

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use kbase_api::{create_router, create_router_for_testing, state::AppState};
use kbase_core::{AppConfig, Match, Metadata};
use kbase_rag::testing::{RecordingStore, StubEmbedding, StubLlm};
use kbase_rag::{KnowledgeBase, PipelineConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Stub providers wired into a router
struct TestApp {
    router: Router,
    state: Arc<AppState>,
    embedder: Arc<StubEmbedding>,
    store: Arc<RecordingStore>,
    llm: Arc<StubLlm>,
}

fn test_app_configured(config: AppConfig, store: RecordingStore) -> TestApp {
    let embedder = Arc::new(StubEmbedding::new(64));
    let store = Arc::new(store);
    let llm = Arc::new(StubLlm::new("Replace the seal."));

    let kb = KnowledgeBase::new(
        embedder.clone(),
        store.clone(),
        PipelineConfig::from(&config.rag),
    )
    .with_llm(llm.clone());

    let state = Arc::new(AppState::new(config, Arc::new(kb)));
    TestApp {
        router: create_router(state.clone()),
        state,
        embedder,
        store,
        llm,
    }
}

fn test_app_with(store: RecordingStore) -> TestApp {
    test_app_configured(AppConfig::default(), store)
}

fn test_app() -> TestApp {
    test_app_with(RecordingStore::new(64))
}

fn canned_match() -> Match {
    let mut metadata = Metadata::new();
    metadata.insert("title".to_string(), json!("t"));
    metadata.insert("problem".to_string(), json!("p"));
    metadata.insert("solution".to_string(), json!("s"));
    Match {
        id: "t".to_string(),
        score: 0.9,
        metadata,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_root_liveness() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder().uri("/").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "status": "ok", "service": "kbase" }));
}

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["checks"]["vector_store"], "recording");
    assert_eq!(json["checks"]["llm"], true);
}

#[tokio::test]
async fn test_readiness_after_shutdown_signal() {
    let app = test_app();
    app.state.set_ready(false);

    let (status, json) = send(
        &app.router,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["ready"], false);
}

#[tokio::test]
async fn test_metrics_counts_requests() {
    let app = test_app();

    send(
        &app.router,
        create_json_request("POST", "/query", Some(json!({ "query": "hi" }))),
    )
    .await;

    let (status, json) = send(
        &app.router,
        Request::builder().uri("/metrics").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["uptime_seconds"].is_number());
    assert_eq!(json["total_requests"], 1);
}

#[tokio::test]
async fn test_openapi_document() {
    let app = create_router_for_testing();

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/api-docs/openapi.json")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/ingest"].is_object());
    assert!(json["paths"]["/query"].is_object());
    assert!(json["components"]["schemas"]["RecordInput"]["properties"]["type"].is_object());
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    let app = test_app();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/query")
                .header("Origin", "http://dashboard.local")
                .header("Access-Control-Request-Method", "POST")
                .header("Access-Control-Request-Headers", "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

// =============================================================================
// Ingest API Tests
// =============================================================================

#[tokio::test]
async fn test_ingest_full_record() {
    let app = test_app();

    let (status, json) = send(
        &app.router,
        create_json_request(
            "POST",
            "/ingest",
            Some(json!({
                "title": "T",
                "problem": "p",
                "solution": "s",
                "machine": "m",
                "type": "t",
                "project": "prj"
            })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");
    assert_eq!(json["vector_dim"], 64);

    assert_eq!(app.store.upsert_calls(), 1);
    let metadata = &app.store.upserts()[0].metadata;
    for field in ["title", "problem", "solution", "machine", "type", "project"] {
        assert!(metadata.contains_key(field), "missing {field}");
    }
}

#[tokio::test]
async fn test_ingest_missing_field_short_circuits() {
    let app = test_app();

    let (status, json) = send(
        &app.router,
        create_json_request(
            "POST",
            "/ingest",
            Some(json!({ "title": "T", "problem": "p" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["message"].as_str().unwrap().contains("solution"));
    assert_eq!(app.embedder.calls(), 0);
    assert_eq!(app.store.upsert_calls(), 0);
}

#[tokio::test]
async fn test_ingest_unknown_field_rejected() {
    let app = test_app();

    let (status, json) = send(
        &app.router,
        create_json_request(
            "POST",
            "/ingest",
            Some(json!({ "title": "T", "problem": "p", "solution": "s", "machnie": "m" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(app.embedder.calls(), 0);
}

#[tokio::test]
async fn test_ingest_malformed_json() {
    let app = test_app();

    let request = Request::builder()
        .method("POST")
        .uri("/ingest")
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_ingest_embedding_failure() {
    let app = test_app();
    app.embedder.set_failing(true);

    let (status, json) = send(
        &app.router,
        create_json_request(
            "POST",
            "/ingest",
            Some(json!({ "title": "T", "problem": "p", "solution": "s" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "EMBEDDING_PROVIDER_ERROR");
    assert_eq!(app.store.upsert_calls(), 0);
}

#[tokio::test]
async fn test_ingest_index_failure() {
    let app = test_app();
    app.store.set_failing(true);

    let (status, json) = send(
        &app.router,
        create_json_request(
            "POST",
            "/ingest",
            Some(json!({ "title": "T", "problem": "p", "solution": "s" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "INDEX_PROVIDER_ERROR");
}

#[tokio::test]
async fn test_ingest_body_over_limit() {
    let mut config = AppConfig::default();
    config.server.max_body_size = 256;
    let app = test_app_configured(config, RecordingStore::new(64));

    let (status, json) = send(
        &app.router,
        create_json_request(
            "POST",
            "/ingest",
            Some(json!({ "title": "T", "problem": "p".repeat(1024), "solution": "s" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(app.embedder.calls(), 0);
    assert_eq!(app.store.upsert_calls(), 0);
}

// =============================================================================
// Query API Tests
// =============================================================================

#[tokio::test]
async fn test_query_top_match_answer() {
    let app = test_app_with(RecordingStore::new(64).with_matches(vec![canned_match()]));

    let (status, json) = send(
        &app.router,
        create_json_request("POST", "/query", Some(json!({ "query": "hi" }))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["score"], 0.9);
    let answer = json["answer"].as_str().unwrap();
    assert!(answer.starts_with('t'));
    assert!(answer.contains("Problem: p"));
    assert_eq!(json["matches"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_query_empty_index() {
    let app = test_app();

    let (status, json) = send(
        &app.router,
        create_json_request("POST", "/query", Some(json!({ "query": "anything" }))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "no_match");
    assert!(json["answer"].is_null());
    assert!(json["matches"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ingest_then_query() {
    let app = test_app();

    let (status, _) = send(
        &app.router,
        create_json_request(
            "POST",
            "/ingest",
            Some(json!({ "title": "Pump leak", "problem": "Seal worn", "solution": "Replace seal" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = send(
        &app.router,
        create_json_request(
            "POST",
            "/query",
            Some(json!({ "query": "Pump leak\nSeal worn\nReplace seal", "mode": "matches" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["score"].as_f64().unwrap() >= 0.95);
    assert!(json["answer"].is_null());
    assert_eq!(json["matches"][0]["id"], "pump-leak");
    assert_eq!(json["matches"][0]["metadata"]["solution"], "Replace seal");
}

#[tokio::test]
async fn test_query_invalid_top_k() {
    let app = test_app();

    for top_k in [0, 21] {
        let (status, json) = send(
            &app.router,
            create_json_request(
                "POST",
                "/query",
                Some(json!({ "query": "hi", "top_k": top_k })),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "VALIDATION_ERROR");
    }
    assert_eq!(app.embedder.calls(), 0);
}

#[tokio::test]
async fn test_query_empty_text() {
    let app = test_app();

    let (status, _) = send(
        &app.router,
        create_json_request("POST", "/query", Some(json!({ "query": "   " }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.embedder.calls(), 0);
}

#[tokio::test]
async fn test_query_embedding_failure_skips_search() {
    let app = test_app();
    app.embedder.set_failing(true);

    let (status, json) = send(
        &app.router,
        create_json_request("POST", "/query", Some(json!({ "query": "hi" }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "EMBEDDING_PROVIDER_ERROR");
    assert_eq!(app.store.search_calls(), 0);
}

#[tokio::test]
async fn test_query_synthesize() {
    let app = test_app_with(RecordingStore::new(64).with_matches(vec![canned_match()]));

    let (status, json) = send(
        &app.router,
        create_json_request(
            "POST",
            "/query",
            Some(json!({ "query": "hi", "mode": "synthesize" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["answer"], "Replace the seal.");
    assert_eq!(json["mode"], "synthesize");
    assert_eq!(app.llm.calls(), 1);
}

#[tokio::test]
async fn test_query_completion_failure_returns_matches() {
    let app = test_app_with(RecordingStore::new(64).with_matches(vec![canned_match()]));
    app.llm.set_failing(true);

    let (status, json) = send(
        &app.router,
        create_json_request(
            "POST",
            "/query",
            Some(json!({ "query": "hi", "mode": "synthesize" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "COMPLETION_PROVIDER_ERROR");
    assert_eq!(json["matches"][0]["id"], "t");
}

#[tokio::test]
async fn test_query_index_failure() {
    let app = test_app();
    app.store.set_failing(true);

    let (status, json) = send(
        &app.router,
        create_json_request("POST", "/query", Some(json!({ "query": "hi" }))),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "INDEX_PROVIDER_ERROR");
    assert_eq!(app.store.search_calls(), 1);
    assert_eq!(app.llm.calls(), 0);
}

#[tokio::test]
async fn test_query_mode_accepts_hyphenated_top_match() {
    let app = test_app_with(RecordingStore::new(64).with_matches(vec![canned_match()]));

    let (status, json) = send(
        &app.router,
        create_json_request(
            "POST",
            "/query",
            Some(json!({ "query": "hi", "mode": "top-match" })),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["answer"].as_str().unwrap().contains("Problem: p"));
}
