//! Router-level tests for the ingestion endpoint.
//!
//! Each test owns the receiver half of the index queue, so it can see exactly
//! what the endpoint queued without a running sink.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use perfreport::{IndexQueue, IndexReceiver, QueuedReport};
use serde_json::{json, Value};
use server::error::ErrorResponse;
use server::{build_router, ServerConfig, ServerState};
use tokio::time::timeout;
use tower::ServiceExt;

fn test_app(capacity: usize) -> (Router, Arc<ServerState>, IndexReceiver) {
    test_app_with(ServerConfig {
        queue_capacity: capacity,
        metrics_enabled: false,
        ..ServerConfig::default()
    })
}

fn test_app_with(config: ServerConfig) -> (Router, Arc<ServerState>, IndexReceiver) {
    let (sender, receiver) = IndexQueue::bounded(config.queue_capacity).unwrap();
    let state = Arc::new(ServerState::new(config, sender));
    (build_router(state.clone()), state, receiver)
}

fn post_report(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/perfReport")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn next_queued(receiver: &mut IndexReceiver) -> QueuedReport {
    timeout(Duration::from_secs(1), receiver.dequeue())
        .await
        .expect("a report was queued")
        .expect("queue is open")
}

fn as_json(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

fn error_code(bytes: &[u8]) -> String {
    let response: ErrorResponse = serde_json::from_slice(bytes).unwrap();
    response.error.code
}

#[tokio::test]
async fn ad_report_is_enriched_and_queued() {
    let (app, state, mut rx) = test_app(8);
    let body = json!({
        "type": "adData",
        "guid": "g1",
        "adData": { "adRequestStart": 100.0, "adRequestEnd": 142.5, "hasPreroll": true }
    });

    let (status, response) = send(&app, post_report(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.is_empty());
    assert_eq!(state.queue_depth(), 1);

    let queued = next_queued(&mut rx).await;
    assert_eq!(queued.guid, "g1");
    assert_eq!(queued.label, "adData");
    let indexed = as_json(&queued.body);
    assert_eq!(indexed["adData"]["adRequestDelta"], 42.5);
    assert_eq!(indexed["type"], "adData");
    assert_eq!(state.queue_depth(), 0);
}

#[tokio::test]
async fn ad_report_without_preroll_has_no_delta() {
    let (app, _state, mut rx) = test_app(8);
    let body = json!({
        "type": "adData",
        "guid": "g1",
        "adData": { "adRequestStart": 100.0, "adRequestEnd": 142.5, "hasPreroll": false, "adRequestDelta": 7.0 }
    });

    let (status, _) = send(&app, post_report(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);

    let indexed = as_json(&next_queued(&mut rx).await.body);
    assert!(indexed["adData"].get("adRequestDelta").is_none());
}

#[tokio::test]
async fn unknown_type_passes_through_unchanged() {
    let (app, _state, mut rx) = test_app(8);
    let body = json!({ "type": "unknownKind", "guid": "g2" });

    let (status, _) = send(&app, post_report(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);

    let queued = next_queued(&mut rx).await;
    assert_eq!(queued.label, "unrecognized");
    assert_eq!(as_json(&queued.body), body);
}

#[tokio::test]
async fn asset_and_event_log_reports_are_passthrough() {
    let (app, _state, mut rx) = test_app(8);
    let asset = json!({
        "type": "assetData",
        "guid": "g3",
        "assetData": {
            "assetUrl": "https://cdn.example.com/video.m3u8",
            "assetMpxId": "mpx-42",
            "assetGuid": "asset-1",
            "ccType": "608"
        }
    });
    let events = json!({
        "type": "eventLog",
        "guid": "g4",
        "eventLog": [
            { "type": "load", "timestamp": 1.5 },
            { "type": "play", "timestamp": 2.25 }
        ]
    });

    for body in [&asset, &events] {
        let (status, _) = send(&app, post_report(body.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&as_json(&next_queued(&mut rx).await.body), body);
    }
}

#[tokio::test]
async fn env_report_keeps_all_fields() {
    let (app, _state, mut rx) = test_app(8);
    let body = json!({
        "type": "envData",
        "guid": "g5",
        "envData": {
            "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
            "pageUrl": "https://example.com/watch/1",
            "playerAdapter": "html5",
            "playerVersion": "7.1.0",
            "adBlockerPresent": false
        }
    });

    let (status, _) = send(&app, post_report(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&next_queued(&mut rx).await.body), body);
}

#[tokio::test]
async fn malformed_body_is_rejected_and_not_queued() {
    let (app, state, _rx) = test_app(8);

    for body in ["not json", "", "{\"type\": \"adData\"", "[1,2,3]"] {
        let (status, response) = send(&app, post_report(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
        assert_eq!(error_code(&response), "MALFORMED_PAYLOAD");
        assert_eq!(state.queue_depth(), 0);
    }
}

#[tokio::test]
async fn non_post_methods_get_405() {
    let (app, state, _rx) = test_app(8);

    for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
        let request = Request::builder()
            .method(method.clone())
            .uri("/perfReport")
            .body(Body::from(r#"{"type":"envData","guid":"g"}"#))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{method}");
        assert_eq!(response.headers()[header::ALLOW], "POST");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"post only");
        assert_eq!(state.queue_depth(), 0);
    }
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let (app, state, _rx) = test_app_with(ServerConfig {
        max_body_size_kb: 1,
        metrics_enabled: false,
        ..ServerConfig::default()
    });
    let big = json!({
        "type": "envData",
        "guid": "big",
        "envData": { "userAgent": "x".repeat(4096) }
    });

    let (status, response) = send(&app, post_report(big.to_string())).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(error_code(&response), "PAYLOAD_TOO_LARGE");
    assert_eq!(state.queue_depth(), 0);
}

#[tokio::test]
async fn full_queue_holds_the_request_until_a_slot_frees() {
    let (app, state, mut rx) = test_app(1);
    let report = |guid: &str| json!({ "type": "assetData", "guid": guid }).to_string();

    let (status, _) = send(&app, post_report(report("first"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.queue_depth(), 1);

    let pending = tokio::spawn({
        let app = app.clone();
        let body = report("second");
        async move { send(&app, post_report(body)).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!pending.is_finished(), "request must wait for a free slot");
    assert_eq!(state.queue_depth(), 1);

    assert_eq!(next_queued(&mut rx).await.guid, "first");
    let (status, _) = timeout(Duration::from_secs(1), pending)
        .await
        .expect("request completes once the queue drains")
        .unwrap();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(next_queued(&mut rx).await.guid, "second");
}

#[tokio::test]
async fn queued_reports_keep_request_order() {
    let (app, _state, mut rx) = test_app(8);
    for n in 0..5 {
        let body = json!({ "type": "eventLog", "guid": format!("g{n}") });
        let (status, _) = send(&app, post_report(body.to_string())).await;
        assert_eq!(status, StatusCode::OK);
    }

    for n in 0..5 {
        assert_eq!(next_queued(&mut rx).await.guid, format!("g{n}"));
    }
}

#[tokio::test]
async fn closed_queue_returns_service_unavailable() {
    let (app, _state, rx) = test_app(8);
    drop(rx);

    let (status, response) = send(&app, post_report(r#"{"type":"envData","guid":"g"}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&response), "QUEUE_CLOSED");

    let ready = Request::get("/ready").body(Body::empty()).unwrap();
    let (status, body) = send(&app, ready).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(as_json(&body)["components"]["index_sink"], "stopped");
}

#[tokio::test]
async fn root_greets_on_any_method() {
    let (app, state, _rx) = test_app(8);
    for method in [Method::GET, Method::POST] {
        let request = Request::builder()
            .method(method)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"Hello World!");
    }
    assert_eq!(state.queue_depth(), 0);
}

#[tokio::test]
async fn health_and_readiness() {
    let (app, _state, _rx) = test_app(4);

    let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(as_json(&body)["status"], "healthy");

    let (status, body) = send(&app, Request::get("/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let ready = as_json(&body);
    assert_eq!(ready["status"], "ready");
    assert_eq!(ready["queue"]["capacity"], 4);
    assert_eq!(ready["queue"]["depth"], 0);
}

#[tokio::test]
async fn metrics_disabled_is_not_found() {
    let (app, _state, _rx) = test_app(8);
    let (status, body) = send(&app, Request::get("/metrics").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "NOT_FOUND");
}

/// Value of the first sample of `name` carrying `label` in a Prometheus scrape.
fn sample(scrape: &str, name: &str, label: &str) -> f64 {
    scrape
        .lines()
        .filter(|line| line.starts_with(name) && line.contains(label))
        .find_map(|line| line.rsplit(' ').next()?.parse().ok())
        .unwrap_or(0.0)
}

#[tokio::test]
async fn ingest_counters_are_exported() {
    let (app, _state, mut rx) = test_app_with(ServerConfig {
        metrics_enabled: true,
        ..ServerConfig::default()
    });

    let good = json!({ "type": "assetData", "guid": "counted" }).to_string();
    let (status, _) = send(&app, post_report(good)).await;
    assert_eq!(status, StatusCode::OK);
    next_queued(&mut rx).await;
    let (status, _) = send(&app, post_report("not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Request::get("/metrics").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    // Other tests in this binary share the global recorder, so only lower
    // bounds hold.
    assert!(
        sample(&text, "perfreport_reports_received_total", r#"kind="assetData""#) >= 1.0,
        "{text}"
    );
    assert!(
        sample(&text, "perfreport_reports_rejected_total", r#"reason="MALFORMED_PAYLOAD""#) >= 1.0,
        "{text}"
    );
}

#[tokio::test]
async fn unrouted_paths_get_the_greeting() {
    let (app, state, _rx) = test_app(8);
    for path in ["/favicon.ico", "/nope/deeper"] {
        let (status, body) = send(&app, Request::get(path).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert_eq!(body, b"Hello World!");
    }
    assert_eq!(state.queue_depth(), 0);
}

#[tokio::test]
async fn request_id_is_echoed_or_minted() {
    let (app, _state, _rx) = test_app(8);

    let request = Request::get("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let request = Request::get("/health").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let minted = response.headers()["x-request-id"].to_str().unwrap();
    assert_eq!(minted.len(), 36);
}
