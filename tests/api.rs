//! API endpoint integration tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use callrelay::api::ApiServer;
use callrelay::session::CallSummary;
use chrono::Utc;
use tokio::sync::watch;
use tower::ServiceExt;

fn summary(call_id: &str, pipeline_active: bool) -> CallSummary {
    CallSummary {
        call_id: call_id.to_string(),
        caller: Some("+15550100".to_string()),
        started_at: Utc::now(),
        remote_connected: true,
        media_bridged: true,
        pipeline_active,
        utterances: u64::from(pipeline_active),
    }
}

/// Build a test API router over a fixed call list
fn build_test_router(calls: Vec<CallSummary>) -> axum::Router {
    let (_tx, rx) = watch::channel(calls);
    ApiServer::router(rx)
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_router(vec![summary("c1", true), summary("c2", false)]);

    let (status, json) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["active_calls"], 2);
}

#[tokio::test]
async fn test_calls_endpoint_lists_active_calls() {
    let app = build_test_router(vec![summary("c1", true)]);

    let (status, json) = get_json(app, "/calls").await;
    assert_eq!(status, StatusCode::OK);
    let calls = json.as_array().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["call_id"], "c1");
    assert_eq!(calls[0]["pipeline_active"], true);
    assert_eq!(calls[0]["utterances"], 1);
    assert!(calls[0]["started_at"].is_string());
}

#[tokio::test]
async fn test_calls_endpoint_empty() {
    let app = build_test_router(Vec::new());

    let (status, json) = get_json(app, "/calls").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn test_single_call_lookup() {
    let app = build_test_router(vec![summary("c1", false)]);
    let (status, json) = get_json(app, "/calls/c1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["media_bridged"], true);

    let app = build_test_router(vec![summary("c1", false)]);
    let (status, _) = get_json(app, "/calls/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_spawned_server_serves_health() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let (_tx, rx) = watch::channel(vec![summary("c1", true)]);
    let task = ApiServer::new(rx, port).spawn();

    let url = format!("http://127.0.0.1:{port}/health");
    let mut body = None;
    for _ in 0..50 {
        if let Ok(response) = reqwest::get(&url).await {
            body = Some(response.json::<serde_json::Value>().await.unwrap());
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let body = body.expect("API server never came up");
    assert_eq!(body["active_calls"], 1);
    task.abort();
}
