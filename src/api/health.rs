//! Health check endpoint

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::CallsView;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_calls: usize,
}

/// Liveness probe - is the relay running?
async fn health(State(calls): State<CallsView>) -> Json<HealthResponse> {
    let active_calls = calls.borrow().len();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_calls,
    })
}

/// Build health router
pub fn router(calls: CallsView) -> Router {
    Router::new().route("/health", get(health)).with_state(calls)
}
