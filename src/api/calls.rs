//! Active call listing

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use super::CallsView;
use crate::session::CallSummary;

/// List active calls, oldest first
async fn list_calls(State(calls): State<CallsView>) -> Json<Vec<CallSummary>> {
    Json(calls.borrow().clone())
}

/// Look up one active call
async fn get_call(
    State(calls): State<CallsView>,
    Path(call_id): Path<String>,
) -> Result<Json<CallSummary>, StatusCode> {
    calls
        .borrow()
        .iter()
        .find(|c| c.call_id == call_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Build calls router
pub fn router(calls: CallsView) -> Router {
    Router::new()
        .route("/", get(list_calls))
        .route("/{call_id}", get(get_call))
        .with_state(calls)
}
