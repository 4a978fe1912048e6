use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde_json::{Value, json};
use tracing::debug;

use crate::state::ApiState;

/// Webhook target for container events. Accepts GET and POST so plain
/// notification hooks work without a body.
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/refresh", get(trigger).post(trigger))
        .route("/webhook", get(trigger).post(trigger))
}

async fn trigger(State(state): State<ApiState>) -> (StatusCode, Json<Value>) {
    debug!("Refresh requested over HTTP");
    state.coordinator.request_refresh();
    (
        StatusCode::ACCEPTED,
        Json(json!({ "success": true, "message": "refresh queued" })),
    )
}
