use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};

use crate::state::ApiState;

pub fn router() -> Router<ApiState> {
    Router::new().route("/health", get(health))
}

/// Always 200: a failed upstream degrades the data, not this service.
async fn health(State(state): State<ApiState>) -> Json<Value> {
    match state.coordinator.get().await.last_error {
        None => Json(json!({ "status": "ok" })),
        Some(error) => Json(json!({ "status": "degraded", "error": error })),
    }
}
