use axum::{Json, Router, extract::State, routing::get};
use dd_common::types::{CacheStats, EntryGroup, Snapshot};

use crate::state::ApiState;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/snapshot", get(snapshot))
        .route("/groups", get(groups))
        .route("/stats", get(stats))
}

async fn snapshot(State(state): State<ApiState>) -> Json<Snapshot> {
    Json(state.coordinator.get().await)
}

async fn groups(State(state): State<ApiState>) -> Json<Vec<EntryGroup>> {
    Json(state.coordinator.groups().await)
}

async fn stats(State(state): State<ApiState>) -> Json<CacheStats> {
    Json(state.coordinator.stats().await)
}
