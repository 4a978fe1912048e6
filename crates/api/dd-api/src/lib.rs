pub mod routes;
pub mod state;

use axum::Router;
use axum::http::{Method, header};
use state::ApiState;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete router: JSON API on `/api/*`.
pub fn build_router(state: ApiState) -> Router {
    // Read-only data plus an idempotent trigger, so any origin may call it.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .nest("/api", api_routes().with_state(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn api_routes() -> Router<ApiState> {
    Router::new()
        .merge(routes::refresh::router())
        .merge(routes::snapshot::router())
        .merge(routes::health::router())
}
