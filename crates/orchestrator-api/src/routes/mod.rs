pub mod auth;
pub mod jobs;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Builds the full router: public auth routes plus the bearer-token-gated
/// job routes (spec §6.1).
pub fn create_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = jobs::router().route_layer(axum::middleware::from_fn_with_state(
        app_state.clone(),
        auth_middleware,
    ));

    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
        .merge(auth::router())
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn root() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "orchestrator-api",
        "version": orchestrator_core::VERSION,
        "status": "operational"
    }))
}
