//! API Routes
//!
//! Configures the Axum router with all fetch cache endpoints.

use axum::{
    routing::{delete, get, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    fetch_handler, health_handler, invalidate_handler, reconfigure_handler, stats_handler,
    AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /fetch/*key` - Fetch a key through the cache
/// - `DELETE /cache/*key` - Drop a cached key
/// - `PUT /config` - Replace the cache bounds
/// - `GET /stats` - Cache and fetch statistics
/// - `GET /health` - Health check endpoint
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/fetch/*key", get(fetch_handler))
        .route("/cache/*key", delete(invalidate_handler))
        .route("/config", put(reconfigure_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
