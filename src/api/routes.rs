//! API Routes
//!
//! Configures the Axum router for the admin endpoints.

use axum::{
    routing::{delete, get, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, delete_handler, delete_pattern_handler, get_handler, health_handler,
    invalidate_tag_handler, set_handler, stats_handler, AppState,
};

/// Creates the admin router.
///
/// # Endpoints
/// - `GET /health` - Liveness and backend connectivity
/// - `GET /stats` - Hit/miss statistics
/// - `PUT /keys` - Store a JSON value with optional TTL and tags
/// - `GET /keys/:key` - Read a value
/// - `DELETE /keys/:key` - Delete a key
/// - `DELETE /keys?pattern=<glob>` - Delete every matching key
/// - `DELETE /tags/:tag` - Invalidate every key carrying a tag
/// - `DELETE /cache` - Clear everything
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/keys", put(set_handler).delete(delete_pattern_handler))
        .route("/keys/:key", get(get_handler).delete(delete_handler))
        .route("/tags/:tag", delete(invalidate_tag_handler))
        .route("/cache", delete(clear_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
