//! API Routes
//!
//! Configures the Axum router with the status and cache inspection endpoints.

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_store_handler, delete_entry_handler, get_entry_handler, health_handler,
    status_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check
/// - `GET /status` - Cache statistics and channel states
/// - `GET /cache/:store/:key` - Read a cached payload
/// - `DELETE /cache/:store/:key` - Delete one entry
/// - `DELETE /cache/:store` - Clear a store
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route(
            "/cache/:store/:key",
            get(get_entry_handler).delete(delete_entry_handler),
        )
        .route("/cache/:store", delete(clear_store_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
