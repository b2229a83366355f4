//! Axum router configuration with middleware.
//!
//! REST routes are under `/api/v1/`; the live channel is `/ws/chat`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/chat/sessions", get(handlers::chat::list_sessions))
        .route("/chat/history", get(handlers::chat::get_history))
        .route("/chat/read", post(handlers::chat::mark_read))
        .route("/chat/messages", post(handlers::chat::send_message));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws/chat", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint (no auth required).
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
