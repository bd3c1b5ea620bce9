//! Route definitions for the delve web server

use crate::{handlers, openapi, sse, websocket, AppState};
use axum::{
    routing::{get, post},
    Router,
};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/openapi.json", get(openapi::openapi_json))
        .route(
            "/research",
            post(handlers::start_research).get(handlers::list_research),
        )
        .route(
            "/research/{session_id}",
            get(handlers::get_research).delete(handlers::delete_research),
        )
        .route(
            "/research/{session_id}/cancel",
            post(handlers::cancel_research),
        )
        .route("/research/{session_id}/events", get(sse::research_events))
}

/// Create WebSocket routes
pub fn websocket_routes() -> Router<AppState> {
    Router::new().route(
        "/research/{session_id}",
        get(websocket::research_progress_handler),
    )
}
