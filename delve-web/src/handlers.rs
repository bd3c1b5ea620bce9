//! HTTP request handlers for the delve web server

pub mod research;
pub mod types;

pub use research::*;
pub use types::*;

use crate::AppState;
use axum::{extract::State, response::Json};

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.research.store().len().await,
    })
}
