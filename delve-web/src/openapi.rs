//! OpenAPI document for the delve API

use crate::handlers::{
    ErrorResponse, HealthResponse, ModelRequest, SessionActionResponse, SessionListItem,
    SessionListResponse, SessionResponse, StartResearchRequest, StartResearchResponse,
};
use axum::response::Json;
use delve_research::{ProgressEvent, ResearchSummary, SessionStatus};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Delve Research API",
        version = "0.1.0",
        description = "Recursive web research sessions with streamed progress",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    paths(
        crate::handlers::health_check,
        crate::handlers::research::start_research,
        crate::handlers::research::list_research,
        crate::handlers::research::get_research,
        crate::handlers::research::delete_research,
        crate::handlers::research::cancel_research,
        crate::sse::research_events,
    ),
    components(
        schemas(
            HealthResponse,
            ModelRequest,
            StartResearchRequest,
            StartResearchResponse,
            SessionResponse,
            SessionListItem,
            SessionListResponse,
            SessionActionResponse,
            ErrorResponse,
            ProgressEvent,
            ResearchSummary,
            SessionStatus,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Research", description = "Research session lifecycle and progress"),
    )
)]
pub struct ApiDoc;

/// Serve the OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() {
        let openapi = ApiDoc::openapi();
        assert_eq!(openapi.info.title, "Delve Research API");
        assert!(openapi.paths.paths.contains_key("/api/research"));
        assert!(openapi.paths.paths.contains_key("/api/research/{session_id}"));
        assert!(openapi
            .paths
            .paths
            .contains_key("/api/research/{session_id}/events"));
    }

    #[test]
    fn test_openapi_json_lists_schemas() {
        let json = ApiDoc::openapi().to_pretty_json().unwrap();
        assert!(json.contains("StartResearchRequest"));
        assert!(json.contains("ProgressEvent"));
    }
}
