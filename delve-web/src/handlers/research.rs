//! Research session handlers

use super::types::{
    ErrorResponse, SessionActionResponse, SessionListItem, SessionListResponse, SessionResponse,
    StartResearchRequest, StartResearchResponse,
};
use crate::{AppState, WebError, WebResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as JsonExtractor,
};
use delve_core::ModelSelection;
use delve_research::{ResearchRequest, SessionStatus};
use tracing::info;

/// Start research session
#[utoipa::path(
    post,
    path = "/api/research",
    tag = "Research",
    summary = "Start research session",
    description = "Validate the request, create a session, and start researching in the background",
    request_body = StartResearchRequest,
    responses(
        (status = 202, description = "Research session started", body = StartResearchResponse),
        (status = 400, description = "Query, breadth, depth or model is invalid", body = ErrorResponse),
        (status = 500, description = "Failed to start research session", body = ErrorResponse)
    )
)]
pub async fn start_research(
    State(state): State<AppState>,
    JsonExtractor(request): JsonExtractor<StartResearchRequest>,
) -> WebResult<(StatusCode, Json<StartResearchResponse>)> {
    let mut research = ResearchRequest::new(request.query, request.breadth, request.depth);
    if let Some(model) = request.model {
        let selection = ModelSelection::parse(&model.provider, &model.model)
            .map_err(|e| WebError::BadRequest(e.to_string()))?;
        research = research.with_model(selection);
    }

    let session_id = state.research.start(research).await?;
    info!(session_id = %session_id, "Research session accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(StartResearchResponse {
            session_id,
            status: SessionStatus::Pending,
        }),
    ))
}

/// List research sessions
#[utoipa::path(
    get,
    path = "/api/research",
    tag = "Research",
    summary = "List research sessions",
    description = "All live sessions, newest first",
    responses(
        (status = 200, description = "Session list", body = SessionListResponse)
    )
)]
pub async fn list_research(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions: Vec<SessionListItem> = state
        .research
        .list()
        .await
        .into_iter()
        .map(SessionListItem::from)
        .collect();

    Json(SessionListResponse {
        total: sessions.len(),
        sessions,
    })
}

/// Get research session
#[utoipa::path(
    get,
    path = "/api/research/{session_id}",
    tag = "Research",
    summary = "Get research session",
    description = "Status, latest progress, and the result once the session is terminal",
    params(
        ("session_id" = String, Path, description = "Research session ID")
    ),
    responses(
        (status = 200, description = "Research session", body = SessionResponse),
        (status = 404, description = "Session not found or expired", body = ErrorResponse)
    )
)]
pub async fn get_research(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> WebResult<Json<SessionResponse>> {
    let session = state.research.get(&session_id).await?;
    Ok(Json(SessionResponse::from(session)))
}

/// Delete research session
#[utoipa::path(
    delete,
    path = "/api/research/{session_id}",
    tag = "Research",
    summary = "Delete research session",
    description = "Cancel any running work, forget the session, and close its progress stream",
    params(
        ("session_id" = String, Path, description = "Research session ID")
    ),
    responses(
        (status = 200, description = "Session deleted", body = SessionActionResponse),
        (status = 404, description = "Session not found or expired", body = ErrorResponse)
    )
)]
pub async fn delete_research(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> WebResult<Json<SessionActionResponse>> {
    state.research.delete(&session_id).await?;
    Ok(Json(SessionActionResponse {
        session_id,
        status: "deleted".to_string(),
    }))
}

/// Cancel research session
#[utoipa::path(
    post,
    path = "/api/research/{session_id}/cancel",
    tag = "Research",
    summary = "Cancel research session",
    description = "Request cooperative cancellation; the session ends in the error state",
    params(
        ("session_id" = String, Path, description = "Research session ID")
    ),
    responses(
        (status = 202, description = "Cancellation requested", body = SessionActionResponse),
        (status = 404, description = "Session not found or expired", body = ErrorResponse),
        (status = 409, description = "Session already finished", body = ErrorResponse)
    )
)]
pub async fn cancel_research(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> WebResult<(StatusCode, Json<SessionActionResponse>)> {
    state.research.cancel(&session_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SessionActionResponse {
            session_id,
            status: "cancelling".to_string(),
        }),
    ))
}
