//! Request and response bodies for the research API

use chrono::{DateTime, Utc};
use delve_core::ModelSelection;
use delve_research::{
    ProgressEvent, ResearchSession, ResearchSummary, SessionStatus, SessionSummary,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[schema(example = "0.1.0")]
    pub version: String,
    /// Sessions currently held in memory
    pub sessions: usize,
}

/// Model override as sent by clients
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelRequest {
    #[schema(example = "openai")]
    pub provider: String,
    #[schema(example = "gpt-4o-mini")]
    pub model: String,
}

/// Research start request
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartResearchRequest {
    #[schema(example = "How do Rust async runtimes schedule tasks?")]
    pub query: String,
    #[schema(example = 4, minimum = 2, maximum = 10)]
    pub breadth: usize,
    #[schema(example = 2, minimum = 1, maximum = 5)]
    pub depth: usize,
    pub model: Option<ModelRequest>,
}

/// Research start response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StartResearchResponse {
    #[schema(example = "3f1c6a52-9d0e-4a53-a4c6-1f6f0f3f2b1d")]
    pub session_id: String,
    pub status: SessionStatus,
}

/// Full view of one session
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub id: String,
    pub query: String,
    pub breadth: usize,
    pub depth: usize,
    pub model: ModelRequest,
    pub status: SessionStatus,
    pub progress: Option<ProgressEvent>,
    pub result: Option<ResearchSummary>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&ModelSelection> for ModelRequest {
    fn from(selection: &ModelSelection) -> Self {
        Self {
            provider: selection.provider.to_string(),
            model: selection.model.clone(),
        }
    }
}

impl From<ResearchSession> for SessionResponse {
    fn from(session: ResearchSession) -> Self {
        Self {
            model: ModelRequest::from(&session.model),
            id: session.id,
            query: session.query,
            breadth: session.breadth,
            depth: session.depth,
            status: session.status,
            progress: session.progress,
            result: session.result,
            error: session.error,
            created_at: session.created_at,
            expires_at: session.expires_at,
        }
    }
}

/// One entry of the session listing
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionListItem {
    pub id: String,
    pub query: String,
    pub breadth: usize,
    pub depth: usize,
    pub status: SessionStatus,
    pub percentage: f64,
    pub created_at: DateTime<Utc>,
}

impl From<SessionSummary> for SessionListItem {
    fn from(summary: SessionSummary) -> Self {
        Self {
            id: summary.id,
            query: summary.query,
            breadth: summary.breadth,
            depth: summary.depth,
            status: summary.status,
            percentage: summary.percentage,
            created_at: summary.created_at,
        }
    }
}

/// Session listing response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionListItem>,
    pub total: usize,
}

/// Acknowledgement for delete and cancel
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionActionResponse {
    pub session_id: String,
    #[schema(example = "cancelling")]
    pub status: String,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Session not found: 3f1c6a52")]
    pub error: String,
    #[schema(example = "session_not_found")]
    pub code: String,
}
