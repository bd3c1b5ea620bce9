//! Session types

use crate::types::{ProgressEvent, ResearchSummary, SessionStatus};
use crate::{ResearchError, ResearchResult};
use chrono::{DateTime, Duration, Utc};
use delve_core::ModelSelection;
use serde::{Deserialize, Serialize};

/// Top-level unit of research work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: String,
    pub query: String,
    pub breadth: usize,
    pub depth: usize,
    pub model: ModelSelection,
    pub status: SessionStatus,
    pub progress: Option<ProgressEvent>,
    pub result: Option<ResearchSummary>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ResearchSession {
    pub fn new(
        query: String,
        breadth: usize,
        depth: usize,
        model: ModelSelection,
        ttl: Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query,
            breadth,
            depth,
            model,
            status: SessionStatus::Pending,
            progress: None,
            result: None,
            error: None,
            created_at,
            expires_at: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Move to `next`, rejecting backwards or post-terminal moves
    pub fn transition(&mut self, next: SessionStatus) -> ResearchResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ResearchError::InvalidTransition {
                session_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            query: self.query.clone(),
            breadth: self.breadth,
            depth: self.depth,
            status: self.status,
            percentage: self
                .progress
                .as_ref()
                .map(|progress| progress.percentage)
                .unwrap_or(0.0),
            created_at: self.created_at,
        }
    }
}

/// Lightweight listing entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub query: String,
    pub breadth: usize,
    pub depth: usize,
    pub status: SessionStatus,
    pub percentage: f64,
    pub created_at: DateTime<Utc>,
}
