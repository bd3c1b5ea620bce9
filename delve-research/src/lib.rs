//! Delve Research - recursive concurrent research orchestration
//!
//! Given a query, the engine plans search queries, runs them under one
//! process-wide concurrency pool, extracts learnings, recurses into follow-up
//! directions at reduced breadth and depth, and finally writes a report.
//!
//! ## Architecture
//!
//! - **budget**: token-aware trimming of prompt material
//! - **planner** / **extractor** / **report**: the three text-generation steps
//! - **engine**: the recursive scheduler
//! - **progress**: single-writer progress aggregation and the replaying stream hub
//! - **session**: TTL-bound session store
//! - **service**: composition root tying the pieces together for callers

pub mod budget;
pub mod engine;
pub mod extractor;
pub mod planner;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod service;
pub mod session;
pub mod types;

pub use budget::{PromptBudgeter, TokenCounter};
pub use engine::{next_breadth, total_queries, ResearchEngine, RunContext};
pub use extractor::LearningExtractor;
pub use planner::QueryPlanner;
pub use progress::{ProgressAggregator, ProgressHub, ProgressSignal, ProgressSubscription};
pub use report::ReportWriter;
pub use service::ResearchService;
pub use session::{ResearchSession, SessionStore, SessionSummary};
pub use types::*;

use delve_core::DelveError;

/// Research-level error type
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Planning failed: {message}")]
    Planner { message: String },

    #[error("Search failed for '{query}': {message}")]
    Search { query: String, message: String },

    #[error("Extraction failed for '{query}': {message}")]
    Extraction { query: String, message: String },

    #[error("Report generation failed: {message}")]
    ReportGeneration { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Invalid transition for session {session_id}: {from} -> {to}")]
    InvalidTransition {
        session_id: String,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("research cancelled")]
    Cancelled,

    #[error("Core error: {0}")]
    Core(#[from] DelveError),
}

pub type ResearchResult<T> = Result<T, ResearchError>;

impl ResearchError {
    /// Create a validation error for a request field
    pub fn validation<S: Into<String>>(field: &str, message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }

    /// Create a planner error
    pub fn planner<S: Into<String>>(message: S) -> Self {
        Self::Planner {
            message: message.into(),
        }
    }

    /// Create a search error
    pub fn search<Q: Into<String>, S: Into<String>>(query: Q, message: S) -> Self {
        Self::Search {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create an extraction error
    pub fn extraction<Q: Into<String>, S: Into<String>>(query: Q, message: S) -> Self {
        Self::Extraction {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Create a report generation error
    pub fn report<S: Into<String>>(message: S) -> Self {
        Self::ReportGeneration {
            message: message.into(),
        }
    }

    /// Create a session-not-found error
    pub fn not_found<S: Into<String>>(session_id: S) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Whether this error ends the branch that raised it.
    ///
    /// Search and extraction failures are absorbed per query.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Search { .. } | Self::Extraction { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
