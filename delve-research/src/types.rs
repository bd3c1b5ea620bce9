//! Research data types

use chrono::{DateTime, Utc};
use delve_core::ModelSelection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// One node in the recursion tree
#[derive(Debug, Clone)]
pub struct ResearchTask {
    pub query: String,
    pub breadth: usize,
    pub depth: usize,
    /// Learnings gathered by ancestors, read-only to this node
    pub learnings: Vec<String>,
}

impl ResearchTask {
    pub fn root(query: impl Into<String>, breadth: usize, depth: usize) -> Self {
        Self {
            query: query.into(),
            breadth,
            depth,
            learnings: Vec::new(),
        }
    }
}

/// A planned external search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerpQuery {
    pub query: String,
    /// Guides extraction and seeds the follow-up branch
    #[serde(default)]
    pub research_goal: String,
}

/// Output of processing one [`SerpQuery`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearningBatch {
    pub learnings: Vec<String>,
    pub follow_up_questions: Vec<String>,
    pub source_urls: Vec<String>,
}

/// Aggregate result of one branch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchResult {
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

impl BranchResult {
    pub fn from_batch(batch: &LearningBatch) -> Self {
        let mut result = Self::default();
        extend_unique(&mut result.learnings, batch.learnings.iter().cloned());
        extend_unique(&mut result.visited_urls, batch.source_urls.iter().cloned());
        result
    }

    /// Concatenate learnings and union URLs, keeping first-seen order
    pub fn merge(&mut self, other: BranchResult) {
        extend_unique(&mut self.learnings, other.learnings);
        extend_unique(&mut self.visited_urls, other.visited_urls);
    }
}

/// Append items not already present, preserving order
pub fn extend_unique<I>(target: &mut Vec<String>, items: I)
where
    I: IntoIterator<Item = String>,
{
    let mut seen: HashSet<String> = target.iter().cloned().collect();
    for item in items {
        if seen.insert(item.clone()) {
            target.push(item);
        }
    }
}

/// Session lifecycle; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Error)
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Pending, SessionStatus::Running)
                | (SessionStatus::Pending, SessionStatus::Error)
                | (SessionStatus::Running, SessionStatus::Completed)
                | (SessionStatus::Running, SessionStatus::Error)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Point-in-time progress snapshot for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ProgressEvent {
    pub session_id: String,
    /// 1-based recursion level of the branch that produced the event
    pub current_depth: usize,
    pub total_depth: usize,
    /// Breadth of the branch that produced the event
    pub current_breadth: usize,
    pub total_breadth: usize,
    pub current_query: Option<String>,
    pub total_queries: u64,
    pub completed_queries: u64,
    pub status: SessionStatus,
    pub percentage: f64,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// `completed / max(total, 1) * 100`
pub fn percentage(completed: u64, total: u64) -> f64 {
    completed as f64 / total.max(1) as f64 * 100.0
}

/// Final outcome of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ResearchSummary {
    pub success: bool,
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
    pub report: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A request to start research
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub query: String,
    pub breadth: usize,
    pub depth: usize,
    /// Falls back to the configured default model
    pub model: Option<ModelSelection>,
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>, breadth: usize, depth: usize) -> Self {
        Self {
            query: query.into(),
            breadth,
            depth,
            model: None,
        }
    }

    pub fn with_model(mut self, model: ModelSelection) -> Self {
        self.model = Some(model);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_deduplicates_and_keeps_order() {
        let mut left = BranchResult {
            learnings: vec!["a".into(), "b".into()],
            visited_urls: vec!["https://x".into()],
        };
        left.merge(BranchResult {
            learnings: vec!["b".into(), "c".into()],
            visited_urls: vec!["https://x".into(), "https://y".into()],
        });

        assert_eq!(left.learnings, vec!["a", "b", "c"]);
        assert_eq!(left.visited_urls, vec!["https://x", "https://y"]);
    }

    #[test]
    fn test_status_transitions_are_one_directional() {
        use SessionStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Error));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Error));
        assert!(!Error.can_transition_to(Running));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn test_percentage_handles_zero_total() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 4), 75.0);
        assert_eq!(percentage(6, 6), 100.0);
    }

    #[test]
    fn test_serp_query_reads_camel_case() {
        let query: SerpQuery =
            serde_json::from_str(r#"{"query": "rust", "researchGoal": "learn"}"#).unwrap();
        assert_eq!(query.research_goal, "learn");
    }
}
