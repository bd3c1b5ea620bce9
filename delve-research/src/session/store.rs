//! In-memory session store

use super::types::{ResearchSession, SessionSummary};
use crate::types::{ProgressEvent, ResearchSummary, SessionStatus};
use crate::{ResearchError, ResearchResult};
use chrono::{Duration, Utc};
use delve_core::{ModelSelection, MAX_SESSION_TTL_SECS};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Session registry keyed by id.
///
/// Entries expire `ttl` after creation. Expired entries are invisible to
/// every read even before a sweep removes them.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, ResearchSession>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Lifetimes beyond [`MAX_SESSION_TTL_SECS`] are clamped to it
    pub fn with_ttl_secs(ttl_secs: u64) -> Self {
        let secs = ttl_secs.min(MAX_SESSION_TTL_SECS) as i64;
        let ttl = Duration::try_seconds(secs).unwrap_or_else(|| Duration::days(36_500));
        Self::new(ttl)
    }

    /// Register a new pending session
    pub async fn create(
        &self,
        query: String,
        breadth: usize,
        depth: usize,
        model: ModelSelection,
    ) -> ResearchSession {
        let session = ResearchSession::new(query, breadth, depth, model, self.ttl);
        info!(
            session_id = %session.id,
            breadth = breadth,
            depth = depth,
            "Created research session"
        );

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        session
    }

    pub async fn get(&self, session_id: &str) -> ResearchResult<ResearchSession> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|session| !session.is_expired(Utc::now()))
            .cloned()
            .ok_or_else(|| ResearchError::not_found(session_id))
    }

    pub async fn set_status(&self, session_id: &str, status: SessionStatus) -> ResearchResult<()> {
        self.update(session_id, |session| session.transition(status))
            .await
    }

    /// Record the latest progress of a running session
    pub async fn set_progress(&self, session_id: &str, event: ProgressEvent) -> ResearchResult<()> {
        self.update(session_id, |session| {
            if session.status.is_terminal() {
                return Err(ResearchError::InvalidTransition {
                    session_id: session.id.clone(),
                    from: session.status,
                    to: event.status,
                });
            }
            session.progress = Some(event);
            Ok(())
        })
        .await
    }

    /// Complete a session with its result and terminal event
    pub async fn set_result(
        &self,
        session_id: &str,
        summary: ResearchSummary,
        event: ProgressEvent,
    ) -> ResearchResult<()> {
        self.update(session_id, |session| {
            session.transition(SessionStatus::Completed)?;
            session.result = Some(summary);
            session.progress = Some(event);
            Ok(())
        })
        .await
    }

    /// Fail a session, keeping whatever partial result was gathered
    pub async fn set_error(
        &self,
        session_id: &str,
        message: String,
        partial: Option<ResearchSummary>,
        event: ProgressEvent,
    ) -> ResearchResult<()> {
        self.update(session_id, |session| {
            session.transition(SessionStatus::Error)?;
            session.error = Some(message);
            session.result = partial;
            session.progress = Some(event);
            Ok(())
        })
        .await
    }

    /// Remove a session; returns whether a live entry existed
    pub async fn delete(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(session_id) {
            Some(session) => !session.is_expired(Utc::now()),
            None => false,
        }
    }

    /// Live sessions, newest first
    pub async fn list_all(&self) -> Vec<SessionSummary> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .filter(|session| !session.is_expired(now))
            .map(ResearchSession::summary)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    /// Evict expired entries and return their ids
    pub async fn sweep_expired(&self) -> Vec<String> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|session| session.is_expired(now))
            .map(|session| session.id.clone())
            .collect();

        for id in &expired {
            sessions.remove(id);
        }

        if !expired.is_empty() {
            debug!("Evicted {} expired sessions", expired.len());
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn update<F>(&self, session_id: &str, apply: F) -> ResearchResult<()>
    where
        F: FnOnce(&mut ResearchSession) -> ResearchResult<()>,
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .filter(|session| !session.is_expired(Utc::now()))
            .ok_or_else(|| ResearchError::not_found(session_id))?;
        apply(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::ProviderKind;
    use std::time::Duration as StdDuration;

    fn model() -> ModelSelection {
        ModelSelection::new(ProviderKind::OpenAi, "gpt-4o-mini")
    }

    fn event(session_id: &str, status: SessionStatus) -> ProgressEvent {
        ProgressEvent {
            session_id: session_id.to_string(),
            current_depth: 1,
            total_depth: 1,
            current_breadth: 2,
            total_breadth: 2,
            current_query: None,
            total_queries: 2,
            completed_queries: 2,
            status,
            percentage: 100.0,
            message: None,
            timestamp: Utc::now(),
        }
    }

    fn summary(success: bool) -> ResearchSummary {
        ResearchSummary {
            success,
            learnings: vec!["fact".to_string()],
            visited_urls: vec![],
            report: None,
            error: None,
            started_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_is_one_directional() {
        let store = SessionStore::with_ttl_secs(60);
        let session = store.create("query".into(), 2, 1, model()).await;
        assert_eq!(session.status, SessionStatus::Pending);

        store
            .set_status(&session.id, SessionStatus::Running)
            .await
            .unwrap();
        store
            .set_result(
                &session.id,
                summary(true),
                event(&session.id, SessionStatus::Completed),
            )
            .await
            .unwrap();

        let stored = store.get(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert!(stored.result.unwrap().success);

        // Terminal sessions are immutable
        let err = store
            .set_status(&session.id, SessionStatus::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::InvalidTransition { .. }));
        assert!(store
            .set_progress(&session.id, event(&session.id, SessionStatus::Running))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_error_keeps_partial_result() {
        let store = SessionStore::with_ttl_secs(60);
        let session = store.create("query".into(), 2, 1, model()).await;
        store
            .set_status(&session.id, SessionStatus::Running)
            .await
            .unwrap();
        store
            .set_error(
                &session.id,
                "report failed".into(),
                Some(summary(false)),
                event(&session.id, SessionStatus::Error),
            )
            .await
            .unwrap();

        let stored = store.get(&session.id).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Error);
        assert_eq!(stored.error.as_deref(), Some("report failed"));
        assert_eq!(stored.result.unwrap().learnings, vec!["fact"]);
    }

    #[tokio::test]
    async fn test_oversized_ttl_is_clamped() {
        let store = SessionStore::with_ttl_secs(u64::MAX);
        let session = store.create("query".into(), 2, 1, model()).await;
        assert!(session.expires_at > session.created_at + Duration::days(365));
        assert!(store.get(&session.id).await.is_ok());

        // A lifetime past the calendar saturates instead of overflowing
        let forever = SessionStore::new(Duration::MAX);
        let session = forever.create("query".into(), 2, 1, model()).await;
        assert_eq!(session.expires_at, chrono::DateTime::<Utc>::MAX_UTC);
        assert!(forever.get(&session.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_not_found() {
        let store = SessionStore::new(Duration::milliseconds(20));
        let session = store.create("query".into(), 2, 1, model()).await;
        assert!(store.get(&session.id).await.is_ok());

        tokio::time::sleep(StdDuration::from_millis(40)).await;

        assert!(matches!(
            store.get(&session.id).await,
            Err(ResearchError::SessionNotFound { .. })
        ));
        assert!(store.list_all().await.is_empty());
        assert_eq!(store.len().await, 1);

        let evicted = store.sweep_expired().await;
        assert_eq!(evicted, vec![session.id.clone()]);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let store = SessionStore::with_ttl_secs(60);
        let first = store.create("first".into(), 2, 1, model()).await;
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        let second = store.create("second".into(), 3, 2, model()).await;

        let listed = store.list_all().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);

        assert!(store.delete(&first.id).await);
        assert!(!store.delete(&first.id).await);
        assert!(store.get(&first.id).await.is_err());
    }
}
