//! Research service
//!
//! Owns the session store, the progress hub, the engine, and the
//! cancellation tokens of running sessions. One instance is built at the
//! composition root and shared by reference; nothing here is process-global.

use crate::engine::{ResearchEngine, RunContext};
use crate::progress::{ProgressAggregator, ProgressHub, ProgressSubscription};
use crate::session::{ResearchSession, SessionStore, SessionSummary};
use crate::types::{BranchResult, ResearchRequest, ResearchSummary, ResearchTask, SessionStatus};
use crate::{ResearchError, ResearchResult};
use chrono::Utc;
use delve_core::{
    logging::performance, DelveConfig, ModelSelection, ResearchSettings, SearchProvider,
    TextGenerator,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A request that passed validation
#[derive(Debug, Clone)]
struct ValidatedRequest {
    query: String,
    breadth: usize,
    depth: usize,
    model: ModelSelection,
}

/// Entry point for starting, observing, and managing research sessions
#[derive(Clone)]
pub struct ResearchService {
    engine: Arc<ResearchEngine>,
    store: Arc<SessionStore>,
    hub: Arc<ProgressHub>,
    settings: ResearchSettings,
    default_model: ModelSelection,
    runs: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl ResearchService {
    pub fn new(
        config: &DelveConfig,
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn SearchProvider>,
    ) -> ResearchResult<Self> {
        config.validate()?;
        let engine = ResearchEngine::new(config, generator, search)?;

        Ok(Self {
            engine: Arc::new(engine),
            store: Arc::new(SessionStore::with_ttl_secs(config.research.session_ttl_secs)),
            hub: Arc::new(ProgressHub::new(config.research.replay_buffer_size)),
            settings: config.research.clone(),
            default_model: config.llm.default_model.clone(),
            runs: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn engine(&self) -> &ResearchEngine {
        &self.engine
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<ProgressHub> {
        &self.hub
    }

    pub fn default_model(&self) -> &ModelSelection {
        &self.default_model
    }

    /// Validate `request`, create its session, and start the run in the
    /// background. Returns the new session id.
    pub async fn start(&self, request: ResearchRequest) -> ResearchResult<String> {
        let request = self.validate(request)?;

        let session = self
            .store
            .create(
                request.query.clone(),
                request.breadth,
                request.depth,
                request.model.clone(),
            )
            .await;
        let session_id = session.id.clone();

        self.hub.open(&session_id).await;
        let cancel = CancellationToken::new();
        self.runs
            .write()
            .await
            .insert(session_id.clone(), cancel.clone());

        let service = self.clone();
        let run_id = session_id.clone();
        tokio::spawn(async move {
            service.drive(run_id, request, cancel).await;
        });

        Ok(session_id)
    }

    pub async fn get(&self, session_id: &str) -> ResearchResult<ResearchSession> {
        self.store.get(session_id).await
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        self.store.list_all().await
    }

    /// Request cooperative cancellation of a pending or running session
    pub async fn cancel(&self, session_id: &str) -> ResearchResult<()> {
        let session = self.store.get(session_id).await?;
        if session.status.is_terminal() {
            return Err(ResearchError::InvalidTransition {
                session_id: session_id.to_string(),
                from: session.status,
                to: SessionStatus::Error,
            });
        }

        if let Some(token) = self.runs.read().await.get(session_id) {
            info!(session_id = %session_id, "Cancelling research session");
            token.cancel();
        }
        Ok(())
    }

    /// Cancel any work, forget the session, and close its progress stream
    pub async fn delete(&self, session_id: &str) -> ResearchResult<()> {
        if let Some(token) = self.runs.write().await.remove(session_id) {
            token.cancel();
        }
        self.hub.remove(session_id).await;

        if self.store.delete(session_id).await {
            info!(session_id = %session_id, "Deleted research session");
            Ok(())
        } else {
            Err(ResearchError::not_found(session_id))
        }
    }

    /// Replay plus live progress for a session.
    ///
    /// Once a session is terminal its stream is gone; late subscribers get the
    /// stored terminal event and an already closed live feed.
    pub async fn subscribe(&self, session_id: &str) -> ResearchResult<ProgressSubscription> {
        let session = self.store.get(session_id).await?;

        if let Some(subscription) = self.hub.subscribe(session_id).await {
            return Ok(subscription);
        }

        let replay = match session.progress {
            Some(event) if event.is_terminal() => vec![event],
            Some(event) => {
                warn!(session_id = %session_id, "Live session has no progress stream");
                vec![event]
            }
            None => Vec::new(),
        };
        Ok(ProgressSubscription::closed(replay))
    }

    /// Periodically evict expired sessions along with their streams and runs
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        service.sweep().await;
                    }
                }
            }
            debug!("Session sweeper stopped");
        })
    }

    /// One eviction pass; returns the evicted ids
    pub async fn sweep(&self) -> Vec<String> {
        let evicted = self.store.sweep_expired().await;
        for session_id in &evicted {
            if let Some(token) = self.runs.write().await.remove(session_id) {
                token.cancel();
            }
            self.hub.remove(session_id).await;
        }
        if !evicted.is_empty() {
            info!("Evicted {} expired research sessions", evicted.len());
        }
        evicted
    }

    /// Cancel every running session
    pub async fn shutdown(&self) {
        let runs = self.runs.read().await;
        for token in runs.values() {
            token.cancel();
        }
    }

    fn validate(&self, request: ResearchRequest) -> ResearchResult<ValidatedRequest> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(ResearchError::validation("query", "query must not be empty"));
        }
        if query.chars().count() > self.settings.max_query_chars {
            return Err(ResearchError::validation(
                "query",
                format!(
                    "query must be at most {} characters",
                    self.settings.max_query_chars
                ),
            ));
        }

        let breadth_range = self.settings.min_breadth..=self.settings.max_breadth;
        if !breadth_range.contains(&request.breadth) {
            return Err(ResearchError::validation(
                "breadth",
                format!(
                    "breadth must be between {} and {}",
                    breadth_range.start(),
                    breadth_range.end()
                ),
            ));
        }

        let depth_range = self.settings.min_depth..=self.settings.max_depth;
        if !depth_range.contains(&request.depth) {
            return Err(ResearchError::validation(
                "depth",
                format!(
                    "depth must be between {} and {}",
                    depth_range.start(),
                    depth_range.end()
                ),
            ));
        }

        Ok(ValidatedRequest {
            query,
            breadth: request.breadth,
            depth: request.depth,
            model: request
                .model
                .unwrap_or_else(|| self.default_model.clone()),
        })
    }

    /// Run one session to a terminal state
    async fn drive(&self, session_id: String, request: ValidatedRequest, cancel: CancellationToken) {
        let started_at = Utc::now();

        if let Err(e) = self
            .store
            .set_status(&session_id, SessionStatus::Running)
            .await
        {
            debug!(session_id = %session_id, error = %e, "Session gone before start");
            self.runs.write().await.remove(&session_id);
            return;
        }

        let mut aggregator =
            ProgressAggregator::new(session_id.clone(), request.breadth, request.depth);
        let started = aggregator.started();
        let _ = self.store.set_progress(&session_id, started.clone()).await;
        self.hub.publish(started).await;

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let aggregation = tokio::spawn(aggregator.run(
            progress_rx,
            Arc::clone(&self.store),
            Arc::clone(&self.hub),
        ));

        let ctx = RunContext::new(
            session_id.clone(),
            request.model.clone(),
            request.depth,
            cancel,
            progress_tx,
        );

        let task = ResearchTask::root(request.query.clone(), request.breadth, request.depth);
        let tree = performance::measure_async("research_tree", self.engine.research(&ctx, task))
            .await;

        let outcome = match tree {
            Ok(branch) => {
                let report = performance::measure_async(
                    "write_report",
                    self.engine.write_report(&ctx, &request.query, &branch),
                )
                .await;
                (Some(branch), report)
            }
            Err(e) => (None, Err(e)),
        };

        // Closing the last sender lets the aggregator drain and stop
        drop(ctx);
        let mut aggregator = match aggregation.await {
            Ok(aggregator) => aggregator,
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Progress aggregator failed");
                ProgressAggregator::new(session_id.clone(), request.breadth, request.depth)
            }
        };

        self.finish(&session_id, started_at, &mut aggregator, outcome)
            .await;
        self.runs.write().await.remove(&session_id);
    }

    async fn finish(
        &self,
        session_id: &str,
        started_at: chrono::DateTime<Utc>,
        aggregator: &mut ProgressAggregator,
        outcome: (Option<BranchResult>, ResearchResult<String>),
    ) {
        let (branch, report) = outcome;
        let branch = branch.unwrap_or_default();

        let recorded = match report {
            Ok(report) => {
                info!(
                    session_id = %session_id,
                    learnings = branch.learnings.len(),
                    urls = branch.visited_urls.len(),
                    "Research completed"
                );
                let summary = ResearchSummary {
                    success: true,
                    learnings: branch.learnings,
                    visited_urls: branch.visited_urls,
                    report: Some(report),
                    error: None,
                    started_at,
                    completed_at: Some(Utc::now()),
                };
                let event = aggregator.finish(SessionStatus::Completed, None);
                self.store
                    .set_result(session_id, summary, event.clone())
                    .await
                    .map(|_| event)
            }
            Err(e) => {
                let message = e.to_string();
                error!(session_id = %session_id, error = %message, "Research failed");
                let summary = ResearchSummary {
                    success: false,
                    learnings: branch.learnings,
                    visited_urls: branch.visited_urls,
                    report: None,
                    error: Some(message.clone()),
                    started_at,
                    completed_at: Some(Utc::now()),
                };
                let event = aggregator.finish(SessionStatus::Error, Some(message.clone()));
                self.store
                    .set_error(session_id, message, Some(summary), event.clone())
                    .await
                    .map(|_| event)
            }
        };

        match recorded {
            Ok(event) => self.hub.publish(event).await,
            Err(e) => {
                debug!(session_id = %session_id, error = %e, "Session gone before finish");
                self.hub.remove(session_id).await;
            }
        }
    }
}
