//! Progress aggregation and streaming
//!
//! Branches send [`ProgressSignal`]s into one channel per session. A single
//! [`ProgressAggregator`] task owns the session's counters, so concurrent
//! branches never race on them. Every resulting [`ProgressEvent`] is recorded
//! in the [`SessionStore`] and fanned out by the [`ProgressHub`], which keeps
//! a bounded replay buffer for subscribers that attach late.

use crate::engine::total_queries;
use crate::session::SessionStore;
use crate::types::{percentage, ProgressEvent, SessionStatus};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Credit for settled work, sent by a branch
#[derive(Debug, Clone)]
pub struct ProgressSignal {
    /// 1-based recursion level of the sending branch
    pub level: usize,
    pub breadth: usize,
    pub query: Option<String>,
    /// Number of query slots this signal settles
    pub credit: u64,
}

/// Single owner of a session's progress counters
pub struct ProgressAggregator {
    session_id: String,
    total_depth: usize,
    total_breadth: usize,
    total_queries: u64,
    completed_queries: u64,
    last: Option<ProgressEvent>,
}

impl ProgressAggregator {
    pub fn new(session_id: impl Into<String>, breadth: usize, depth: usize) -> Self {
        Self {
            session_id: session_id.into(),
            total_depth: depth,
            total_breadth: breadth,
            total_queries: total_queries(breadth, depth),
            completed_queries: 0,
            last: None,
        }
    }

    pub fn total_queries(&self) -> u64 {
        self.total_queries
    }

    pub fn completed_queries(&self) -> u64 {
        self.completed_queries
    }

    /// The event marking the start of a run
    pub fn started(&mut self) -> ProgressEvent {
        let event = self.event(
            1,
            self.total_breadth,
            None,
            SessionStatus::Running,
            Some("research started".to_string()),
        );
        self.last = Some(event.clone());
        event
    }

    /// Fold one signal into the counters
    pub fn apply(&mut self, signal: ProgressSignal) -> ProgressEvent {
        self.completed_queries = self
            .completed_queries
            .saturating_add(signal.credit)
            .min(self.total_queries);

        let event = self.event(
            signal.level,
            signal.breadth,
            signal.query,
            SessionStatus::Running,
            None,
        );
        self.last = Some(event.clone());
        event
    }

    /// The terminal event. Completion settles every slot.
    pub fn finish(&mut self, status: SessionStatus, message: Option<String>) -> ProgressEvent {
        if status == SessionStatus::Completed {
            self.completed_queries = self.total_queries;
        }

        let (level, breadth) = self
            .last
            .as_ref()
            .map(|event| (event.current_depth, event.current_breadth))
            .unwrap_or((1, self.total_breadth));
        let mut event = self.event(level, breadth, None, status, message);
        if status == SessionStatus::Completed {
            event.percentage = 100.0;
        }
        self.last = Some(event.clone());
        event
    }

    /// Drain `signals` until every sender is gone
    pub async fn run(
        mut self,
        mut signals: mpsc::UnboundedReceiver<ProgressSignal>,
        store: Arc<SessionStore>,
        hub: Arc<ProgressHub>,
    ) -> Self {
        while let Some(signal) = signals.recv().await {
            let event = self.apply(signal);
            debug!(
                session_id = %self.session_id,
                completed = event.completed_queries,
                total = event.total_queries,
                percentage = event.percentage,
                "Progress"
            );

            if let Err(e) = store.set_progress(&self.session_id, event.clone()).await {
                debug!(session_id = %self.session_id, error = %e, "Progress not recorded");
            }
            hub.publish(event).await;
        }
        self
    }

    fn event(
        &self,
        level: usize,
        breadth: usize,
        query: Option<String>,
        status: SessionStatus,
        message: Option<String>,
    ) -> ProgressEvent {
        ProgressEvent {
            session_id: self.session_id.clone(),
            current_depth: level,
            total_depth: self.total_depth,
            current_breadth: breadth,
            total_breadth: self.total_breadth,
            current_query: query,
            total_queries: self.total_queries,
            completed_queries: self.completed_queries,
            status,
            percentage: percentage(self.completed_queries, self.total_queries),
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Replay history plus a live feed for one subscriber
pub struct ProgressSubscription {
    pub replay: Vec<ProgressEvent>,
    pub live: UnboundedReceiverStream<ProgressEvent>,
}

impl ProgressSubscription {
    /// A subscription whose live half is already closed
    pub fn closed(replay: Vec<ProgressEvent>) -> Self {
        let (_, receiver) = mpsc::unbounded_channel();
        Self {
            replay,
            live: UnboundedReceiverStream::new(receiver),
        }
    }

    /// Replay followed by live events as one stream
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send + Unpin {
        tokio_stream::iter(self.replay).chain(self.live)
    }
}

struct SessionChannel {
    replay: VecDeque<ProgressEvent>,
    sinks: Vec<mpsc::UnboundedSender<ProgressEvent>>,
}

/// Per-session subscriber registry with bounded replay
pub struct ProgressHub {
    channels: RwLock<HashMap<String, SessionChannel>>,
    replay_capacity: usize,
}

impl ProgressHub {
    pub fn new(replay_capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            replay_capacity: replay_capacity.max(1),
        }
    }

    /// Start tracking a session. Events for untracked sessions are dropped.
    pub async fn open(&self, session_id: &str) {
        let mut channels = self.channels.write().await;
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| SessionChannel {
                replay: VecDeque::with_capacity(self.replay_capacity),
                sinks: Vec::new(),
            });
    }

    /// Buffer `event` and deliver it to every live sink.
    ///
    /// Disconnected sinks are dropped. A terminal event closes all sinks and
    /// tears the session's registry down.
    pub async fn publish(&self, event: ProgressEvent) {
        let mut channels = self.channels.write().await;
        let Some(channel) = channels.get_mut(&event.session_id) else {
            debug!(session_id = %event.session_id, "Dropping event for untracked session");
            return;
        };

        if channel.replay.len() == self.replay_capacity {
            channel.replay.pop_front();
        }
        channel.replay.push_back(event.clone());
        channel.sinks.retain(|sink| sink.send(event.clone()).is_ok());

        if event.is_terminal() {
            debug!(
                session_id = %event.session_id,
                subscribers = channel.sinks.len(),
                "Closing progress stream"
            );
            channels.remove(&event.session_id);
        }
    }

    /// Attach a subscriber; `None` if the session is not tracked
    pub async fn subscribe(&self, session_id: &str) -> Option<ProgressSubscription> {
        let mut channels = self.channels.write().await;
        let channel = channels.get_mut(session_id)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        channel.sinks.push(sender);
        Some(ProgressSubscription {
            replay: channel.replay.iter().cloned().collect(),
            live: UnboundedReceiverStream::new(receiver),
        })
    }

    /// Stop tracking a session, closing its sinks
    pub async fn remove(&self, session_id: &str) -> bool {
        self.channels.write().await.remove(session_id).is_some()
    }

    pub async fn is_tracking(&self, session_id: &str) -> bool {
        self.channels.read().await.contains_key(session_id)
    }

    /// Live sinks for a session, pruning disconnected ones
    pub async fn subscriber_count(&self, session_id: &str) -> usize {
        let mut channels = self.channels.write().await;
        match channels.get_mut(session_id) {
            Some(channel) => {
                channel.sinks.retain(|sink| !sink.is_closed());
                channel.sinks.len()
            }
            None => 0,
        }
    }
}
