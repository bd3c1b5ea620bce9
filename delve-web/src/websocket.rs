//! WebSocket progress stream
//!
//! Each connection follows one session: buffered events are replayed first,
//! then live events are forwarded until the terminal event, after which the
//! server closes the socket.

use crate::{AppState, WebResult};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use delve_research::{ProgressEvent, ProgressSubscription, SessionStatus};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Messages sent to WebSocket clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Intermediate progress
    Progress { event: ProgressEvent },
    /// Session finished successfully; the socket closes next
    Completed { event: ProgressEvent },
    /// Session failed or was cancelled; the socket closes next
    Error { event: ProgressEvent },
}

impl From<ProgressEvent> for WsMessage {
    fn from(event: ProgressEvent) -> Self {
        match event.status {
            SessionStatus::Completed => WsMessage::Completed { event },
            SessionStatus::Error => WsMessage::Error { event },
            SessionStatus::Pending | SessionStatus::Running => WsMessage::Progress { event },
        }
    }
}

/// Upgrade to a progress socket for one session.
///
/// Unknown sessions are rejected before the upgrade with a 404.
pub async fn research_progress_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> WebResult<Response> {
    let subscription = state.research.subscribe(&session_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_progress_socket(socket, session_id, subscription)))
}

async fn handle_progress_socket(
    mut socket: WebSocket,
    session_id: String,
    subscription: ProgressSubscription,
) {
    info!(session_id = %session_id, "Progress WebSocket connected");
    let mut events = subscription.into_stream();

    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    debug!(session_id = %session_id, "Progress stream ended");
                    break;
                };
                let terminal = event.is_terminal();

                match serde_json::to_string(&WsMessage::from(event)) {
                    Ok(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            info!(session_id = %session_id, "Client disconnected during progress");
                            return;
                        }
                    }
                    Err(e) => error!(session_id = %session_id, error = %e, "Failed to encode progress"),
                }

                if terminal {
                    break;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!(session_id = %session_id, "Progress WebSocket closed by client");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        error!(session_id = %session_id, error = %e, "Progress WebSocket error");
                        return;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = socket.send(Message::Close(None)).await;
    info!(session_id = %session_id, "Progress WebSocket terminated");
}
