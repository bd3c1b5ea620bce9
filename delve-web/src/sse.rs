//! Server-Sent Events progress stream

use crate::handlers::ErrorResponse;
use crate::{AppState, WebResult};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use delve_research::{ProgressEvent, SessionStatus};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, warn};

/// Stream research progress
#[utoipa::path(
    get,
    path = "/api/research/{session_id}/events",
    tag = "Research",
    summary = "Stream research progress",
    description = "Replays buffered progress, then streams live events. The stream ends after the completed or error event.",
    params(
        ("session_id" = String, Path, description = "Research session ID")
    ),
    responses(
        (status = 200, description = "Progress events", content_type = "text/event-stream", body = ProgressEvent),
        (status = 404, description = "Session not found or expired", body = ErrorResponse)
    )
)]
pub async fn research_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> WebResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let subscription = state.research.subscribe(&session_id).await?;
    debug!(
        session_id = %session_id,
        replayed = subscription.replay.len(),
        "SSE subscriber attached"
    );

    let stream = subscription
        .into_stream()
        .map(|event| Ok::<_, Infallible>(to_sse_event(&event)));

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

/// Event name per status: `progress`, `completed`, or `error`
pub fn event_name(event: &ProgressEvent) -> &'static str {
    match event.status {
        SessionStatus::Completed => "completed",
        SessionStatus::Error => "error",
        SessionStatus::Pending | SessionStatus::Running => "progress",
    }
}

fn to_sse_event(event: &ProgressEvent) -> Event {
    let name = event_name(event);
    match Event::default().event(name).json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            warn!(session_id = %event.session_id, error = %e, "Failed to encode progress event");
            Event::default().event(name).data("{}")
        }
    }
}
