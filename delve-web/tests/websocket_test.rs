//! WebSocket progress stream against a live listener

mod common;

use common::{test_state, ScriptedGenerator};
use delve_research::ResearchRequest;
use delve_web::create_app;
use futures::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn spawn_app(generator: ScriptedGenerator) -> (SocketAddr, delve_web::AppState) {
    let state = test_state(generator);
    let app = create_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (address, state)
}

#[tokio::test]
async fn test_socket_streams_until_terminal_event() {
    let (address, state) = spawn_app(ScriptedGenerator {
        delay: Duration::from_millis(20),
        ..ScriptedGenerator::default()
    })
    .await;
    let session_id = state
        .research
        .start(ResearchRequest::new("rust async", 2, 2))
        .await
        .unwrap();

    let (mut socket, _) = connect_async(format!("ws://{}/ws/research/{}", address, session_id))
        .await
        .unwrap();

    let mut messages = Vec::new();
    let mut closed = false;
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(10), socket.next()).await {
        match frame.unwrap() {
            Message::Text(text) => messages.push(serde_json::from_str::<Value>(text.as_str()).unwrap()),
            Message::Close(_) => {
                closed = true;
                break;
            }
            _ => {}
        }
    }

    assert!(closed, "server should close the socket after the terminal event");
    let last = messages.last().unwrap();
    assert_eq!(last["type"], "completed");
    assert_eq!(last["event"]["percentage"], 100.0);
    assert_eq!(
        messages
            .iter()
            .filter(|message| message["type"] != "progress")
            .count(),
        1
    );

    let percentages: Vec<f64> = messages
        .iter()
        .map(|message| message["event"]["percentage"].as_f64().unwrap())
        .collect();
    assert!(percentages.windows(2).all(|pair| pair[1] >= pair[0]));
}

#[tokio::test]
async fn test_socket_for_finished_session_gets_terminal_event() {
    let (address, state) = spawn_app(ScriptedGenerator::default()).await;
    let session_id = state
        .research
        .start(ResearchRequest::new("rust async", 2, 1))
        .await
        .unwrap();

    for _ in 0..200 {
        if state.research.get(&session_id).await.unwrap().status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (mut socket, _) = connect_async(format!("ws://{}/ws/research/{}", address, session_id))
        .await
        .unwrap();

    let mut last = None;
    while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_secs(5), socket.next()).await {
        match frame.unwrap() {
            Message::Text(text) => last = Some(serde_json::from_str::<Value>(text.as_str()).unwrap()),
            Message::Close(_) => break,
            _ => {}
        }
    }
    assert_eq!(last.unwrap()["type"], "completed");
}

#[tokio::test]
async fn test_socket_for_unknown_session_is_rejected() {
    let (address, _) = spawn_app(ScriptedGenerator::default()).await;

    let result = connect_async(format!("ws://{}/ws/research/missing", address)).await;
    assert!(result.is_err());
}
