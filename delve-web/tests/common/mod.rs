//! Test app wiring with scripted providers

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use delve_core::{
    DelveConfig, DelveError, DelveResult, ErrorContext, GenerationRequest, SearchDocument,
    SearchProvider, TextGenerator,
};
use delve_research::prompts::{EXTRACTOR_SCHEMA, PLANNER_SCHEMA, REPORT_SCHEMA};
use delve_research::ResearchService;
use delve_web::{create_app, AppState, WebConfig};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Plans `query-N` queries and answers every extraction the same way
#[derive(Default)]
pub struct ScriptedGenerator {
    pub next_query: AtomicUsize,
    pub delay: Duration,
    pub fail_report: bool,
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> DelveResult<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match request.schema.name() {
            PLANNER_SCHEMA => {
                let queries: Vec<Value> = (0..2)
                    .map(|_| {
                        let id = self.next_query.fetch_add(1, Ordering::SeqCst) + 1;
                        json!({
                            "query": format!("query-{}", id),
                            "researchGoal": format!("goal for query-{}", id),
                        })
                    })
                    .collect();
                Ok(json!({ "queries": queries }).to_string())
            }
            EXTRACTOR_SCHEMA => Ok(json!({
                "learnings": ["tokio uses a work-stealing scheduler"],
                "followUpQuestions": ["how does the LIFO slot work?"],
            })
            .to_string()),
            REPORT_SCHEMA if self.fail_report => Err(DelveError::Llm {
                message: "report writer unavailable".to_string(),
                provider: None,
                model: None,
                context: ErrorContext::new("scripted_generator"),
            }),
            REPORT_SCHEMA => Ok("# Report\n\nTokio steals work.".to_string()),
            other => Err(DelveError::Internal {
                message: format!("unexpected schema {}", other),
                source: None,
                context: ErrorContext::new("scripted_generator"),
            }),
        }
    }
}

/// Returns one page per query
#[derive(Default)]
pub struct ScriptedSearch;

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(
        &self,
        query: &str,
        _limit: usize,
        _timeout: Duration,
    ) -> DelveResult<Vec<SearchDocument>> {
        Ok(vec![SearchDocument::new(
            format!("https://docs.example/{}", query),
            format!("Notes about {}.", query),
        )])
    }
}

pub fn test_state(generator: ScriptedGenerator) -> AppState {
    let mut config = DelveConfig::default();
    config.research.retry_attempts = 1;
    config.search.timeout_ms = 500;

    let research =
        ResearchService::new(&config, Arc::new(generator), Arc::new(ScriptedSearch)).unwrap();
    AppState::new(WebConfig::default(), research)
}

pub fn test_app(generator: ScriptedGenerator) -> Router {
    create_app(test_state(generator))
}

/// Send one request and decode the JSON body
pub async fn send(app: &Router, request: Request<Body>) -> (axum::http::StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Poll until the session reaches a terminal status
pub async fn wait_for_terminal(app: &Router, session_id: &str) -> Value {
    for _ in 0..200 {
        let (_, body) = send(app, get(&format!("/api/research/{}", session_id))).await;
        if body["status"] == "completed" || body["status"] == "error" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("session {} never finished", session_id);
}
