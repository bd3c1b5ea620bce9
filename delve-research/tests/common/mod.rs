//! Scripted providers shared by the research tests

#![allow(dead_code)]

use async_trait::async_trait;
use delve_core::{
    DelveConfig, DelveError, DelveResult, ErrorContext, GenerationRequest, OutputSchema,
    SearchDocument, SearchProvider, TextGenerator,
};
use delve_research::prompts::{EXTRACTOR_SCHEMA, PLANNER_SCHEMA, REPORT_SCHEMA};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Text generator that answers by output schema.
///
/// Planned queries are numbered in call order (`query-1`, `query-2`, ...),
/// so the root branch always plans `query-1..=breadth`.
#[derive(Default)]
pub struct MockGenerator {
    pub next_query: AtomicUsize,
    pub planner_prompts: Mutex<Vec<String>>,
    pub report_calls: AtomicUsize,
    /// Plan at most this many queries regardless of the requested breadth
    pub max_planned: Option<usize>,
    /// Planner fails when its prompt contains this text
    pub fail_planner_on: Option<String>,
    /// Extractor fails for this query
    pub fail_extraction_on: Option<String>,
    pub fail_report: bool,
    pub delay: Duration,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn planner_prompts(&self) -> Vec<String> {
        self.planner_prompts.lock().unwrap().clone()
    }

    fn llm_error(message: &str) -> DelveError {
        DelveError::Llm {
            message: message.to_string(),
            provider: Some("mock".to_string()),
            model: Some("mock-model".to_string()),
            context: ErrorContext::new("mock_generator"),
        }
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> DelveResult<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match request.schema.name() {
            PLANNER_SCHEMA => {
                self.planner_prompts
                    .lock()
                    .unwrap()
                    .push(request.user_prompt.clone());

                if let Some(marker) = &self.fail_planner_on {
                    if request.user_prompt.contains(marker.as_str()) {
                        return Err(Self::llm_error("planner unavailable"));
                    }
                }

                let requested = max_items(&request.schema);
                let count = self.max_planned.map_or(requested, |cap| cap.min(requested));
                let queries: Vec<_> = (0..count)
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
            EXTRACTOR_SCHEMA => {
                let query = between(&request.user_prompt, "<query>", "</query>");
                if self.fail_extraction_on.as_deref() == Some(query.as_str()) {
                    return Err(Self::llm_error("extractor unavailable"));
                }
                Ok(json!({
                    "learnings": [format!("learning about {}", query), "shared learning"],
                    "followUpQuestions": [format!("what comes after {}?", query)],
                })
                .to_string())
            }
            REPORT_SCHEMA => {
                self.report_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_report {
                    return Err(Self::llm_error("report writer unavailable"));
                }
                Ok("# Final report\n\nEverything we learned.".to_string())
            }
            other => Err(Self::llm_error(&format!("unexpected schema {}", other))),
        }
    }
}

fn max_items(schema: &OutputSchema) -> usize {
    match schema {
        OutputSchema::Json { schema, .. } => schema["properties"]["queries"]["maxItems"]
            .as_u64()
            .unwrap_or(1) as usize,
        OutputSchema::Text { .. } => 0,
    }
}

fn between(text: &str, start: &str, end: &str) -> String {
    text.split_once(start)
        .and_then(|(_, rest)| rest.split_once(end))
        .map(|(inner, _)| inner.to_string())
        .unwrap_or_default()
}

/// Search provider that tracks concurrency and can stall or throttle chosen
/// queries
#[derive(Default)]
pub struct MockSearch {
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
    pub delay: Duration,
    /// Queries that never answer in time
    pub stall_on: Vec<String>,
    /// Queries answered with a rate-limit rejection
    pub rate_limit_on: Vec<String>,
}

impl MockSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(
        &self,
        query: &str,
        _limit: usize,
        _timeout: Duration,
    ) -> DelveResult<Vec<SearchDocument>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.peak.fetch_max(now, Ordering::SeqCst);

        if self.rate_limit_on.iter().any(|throttled| throttled == query) {
            return Err(DelveError::RateLimit {
                message: "search provider returned 429 Too Many Requests".to_string(),
                retry_after_ms: Some(1_000),
                context: ErrorContext::new("mock_search"),
            });
        }

        if self.stall_on.iter().any(|stalled| stalled == query) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        } else if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        Ok(vec![
            SearchDocument::new("https://shared.example/overview", "Shared background."),
            SearchDocument::new(
                format!("https://example.com/{}", query),
                format!("Details about {}.", query),
            ),
        ])
    }
}

/// Config tuned for fast tests
pub fn test_config(concurrency_limit: usize) -> DelveConfig {
    let mut config = DelveConfig::default();
    config.research.concurrency_limit = concurrency_limit;
    config.research.retry_attempts = 1;
    config.research.replay_buffer_size = 256;
    config.search.timeout_ms = 200;
    config
}
