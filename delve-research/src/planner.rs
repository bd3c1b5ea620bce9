//! Query planning

use crate::budget::PromptBudgeter;
use crate::prompts;
use crate::types::SerpQuery;
use crate::{ResearchError, ResearchResult};
use delve_core::{retry_async, GenerationRequest, ModelSelection, RetryConfig, TextGenerator};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct PlannerOutput {
    #[serde(default)]
    queries: Vec<SerpQuery>,
}

/// Asks a text generator for distinct search queries on a topic
pub struct QueryPlanner {
    generator: Arc<dyn TextGenerator>,
    budgeter: PromptBudgeter,
    context_token_budget: usize,
    retry: RetryConfig,
}

impl QueryPlanner {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        budgeter: PromptBudgeter,
        context_token_budget: usize,
    ) -> Self {
        Self {
            generator,
            budgeter,
            context_token_budget,
            retry: RetryConfig::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Plan at most `num_queries` distinct queries for `topic`.
    ///
    /// A failed or unparsable generation is a [`ResearchError::Planner`].
    pub async fn plan(
        &self,
        model: &ModelSelection,
        topic: &str,
        num_queries: usize,
        prior_learnings: &[String],
    ) -> ResearchResult<Vec<SerpQuery>> {
        info!(
            topic = %topic,
            num_queries = num_queries,
            prior_learnings = prior_learnings.len(),
            "Planning search queries"
        );

        let learnings = if prior_learnings.is_empty() {
            String::new()
        } else {
            self.budgeter.trim_joined(
                &prompts::format_learnings(prior_learnings),
                self.context_token_budget,
            )
        };

        let request = GenerationRequest {
            model: model.clone(),
            system_prompt: prompts::system_prompt(),
            user_prompt: prompts::planner_prompt(topic, num_queries, &learnings),
            schema: prompts::planner_schema(num_queries),
        };

        let raw = retry_async(
            || self.generator.generate(request.clone()),
            &self.retry,
            "plan_queries",
        )
        .await
        .map_err(|e| ResearchError::planner(e.to_string()))?;

        let output: PlannerOutput = parse_json_response(&raw)
            .map_err(|e| ResearchError::planner(format!("unparsable planner output: {}", e)))?;

        let queries = distinct_queries(output.queries, num_queries);
        debug!("Planned {} queries", queries.len());
        for query in &queries {
            debug!("  - {}", query.query);
        }

        Ok(queries)
    }
}

/// Drop blank and repeated queries (case- and whitespace-insensitive), then cap
fn distinct_queries(queries: Vec<SerpQuery>, limit: usize) -> Vec<SerpQuery> {
    let mut seen = HashSet::new();
    queries
        .into_iter()
        .filter_map(|mut query| {
            query.query = query.query.trim().to_string();
            query.research_goal = query.research_goal.trim().to_string();
            let key = query
                .query
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            (!key.is_empty() && seen.insert(key)).then_some(query)
        })
        .take(limit)
        .collect()
}

/// Parse a JSON object out of raw model output.
///
/// Models sometimes wrap the object in prose or a code fence, so parsing
/// falls back to the outermost `{ ... }` span.
pub(crate) fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    match serde_json::from_str(raw.trim()) {
        Ok(value) => Ok(value),
        Err(err) => match (raw.find('{'), raw.rfind('}')) {
            (Some(start), Some(end)) if end > start => serde_json::from_str(&raw[start..=end]),
            _ => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(text: &str) -> SerpQuery {
        SerpQuery {
            query: text.to_string(),
            research_goal: "goal".to_string(),
        }
    }

    #[test]
    fn test_distinct_queries_dedupes_and_caps() {
        let queries = vec![
            query("Rust async runtimes"),
            query("rust  async   runtimes"),
            query("   "),
            query("tokio scheduler internals"),
            query("smol executor design"),
        ];

        let distinct = distinct_queries(queries, 2);
        assert_eq!(distinct.len(), 2);
        assert_eq!(distinct[0].query, "Rust async runtimes");
        assert_eq!(distinct[1].query, "tokio scheduler internals");
    }

    #[test]
    fn test_parse_json_response_handles_fences() {
        let raw = "Here you go:\n```json\n{\"queries\": [{\"query\": \"a\", \"researchGoal\": \"b\"}]}\n```";
        let output: PlannerOutput = parse_json_response(raw).unwrap();
        assert_eq!(output.queries.len(), 1);
        assert_eq!(output.queries[0].research_goal, "b");

        assert!(parse_json_response::<PlannerOutput>("no json here").is_err());
    }
}
