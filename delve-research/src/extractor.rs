//! Learning extraction from search results

use crate::budget::PromptBudgeter;
use crate::planner::parse_json_response;
use crate::prompts;
use crate::types::{extend_unique, LearningBatch, SerpQuery};
use crate::{ResearchError, ResearchResult};
use delve_core::{
    retry_async, GenerationRequest, ModelSelection, RetryConfig, SearchDocument, TextGenerator,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractorOutput {
    #[serde(default)]
    learnings: Vec<String>,
    #[serde(default)]
    follow_up_questions: Vec<String>,
}

/// Turns the documents found for one query into a bounded [`LearningBatch`]
pub struct LearningExtractor {
    generator: Arc<dyn TextGenerator>,
    budgeter: PromptBudgeter,
    content_token_budget: usize,
    max_learnings: usize,
    max_follow_ups: usize,
    retry: RetryConfig,
}

impl LearningExtractor {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        budgeter: PromptBudgeter,
        content_token_budget: usize,
        max_learnings: usize,
        max_follow_ups: usize,
    ) -> Self {
        Self {
            generator,
            budgeter,
            content_token_budget,
            max_learnings,
            max_follow_ups,
            retry: RetryConfig::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Extract learnings for `query` from its search documents.
    ///
    /// No documents means no learnings and no generation call.
    pub async fn extract(
        &self,
        model: &ModelSelection,
        query: &SerpQuery,
        documents: &[SearchDocument],
    ) -> ResearchResult<LearningBatch> {
        if documents.is_empty() {
            return Ok(LearningBatch::default());
        }

        let mut source_urls = Vec::new();
        extend_unique(
            &mut source_urls,
            documents.iter().map(|document| document.url.clone()),
        );

        let contents: Vec<String> = documents
            .iter()
            .map(|document| self.budgeter.trim(&document.content, self.content_token_budget))
            .collect();

        let request = GenerationRequest {
            model: model.clone(),
            system_prompt: prompts::system_prompt(),
            user_prompt: prompts::extractor_prompt(&query.query, &contents, self.max_learnings),
            schema: prompts::extractor_schema(self.max_learnings, self.max_follow_ups),
        };

        let raw = retry_async(
            || self.generator.generate(request.clone()),
            &self.retry,
            "extract_learnings",
        )
        .await
        .map_err(|e| ResearchError::extraction(&query.query, e.to_string()))?;

        let output: ExtractorOutput = parse_json_response(&raw).map_err(|e| {
            ResearchError::extraction(&query.query, format!("unparsable extractor output: {}", e))
        })?;

        let batch = LearningBatch {
            learnings: bounded_unique(output.learnings, self.max_learnings),
            follow_up_questions: bounded_unique(output.follow_up_questions, self.max_follow_ups),
            source_urls,
        };

        debug!(
            query = %query.query,
            learnings = batch.learnings.len(),
            follow_ups = batch.follow_up_questions.len(),
            sources = batch.source_urls.len(),
            "Extracted learnings"
        );

        Ok(batch)
    }
}

fn bounded_unique(items: Vec<String>, limit: usize) -> Vec<String> {
    let mut unique = Vec::new();
    extend_unique(
        &mut unique,
        items
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty()),
    );
    unique.truncate(limit);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_unique() {
        let items = vec![
            "Tokio uses work stealing.".to_string(),
            " Tokio uses work stealing. ".to_string(),
            "".to_string(),
            "async-std is discontinued.".to_string(),
            "smol is small.".to_string(),
        ];
        assert_eq!(
            bounded_unique(items, 2),
            vec!["Tokio uses work stealing.", "async-std is discontinued."]
        );
    }
}
