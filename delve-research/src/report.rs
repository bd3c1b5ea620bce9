//! Final report writing

use crate::budget::PromptBudgeter;
use crate::prompts;
use crate::{ResearchError, ResearchResult};
use delve_core::{retry_async, GenerationRequest, ModelSelection, RetryConfig, TextGenerator};
use std::sync::Arc;
use tracing::info;

/// Writes the markdown report for a finished research tree
pub struct ReportWriter {
    generator: Arc<dyn TextGenerator>,
    budgeter: PromptBudgeter,
    context_token_budget: usize,
    retry: RetryConfig,
}

impl ReportWriter {
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

    /// Generate the report and append a `## Sources` section
    pub async fn write(
        &self,
        model: &ModelSelection,
        query: &str,
        learnings: &[String],
        visited_urls: &[String],
    ) -> ResearchResult<String> {
        info!(
            learnings = learnings.len(),
            sources = visited_urls.len(),
            "Writing final report"
        );

        let learnings = self.budgeter.trim_joined(
            &prompts::format_learnings(learnings),
            self.context_token_budget,
        );

        let request = GenerationRequest {
            model: model.clone(),
            system_prompt: prompts::system_prompt(),
            user_prompt: prompts::report_prompt(query, &learnings),
            schema: prompts::report_schema(),
        };

        let body = retry_async(
            || self.generator.generate(request.clone()),
            &self.retry,
            "write_report",
        )
        .await
        .map_err(|e| ResearchError::report(e.to_string()))?;

        if body.trim().is_empty() {
            return Err(ResearchError::report("empty report"));
        }

        Ok(with_sources(&body, visited_urls))
    }
}

fn with_sources(body: &str, visited_urls: &[String]) -> String {
    let mut report = body.trim_end().to_string();
    report.push_str("\n\n## Sources\n\n");
    for url in visited_urls {
        report.push_str(&format!("- {}\n", url));
    }
    report
}
