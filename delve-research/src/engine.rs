//! Recursive research scheduler
//!
//! Each branch plans up to `breadth` queries, runs them concurrently, and
//! for every query that produced a batch recurses into a child branch with
//! `next_breadth(breadth)` and `depth - 1`. All search calls in the tree draw
//! from one [`ConcurrencyPool`]; recursion itself holds no slot.
//!
//! Progress is accounted against the static tree: a branch at `(b, d)` owns
//! [`total_queries`]`(b, d)` slots and settles every one of them exactly
//! once, whether a slot ran, degraded, or was never planned.

use crate::budget::PromptBudgeter;
use crate::extractor::LearningExtractor;
use crate::planner::QueryPlanner;
use crate::progress::ProgressSignal;
use crate::prompts;
use crate::report::ReportWriter;
use crate::types::{extend_unique, BranchResult, LearningBatch, ResearchTask, SerpQuery};
use crate::{ResearchError, ResearchResult};
use delve_core::{
    retry_async, with_timeout, ConcurrencyPool, DelveConfig, ModelSelection, RetryConfig,
    SearchDocument, SearchProvider, TextGenerator,
};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Breadth of a child branch: `max(1, ceil(breadth / 2))`
pub fn next_breadth(breadth: usize) -> usize {
    breadth.div_ceil(2).max(1)
}

/// Queries the full static tree rooted at `(breadth, depth)` would run.
///
/// `Q(b, 1) = b` and `Q(b, d) = b * (1 + Q(next_breadth(b), d - 1))`.
pub fn total_queries(breadth: usize, depth: usize) -> u64 {
    if breadth == 0 || depth == 0 {
        return 0;
    }
    (breadth as u64).saturating_mul(slot_cost(breadth, depth))
}

/// One query slot plus the subtree it would seed
fn slot_cost(breadth: usize, depth: usize) -> u64 {
    1u64.saturating_add(total_queries(next_breadth(breadth), depth.saturating_sub(1)))
}

/// Per-session state threaded through every branch
pub struct RunContext {
    pub session_id: String,
    pub model: ModelSelection,
    /// Depth of the root task, used to turn remaining depth into a level
    pub root_depth: usize,
    pub cancel: CancellationToken,
    progress: mpsc::UnboundedSender<ProgressSignal>,
}

impl RunContext {
    pub fn new(
        session_id: impl Into<String>,
        model: ModelSelection,
        root_depth: usize,
        cancel: CancellationToken,
        progress: mpsc::UnboundedSender<ProgressSignal>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            model,
            root_depth,
            cancel,
            progress,
        }
    }

    /// 1-based level of a branch with `depth` remaining
    fn level(&self, depth: usize) -> usize {
        self.root_depth.saturating_sub(depth) + 1
    }

    fn settle(&self, level: usize, breadth: usize, query: Option<String>, credit: u64) {
        if credit == 0 {
            return;
        }
        // The aggregator only goes away once the run is over
        let _ = self.progress.send(ProgressSignal {
            level,
            breadth,
            query,
            credit,
        });
    }
}

/// Run `operation` unless the run is cancelled first
async fn guarded<F, T>(cancel: &CancellationToken, operation: F) -> ResearchResult<T>
where
    F: Future<Output = ResearchResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(ResearchError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ResearchError::Cancelled),
        result = operation => result,
    }
}

/// Recursive scheduler over the planner, search provider, and extractor
pub struct ResearchEngine {
    planner: QueryPlanner,
    extractor: LearningExtractor,
    report_writer: ReportWriter,
    search: Arc<dyn SearchProvider>,
    pool: ConcurrencyPool,
    result_limit: usize,
    search_timeout_ms: u64,
    retry: RetryConfig,
}

impl ResearchEngine {
    pub fn new(
        config: &DelveConfig,
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn SearchProvider>,
    ) -> ResearchResult<Self> {
        let settings = &config.research;
        let budgeter =
            PromptBudgeter::for_model(&settings.tokenizer_model, settings.min_chunk_chars)?;
        let retry = RetryConfig::with_attempts(settings.retry_attempts);

        let planner = QueryPlanner::new(
            Arc::clone(&generator),
            budgeter.clone(),
            settings.context_token_budget,
        )
        .with_retry(retry.clone());
        let extractor = LearningExtractor::new(
            Arc::clone(&generator),
            budgeter.clone(),
            settings.content_token_budget,
            settings.max_learnings_per_query,
            settings.max_follow_up_questions,
        )
        .with_retry(retry.clone());
        let report_writer = ReportWriter::new(generator, budgeter, settings.context_token_budget)
            .with_retry(retry.clone());

        Ok(Self {
            planner,
            extractor,
            report_writer,
            search,
            pool: ConcurrencyPool::new(settings.concurrency_limit),
            result_limit: config.search.result_limit,
            search_timeout_ms: config.search.timeout_ms,
            retry,
        })
    }

    pub fn pool(&self) -> &ConcurrencyPool {
        &self.pool
    }

    /// Research `task` and everything below it
    pub async fn research(
        &self,
        ctx: &RunContext,
        task: ResearchTask,
    ) -> ResearchResult<BranchResult> {
        self.branch(ctx, task).await
    }

    /// Write the final report for a finished tree
    pub async fn write_report(
        &self,
        ctx: &RunContext,
        query: &str,
        result: &BranchResult,
    ) -> ResearchResult<String> {
        guarded(
            &ctx.cancel,
            self.report_writer
                .write(&ctx.model, query, &result.learnings, &result.visited_urls),
        )
        .await
    }

    fn branch<'a>(
        &'a self,
        ctx: &'a RunContext,
        task: ResearchTask,
    ) -> BoxFuture<'a, ResearchResult<BranchResult>> {
        async move {
            if task.depth == 0 {
                return Ok(BranchResult::default());
            }

            let level = ctx.level(task.depth);
            info!(
                session_id = %ctx.session_id,
                depth = level,
                breadth = task.breadth,
                query = %task.query,
                "Starting research branch"
            );

            let queries = guarded(
                &ctx.cancel,
                self.planner
                    .plan(&ctx.model, &task.query, task.breadth, &task.learnings),
            )
            .await?;

            let unplanned = task.breadth.saturating_sub(queries.len()) as u64;
            ctx.settle(
                level,
                task.breadth,
                None,
                unplanned.saturating_mul(slot_cost(task.breadth, task.depth)),
            );

            let outcomes = join_all(
                queries
                    .into_iter()
                    .map(|query| self.run_query(ctx, &task, query)),
            )
            .await;

            let mut merged = BranchResult::default();
            for outcome in outcomes {
                merged.merge(outcome?);
            }

            debug!(
                session_id = %ctx.session_id,
                depth = level,
                learnings = merged.learnings.len(),
                urls = merged.visited_urls.len(),
                "Branch finished"
            );
            Ok(merged)
        }
        .boxed()
    }

    /// Search, extract, and recurse for one planned query.
    ///
    /// Only fatal errors escape. Search, extraction and child-branch
    /// failures are absorbed here.
    async fn run_query(
        &self,
        ctx: &RunContext,
        task: &ResearchTask,
        query: SerpQuery,
    ) -> ResearchResult<BranchResult> {
        let level = ctx.level(task.depth);
        let child_breadth = next_breadth(task.breadth);
        let child_cost = total_queries(child_breadth, task.depth - 1);

        let batch = match self.process_query(ctx, &query).await {
            Ok(batch) => batch,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    session_id = %ctx.session_id,
                    depth = level,
                    query = %query.query,
                    error = %e,
                    "Query degraded to an empty batch"
                );
                ctx.settle(
                    level,
                    task.breadth,
                    Some(query.query),
                    1u64.saturating_add(child_cost),
                );
                return Ok(BranchResult::default());
            }
        };

        ctx.settle(level, task.breadth, Some(query.query.clone()), 1);
        let mut result = BranchResult::from_batch(&batch);

        if task.depth > 1 {
            let mut learnings = task.learnings.clone();
            extend_unique(&mut learnings, batch.learnings.iter().cloned());

            let child = ResearchTask {
                query: prompts::follow_up_query(&query.research_goal, &batch.follow_up_questions),
                breadth: child_breadth,
                depth: task.depth - 1,
                learnings,
            };

            match self.branch(ctx, child).await {
                Ok(child_result) => result.merge(child_result),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    error!(
                        session_id = %ctx.session_id,
                        depth = level + 1,
                        query = %query.query,
                        error = %e,
                        "Follow-up branch failed"
                    );
                    ctx.settle(level + 1, child_breadth, None, child_cost);
                }
            }
        }

        Ok(result)
    }

    async fn process_query(
        &self,
        ctx: &RunContext,
        query: &SerpQuery,
    ) -> ResearchResult<LearningBatch> {
        let documents = self.search(ctx, query).await?;
        guarded(
            &ctx.cancel,
            self.extractor.extract(&ctx.model, query, &documents),
        )
        .await
    }

    /// One search call under a pool slot and a timeout
    async fn search(
        &self,
        ctx: &RunContext,
        query: &SerpQuery,
    ) -> ResearchResult<Vec<SearchDocument>> {
        let timeout = Duration::from_millis(self.search_timeout_ms);

        guarded(&ctx.cancel, async {
            retry_async(
                || async move {
                    let _slot = self.pool.acquire().await?;
                    with_timeout(
                        self.search.search(&query.query, self.result_limit, timeout),
                        self.search_timeout_ms,
                        "search",
                    )
                    .await
                    .and_then(|result| result)
                },
                &self.retry,
                "search",
            )
            .await
            .map_err(|e| ResearchError::search(&query.query, e.to_string()))
        })
        .await
    }
}
