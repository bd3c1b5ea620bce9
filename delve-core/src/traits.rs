//! Core trait definitions

use crate::error::DelveResult;
use crate::types::{GenerationRequest, SearchDocument};
use async_trait::async_trait;
use std::time::Duration;

/// Web search-and-scrape provider
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for `query` and return up to `limit` scraped pages.
    ///
    /// Implementations report `Timeout` and `RateLimit` through the matching
    /// [`crate::DelveError`] variants.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        timeout: Duration,
    ) -> DelveResult<Vec<SearchDocument>>;
}

/// Text-generation provider
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one prompt and return the raw model output.
    ///
    /// For [`crate::OutputSchema::Json`] the output is expected to contain a
    /// JSON document matching the schema; callers do their own parsing.
    async fn generate(&self, request: GenerationRequest) -> DelveResult<String>;
}
