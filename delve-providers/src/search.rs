//! HTTP search-and-scrape provider
//!
//! Speaks a small JSON contract: `POST {endpoint}` with `{"query", "limit"}`
//! and a response of `{"results": [{"url", "content"}]}`. Hits without
//! content are dropped.

use async_trait::async_trait;
use delve_core::{DelveError, DelveResult, ErrorContext, SearchConfig, SearchDocument, SearchProvider};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct SearchRequestBody<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: String,
    #[serde(default, alias = "markdown")]
    content: Option<String>,
}

/// Search provider backed by an HTTP endpoint
pub struct HttpSearchProvider {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSearchProvider {
    pub fn new(config: &SearchConfig) -> DelveResult<Self> {
        let endpoint = url::Url::parse(config.endpoint.trim()).map_err(|e| DelveError::Config {
            message: format!("Invalid search endpoint '{}': {}", config.endpoint, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("search")
                .with_operation("new")
                .with_hint("Set search.endpoint or DELVE_SEARCH_ENDPOINT to an absolute URL"),
        })?;

        let client = Client::builder().build().map_err(|e| DelveError::Config {
            message: format!("Failed to build HTTP client: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("search").with_operation("new"),
        })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request_error(&self, query: &str, timeout: Duration, error: reqwest::Error) -> DelveError {
        if error.is_timeout() {
            DelveError::Timeout {
                operation: format!("search '{}'", query),
                duration_ms: timeout.as_millis() as u64,
                context: ErrorContext::new("search").with_detail("endpoint", &self.endpoint),
            }
        } else if error.is_decode() {
            DelveError::Search {
                message: format!("Malformed search response: {}", error),
                query: Some(query.to_string()),
                context: ErrorContext::new("search").with_operation("decode"),
            }
        } else {
            DelveError::Network {
                message: format!("Search request failed: {}", error),
                source: Some(Box::new(error)),
                context: ErrorContext::new("search").with_detail("endpoint", &self.endpoint),
            }
        }
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        timeout: Duration,
    ) -> DelveResult<Vec<SearchDocument>> {
        let start_time = Instant::now();

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&SearchRequestBody { query, limit });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.request_error(query, timeout, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000));

            warn!(query = %query, "Search provider rate limited the request");
            return Err(DelveError::RateLimit {
                message: format!("search provider returned {}", status),
                retry_after_ms,
                context: ErrorContext::new("search").with_detail("endpoint", &self.endpoint),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DelveError::Search {
                message: format!("search provider returned {}: {}", status, body),
                query: Some(query.to_string()),
                context: ErrorContext::new("search").with_operation("search"),
            });
        }

        let body: SearchResponseBody = response
            .json()
            .await
            .map_err(|e| self.request_error(query, timeout, e))?;

        let documents: Vec<SearchDocument> = body
            .results
            .into_iter()
            .filter_map(|hit| match hit.content {
                Some(content) if !content.trim().is_empty() => {
                    Some(SearchDocument::new(hit.url, content))
                }
                _ => None,
            })
            .take(limit)
            .collect();

        debug!(
            query = %query,
            documents = documents.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Search completed"
        );

        Ok(documents)
    }
}
