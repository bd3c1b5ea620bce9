//! Core data type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DelveError, ErrorContext};

/// One scraped page returned by a search provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub url: String,
    pub content: String,
}

impl SearchDocument {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
        }
    }
}

/// Text-generation providers the service knows how to reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
    Groq,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Groq => "groq",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = DelveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "ollama" => Ok(ProviderKind::Ollama),
            "groq" => Ok(ProviderKind::Groq),
            other => Err(DelveError::Validation {
                message: format!("Unsupported LLM provider: {}", other),
                field: Some("provider".to_string()),
                context: ErrorContext::new("types")
                    .with_operation("parse_provider")
                    .with_hint("Use one of: openai, anthropic, ollama, groq"),
            }),
        }
    }
}

/// Provider tag plus model name.
///
/// Validated once where it enters the system and then passed by value; the
/// research engine never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSelection {
    pub provider: ProviderKind,
    pub model: String,
}

impl ModelSelection {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// Build a selection from untrusted parts, rejecting blank model names
    pub fn parse(provider: &str, model: &str) -> Result<Self, DelveError> {
        let provider = provider.parse::<ProviderKind>()?;
        let model = model.trim();
        if model.is_empty() {
            return Err(DelveError::Validation {
                message: "Model name must not be empty".to_string(),
                field: Some("model".to_string()),
                context: ErrorContext::new("types").with_operation("parse_model"),
            });
        }
        Ok(Self::new(provider, model))
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Shape a text-generation call is expected to return
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSchema {
    /// A JSON object conforming to `schema` (JSON Schema)
    Json {
        name: String,
        schema: serde_json::Value,
    },
    /// Free-form markdown
    Text { name: String },
}

impl OutputSchema {
    pub fn name(&self) -> &str {
        match self {
            OutputSchema::Json { name, .. } | OutputSchema::Text { name } => name,
        }
    }
}

/// A single prompt sent to a text-generation provider
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: ModelSelection,
    pub system_prompt: String,
    pub user_prompt: String,
    pub schema: OutputSchema,
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub research: ResearchSettings,
    pub logging: crate::logging::LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model used when a request does not name one
    pub default_model: ModelSelection,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Endpoint accepting `{"query", "limit"}` and returning `{"results": [{"url", "content"}]}`
    pub endpoint: String,
    pub api_key: Option<String>,
    pub result_limit: usize,
    pub timeout_ms: u64,
}

/// Longest session lifetime accepted from configuration (100 years)
pub const MAX_SESSION_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Tunables for the research engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    /// Global bound on in-flight search calls across a whole research tree
    pub concurrency_limit: usize,
    pub max_learnings_per_query: usize,
    pub max_follow_up_questions: usize,
    /// Token budget for learnings embedded in planner and report prompts
    pub context_token_budget: usize,
    /// Token budget for a single scraped document
    pub content_token_budget: usize,
    /// Trimming never cuts below this many characters
    pub min_chunk_chars: usize,
    /// Tokenizer used for budgeting
    pub tokenizer_model: String,
    pub replay_buffer_size: usize,
    /// At most [`MAX_SESSION_TTL_SECS`]
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Attempts per external call; 1 disables retries
    pub retry_attempts: usize,
    pub min_breadth: usize,
    pub max_breadth: usize,
    pub min_depth: usize,
    pub max_depth: usize,
    pub max_query_chars: usize,
}
