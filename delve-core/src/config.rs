//! Configuration management

use crate::error::{DelveError, DelveResult, ErrorContext};
use crate::logging::LoggingConfig;
use crate::types::{
    DelveConfig, LlmConfig, ModelSelection, ProviderKind, ResearchSettings, SearchConfig,
    MAX_SESSION_TTL_SECS,
};

use std::path::{Path, PathBuf};

impl Default for DelveConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            research: ResearchSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_model: ModelSelection::new(ProviderKind::OpenAi, "gpt-4o-mini"),
            api_key: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: Some(4000),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3002/v1/search".to_string(),
            api_key: None,
            result_limit: 5,
            timeout_ms: 15_000,
        }
    }
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            concurrency_limit: 2,
            max_learnings_per_query: 5,
            max_follow_up_questions: 3,
            context_token_budget: 128_000,
            content_token_budget: 25_000,
            min_chunk_chars: 140,
            tokenizer_model: "gpt-4o".to_string(),
            replay_buffer_size: 64,
            session_ttl_secs: 24 * 60 * 60,
            sweep_interval_secs: 10 * 60,
            retry_attempts: 1,
            min_breadth: 2,
            max_breadth: 10,
            min_depth: 1,
            max_depth: 5,
            max_query_chars: 2_000,
        }
    }
}

impl DelveConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> DelveResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DelveError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_hint("Check if the config file exists and is readable"),
        })?;

        let config: DelveConfig = toml::from_str(&content).map_err(|e| DelveError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_hint("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DelveResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| DelveError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        std::fs::write(path, content).map_err(|e| DelveError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_hint("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Default location: `<config dir>/delve/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("delve").join("config.toml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> DelveResult<()> {
        let research = &self.research;

        let checks: [(bool, &str, &str); 8] = [
            (
                research.concurrency_limit == 0,
                "research.concurrency_limit must be greater than 0",
                "Set research.concurrency_limit to a positive value",
            ),
            (
                research.max_learnings_per_query == 0,
                "research.max_learnings_per_query must be greater than 0",
                "Set research.max_learnings_per_query to a positive value",
            ),
            (
                research.context_token_budget == 0 || research.content_token_budget == 0,
                "Token budgets must be greater than 0",
                "Set research.context_token_budget and research.content_token_budget",
            ),
            (
                research.min_breadth == 0 || research.min_breadth > research.max_breadth,
                "Breadth range is empty",
                "Ensure 1 <= research.min_breadth <= research.max_breadth",
            ),
            (
                research.min_depth == 0 || research.min_depth > research.max_depth,
                "Depth range is empty",
                "Ensure 1 <= research.min_depth <= research.max_depth",
            ),
            (
                research.session_ttl_secs > MAX_SESSION_TTL_SECS,
                "research.session_ttl_secs must be at most 3153600000 (100 years)",
                "Set research.session_ttl_secs to a lifetime of at most 100 years",
            ),
            (
                research.replay_buffer_size == 0,
                "research.replay_buffer_size must be greater than 0",
                "Set research.replay_buffer_size to a positive value",
            ),
            (
                self.search.result_limit == 0 || self.search.timeout_ms == 0,
                "search.result_limit and search.timeout_ms must be greater than 0",
                "Set search.result_limit and search.timeout_ms to positive values",
            ),
        ];

        for (failed, message, suggestion) in checks {
            if failed {
                return Err(DelveError::Config {
                    message: message.to_string(),
                    source: None,
                    context: ErrorContext::new("config")
                        .with_operation("validate")
                        .with_hint(suggestion),
                });
            }
        }

        if research.retry_attempts == 0 {
            return Err(crate::config_error!(
                "research.retry_attempts must be at least 1",
                "config"
            ));
        }

        Ok(())
    }
}
