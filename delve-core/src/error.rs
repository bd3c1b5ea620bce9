//! Infrastructure errors
//!
//! Every failure that crosses a crate boundary carries an [`ErrorContext`]
//! naming where it happened, so a log line can be traced back to one call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub type DelveResult<T> = Result<T, DelveError>;

/// Where and during what an error happened
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique id, logged alongside the error
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub operation: Option<String>,
    pub details: BTreeMap<String, String>,
    /// What the operator can do about it
    pub hint: Option<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            details: BTreeMap::new(),
            hint: None,
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_hint(mut self, hint: &str) -> Self {
        self.hint = Some(hint.to_string());
        self
    }
}

/// Infrastructure-level error shared by every delve crate
#[derive(Error, Debug)]
pub enum DelveError {
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("Rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
        context: ErrorContext,
    },

    #[error("Search provider error: {message}")]
    Search {
        message: String,
        query: Option<String>,
        context: ErrorContext,
    },

    #[error("LLM error: {message}")]
    Llm {
        message: String,
        provider: Option<String>,
        model: Option<String>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl DelveError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            DelveError::Config { context, .. }
            | DelveError::Network { context, .. }
            | DelveError::Validation { context, .. }
            | DelveError::Timeout { context, .. }
            | DelveError::RateLimit { context, .. }
            | DelveError::Search { context, .. }
            | DelveError::Llm { context, .. }
            | DelveError::Internal { context, .. } => Some(context),
            DelveError::Io(_) | DelveError::Serialization(_) => None,
        }
    }

    /// Whether another attempt at the same call could succeed.
    ///
    /// Transport trouble and provider-side model failures qualify; bad input,
    /// bad configuration, and malformed responses do not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DelveError::Network { .. }
                | DelveError::Timeout { .. }
                | DelveError::RateLimit { .. }
                | DelveError::Llm { .. }
        )
    }

    /// Wait requested by the remote side, if any
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            DelveError::RateLimit { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::DelveError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let context = ErrorContext::new("search")
            .with_operation("post")
            .with_detail("status", 502)
            .with_hint("Check the search endpoint");

        assert_eq!(context.component, "search");
        assert_eq!(context.operation.as_deref(), Some("post"));
        assert_eq!(context.details["status"], "502");
        assert_eq!(context.hint.as_deref(), Some("Check the search endpoint"));
        assert!(!context.error_id.is_empty());
    }

    #[test]
    fn test_rate_limit_carries_delay() {
        let error = DelveError::RateLimit {
            message: "slow down".to_string(),
            retry_after_ms: Some(3000),
            context: ErrorContext::new("search"),
        };
        assert!(error.is_recoverable());
        assert_eq!(error.retry_delay_ms(), Some(3000));

        let timeout = DelveError::Timeout {
            operation: "search".to_string(),
            duration_ms: 200,
            context: ErrorContext::new("search"),
        };
        assert_eq!(timeout.to_string(), "search timed out after 200ms");
        assert_eq!(timeout.retry_delay_ms(), None);
    }
}
