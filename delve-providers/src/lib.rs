//! Delve Providers - concrete adapters for the core provider traits
//!
//! [`SiumaiGenerator`] reaches LLM providers through siumai and
//! [`HttpSearchProvider`] talks to a search-and-scrape HTTP endpoint.

pub mod llm;
pub mod search;

pub use llm::{compose_system_prompt, SiumaiGenerator};
pub use search::HttpSearchProvider;
