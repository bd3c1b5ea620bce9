//! Delve Core - Shared infrastructure and trait definitions
//!
//! Errors, configuration, logging, async helpers, and the narrow contracts the
//! research engine uses to reach external services.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
