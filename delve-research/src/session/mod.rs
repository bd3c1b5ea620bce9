//! Session tracking with time-to-live eviction
//!
//! State lives in process memory only and does not survive a restart.

pub mod store;
pub mod types;

pub use store::SessionStore;
pub use types::{ResearchSession, SessionSummary};
