//! Shared application state

use crate::WebConfig;
use delve_research::ResearchService;

/// Handles shared by every request.
///
/// The research service is built once at startup and owns the session store,
/// the progress hub, and the engine.
#[derive(Clone)]
pub struct AppState {
    pub config: WebConfig,
    pub research: ResearchService,
}

impl AppState {
    pub fn new(config: WebConfig, research: ResearchService) -> Self {
        Self { config, research }
    }
}
