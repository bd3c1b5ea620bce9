//! Delve web server

use crate::{create_app, AppState, WebConfig, WebError, WebResult};
use axum::serve;
use delve_core::{DelveConfig, SearchProvider, TextGenerator};
use delve_research::ResearchService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// HTTP server over one research service
pub struct DelveServer {
    config: WebConfig,
    state: AppState,
    sweep_interval: Duration,
}

impl DelveServer {
    pub fn new(config: WebConfig, research: ResearchService, sweep_interval: Duration) -> Self {
        Self {
            state: AppState::new(config.clone(), research),
            config,
            sweep_interval,
        }
    }

    /// Serve until ctrl-c
    pub async fn start(self) -> WebResult<()> {
        self.start_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then cancel running sessions
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> WebResult<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let address = self.config.address();
        let app = create_app(self.state.clone());

        let listener = TcpListener::bind(&address)
            .await
            .map_err(WebError::Server)?;
        info!("Server listening on http://{}", address);

        let stop_sweeper = CancellationToken::new();
        let sweeper = self
            .state
            .research
            .spawn_sweeper(self.sweep_interval, stop_sweeper.clone());

        let result = serve(listener, app).with_graceful_shutdown(shutdown).await;

        stop_sweeper.cancel();
        let _ = sweeper.await;
        self.state.research.shutdown().await;

        if let Err(e) = result {
            error!("Server error: {}", e);
            return Err(WebError::Server(e));
        }

        info!("Server shut down gracefully");
        Ok(())
    }

    /// Get server configuration
    pub fn config(&self) -> &WebConfig {
        &self.config
    }

    /// Get application state
    pub fn state(&self) -> &AppState {
        &self.state
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Builder for DelveServer
pub struct DelveServerBuilder {
    config: WebConfig,
    delve: DelveConfig,
    generator: Option<Arc<dyn TextGenerator>>,
    search: Option<Arc<dyn SearchProvider>>,
}

impl DelveServerBuilder {
    pub fn new() -> Self {
        Self {
            config: WebConfig::default(),
            delve: DelveConfig::default(),
            generator: None,
            search: None,
        }
    }

    /// Set the server host
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn web_config(mut self, config: WebConfig) -> Self {
        self.config = config;
        self
    }

    pub fn delve_config(mut self, config: DelveConfig) -> Self {
        self.delve = config;
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    /// Build the research service and the server around it
    pub fn build(self) -> WebResult<DelveServer> {
        let generator = self
            .generator
            .ok_or_else(|| WebError::Config("A text generator is required".to_string()))?;
        let search = self
            .search
            .ok_or_else(|| WebError::Config("A search provider is required".to_string()))?;

        let research = ResearchService::new(&self.delve, generator, search)?;
        let sweep_interval = Duration::from_secs(self.delve.research.sweep_interval_secs.max(1));

        Ok(DelveServer::new(self.config, research, sweep_interval))
    }
}

impl Default for DelveServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
