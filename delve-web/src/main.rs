//! Delve Web Server
//!
//! Configuration is resolved as defaults, then the TOML file, then `DELVE_*`
//! environment variables, then command line flags.

use anyhow::Context;
use clap::Parser;
use delve_core::{init_logging, DelveConfig, LogFormat, ModelSelection};
use delve_providers::{HttpSearchProvider, SiumaiGenerator};
use delve_web::{DelveServerBuilder, WebConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Delve Web Server - recursive research sessions over HTTP
#[derive(Parser, Debug)]
#[command(name = "delve-web")]
#[command(about = "Serve recursive research sessions over HTTP, SSE and WebSocket")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Default model as provider/model, e.g. openai/gpt-4o-mini
    #[arg(long)]
    model: Option<String>,

    /// Search-and-scrape endpoint
    #[arg(long)]
    search_endpoint: Option<String>,

    /// Global limit on concurrent search calls
    #[arg(long)]
    concurrency: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    let (mut config, loaded_from) = load_config(args.config.as_deref())?;
    apply_env(&mut config)?;
    apply_args(&mut config, &args)?;
    config.validate().context("Invalid configuration")?;

    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    match loaded_from {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("Using default configuration"),
    }

    let mut web = WebConfig::from_env();
    if let Some(host) = args.host {
        web.host = host;
    }
    if let Some(port) = args.port {
        web.port = port;
    }

    info!(
        model = %config.llm.default_model,
        search = %config.search.endpoint,
        concurrency = config.research.concurrency_limit,
        "Starting delve web server"
    );
    if config.search.api_key.is_none() {
        warn!("No search API key configured; requests are sent unauthenticated");
    }

    let generator = Arc::new(SiumaiGenerator::new(config.llm.clone()));
    let search = Arc::new(
        HttpSearchProvider::new(&config.search).context("Failed to create search provider")?,
    );

    let server = DelveServerBuilder::new()
        .web_config(web)
        .delve_config(config)
        .generator(generator)
        .search(search)
        .build()
        .context("Failed to build server")?;

    server.start().await.context("Server failed")?;
    Ok(())
}

/// Explicit path, else the default location if it exists, else defaults
fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<(DelveConfig, Option<PathBuf>)> {
    if let Some(path) = path {
        let config = DelveConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        return Ok((config, Some(path.to_path_buf())));
    }

    match DelveConfig::default_path() {
        Some(path) if path.exists() => {
            let config = DelveConfig::from_file(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            Ok((config, Some(path)))
        }
        _ => Ok((DelveConfig::default(), None)),
    }
}

fn apply_env(config: &mut DelveConfig) -> anyhow::Result<()> {
    if let Ok(model) = std::env::var("DELVE_MODEL") {
        config.llm.default_model = parse_model(&model)?;
    }
    if let Ok(endpoint) = std::env::var("DELVE_SEARCH_ENDPOINT") {
        config.search.endpoint = endpoint;
    }
    if let Ok(key) = std::env::var("DELVE_SEARCH_API_KEY") {
        config.search.api_key = Some(key);
    }
    if let Ok(limit) = std::env::var("DELVE_CONCURRENCY") {
        config.research.concurrency_limit = limit
            .parse()
            .with_context(|| format!("DELVE_CONCURRENCY is not a number: {}", limit))?;
    }
    if let Ok(level) = std::env::var("DELVE_LOG_LEVEL") {
        config.logging.level = level;
    }
    Ok(())
}

fn apply_args(config: &mut DelveConfig, args: &Args) -> anyhow::Result<()> {
    if let Some(model) = &args.model {
        config.llm.default_model = parse_model(model)?;
    }
    if let Some(endpoint) = &args.search_endpoint {
        config.search.endpoint = endpoint.clone();
    }
    if let Some(limit) = args.concurrency {
        config.research.concurrency_limit = limit;
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = LogFormat::Json;
    }
    Ok(())
}

/// `provider/model`, splitting on the first slash
fn parse_model(value: &str) -> anyhow::Result<ModelSelection> {
    let (provider, model) = value
        .split_once('/')
        .with_context(|| format!("Expected provider/model, got '{}'", value))?;
    Ok(ModelSelection::parse(provider, model)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use delve_core::ProviderKind;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["delve-web"]);
        assert!(args.host.is_none());
        assert!(args.port.is_none());
        assert!(!args.json_logs);

        let args = Args::parse_from([
            "delve-web",
            "--host",
            "0.0.0.0",
            "--port",
            "3000",
            "--model",
            "anthropic/claude-3-5-haiku-latest",
            "--concurrency",
            "4",
        ]);
        assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.port, Some(3000));
        assert_eq!(args.concurrency, Some(4));
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "delve-web",
            "--model",
            "ollama/llama3.2",
            "--concurrency",
            "6",
            "--json-logs",
        ]);
        let mut config = DelveConfig::default();
        apply_args(&mut config, &args).unwrap();

        assert_eq!(config.llm.default_model.provider, ProviderKind::Ollama);
        assert_eq!(config.llm.default_model.model, "llama3.2");
        assert_eq!(config.research.concurrency_limit, 6);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_model_requires_provider() {
        assert!(parse_model("gpt-4o").is_err());
        assert!(parse_model("unknown/model").is_err());
        let model = parse_model("openai/gpt-4o-mini").unwrap();
        assert_eq!(model.provider, ProviderKind::OpenAi);
    }
}
