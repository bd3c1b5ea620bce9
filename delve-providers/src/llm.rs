//! LLM client integration using siumai
//!
//! Implements [`TextGenerator`] for every provider siumai can reach. Clients
//! are built lazily, one per [`ModelSelection`], and reused.

use async_trait::async_trait;
use delve_core::{
    DelveError, DelveResult, ErrorContext, GenerationRequest, LlmConfig, ModelSelection,
    OutputSchema, ProviderKind, TextGenerator,
};
use siumai::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// siumai-backed text generator
pub struct SiumaiGenerator {
    config: LlmConfig,
    clients: Mutex<HashMap<ModelSelection, Arc<dyn LlmClient>>>,
}

impl SiumaiGenerator {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn client_for(&self, selection: &ModelSelection) -> DelveResult<Arc<dyn LlmClient>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(selection) {
            return Ok(Arc::clone(client));
        }

        let client: Arc<dyn LlmClient> = Arc::from(self.build_client(selection).await?);
        info!(
            "Created LLM client for provider: {} with model: {}",
            selection.provider, selection.model
        );
        clients.insert(selection.clone(), Arc::clone(&client));
        Ok(client)
    }

    /// Build the appropriate siumai client for a selection
    async fn build_client(&self, selection: &ModelSelection) -> DelveResult<Box<dyn LlmClient>> {
        let model = selection.model.as_str();
        let temperature = self.config.temperature;

        match selection.provider {
            ProviderKind::OpenAi => {
                let api_key = self.api_key(selection, "OPENAI_API_KEY")?;
                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(model)
                    .temperature(temperature);

                if let Some(max_tokens) = self.config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }
                if let Some(base_url) = &self.config.base_url {
                    builder = builder.base_url(base_url);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| build_error(selection, e))?;
                Ok(Box::new(client))
            }
            ProviderKind::Anthropic => {
                let api_key = self.api_key(selection, "ANTHROPIC_API_KEY")?;
                let mut builder = LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key)
                    .model(model)
                    .temperature(temperature);

                if let Some(max_tokens) = self.config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| build_error(selection, e))?;
                Ok(Box::new(client))
            }
            ProviderKind::Ollama => {
                let base_url = self
                    .config
                    .base_url
                    .clone()
                    .or_else(|| std::env::var("OLLAMA_HOST").ok())
                    .unwrap_or_else(|| "http://localhost:11434".to_string());

                let mut builder = LlmBuilder::new()
                    .ollama()
                    .model(model)
                    .base_url(&base_url)
                    .temperature(temperature);

                if let Some(max_tokens) = self.config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| build_error(selection, e))?;
                Ok(Box::new(client))
            }
            ProviderKind::Groq => {
                let api_key = self.api_key(selection, "GROQ_API_KEY")?;
                let mut builder = LlmBuilder::new()
                    .groq()
                    .api_key(&api_key)
                    .model(model)
                    .temperature(temperature);

                if let Some(max_tokens) = self.config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| build_error(selection, e))?;
                Ok(Box::new(client))
            }
        }
    }

    /// The configured key applies to the default provider only; other
    /// providers read their conventional environment variable.
    fn api_key(&self, selection: &ModelSelection, env_var: &str) -> DelveResult<String> {
        let configured = if selection.provider == self.config.default_model.provider {
            self.config.api_key.clone()
        } else {
            None
        };

        configured
            .or_else(|| std::env::var(env_var).ok())
            .ok_or_else(|| DelveError::Config {
                message: format!("{} API key not found", selection.provider),
                source: None,
                context: ErrorContext::new("llm")
                    .with_operation("build_client")
                    .with_hint(&format!("Set {} or llm.api_key", env_var)),
            })
    }
}

#[async_trait]
impl TextGenerator for SiumaiGenerator {
    async fn generate(&self, request: GenerationRequest) -> DelveResult<String> {
        let client = self.client_for(&request.model).await?;
        let start_time = Instant::now();

        let system_prompt = compose_system_prompt(&request.system_prompt, &request.schema);
        let messages = vec![system!(system_prompt), user!(request.user_prompt)];

        debug!(
            schema = request.schema.name(),
            model = %request.model,
            "Generating response"
        );

        let response = client.chat(messages).await.map_err(|e| DelveError::Llm {
            message: format!("LLM generation failed: {}", e),
            provider: Some(request.model.provider.to_string()),
            model: Some(request.model.model.clone()),
            context: ErrorContext::new("llm").with_operation("chat"),
        })?;

        let content = response.content_text().ok_or_else(|| DelveError::Llm {
            message: "No text content in LLM response".to_string(),
            provider: Some(request.model.provider.to_string()),
            model: Some(request.model.model.clone()),
            context: ErrorContext::new("llm").with_operation("read_response"),
        })?;

        debug!(
            schema = request.schema.name(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            chars = content.len(),
            "Generated response"
        );

        Ok(content.to_string())
    }
}

/// Append output-format instructions to a system prompt
pub fn compose_system_prompt(system_prompt: &str, schema: &OutputSchema) -> String {
    match schema {
        OutputSchema::Json { schema, .. } => format!(
            "{}\n\nRespond with a single JSON object and nothing else. \
             It must validate against this JSON schema:\n{}",
            system_prompt,
            serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
        ),
        OutputSchema::Text { .. } => format!(
            "{}\n\nRespond in markdown. Do not wrap the whole answer in a code fence.",
            system_prompt
        ),
    }
}

fn build_error(selection: &ModelSelection, error: impl std::fmt::Display) -> DelveError {
    DelveError::Llm {
        message: format!("Failed to build {} client: {}", selection.provider, error),
        provider: Some(selection.provider.to_string()),
        model: Some(selection.model.clone()),
        context: ErrorContext::new("llm").with_operation("build_client"),
    }
}
