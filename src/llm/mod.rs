pub mod prompts;
pub mod providers;
pub mod sanitize;

use crate::config::{LlmConfig, ProviderConfig, ProviderKind};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    Connection(String),
    #[error("LLM authentication failed: {0}")]
    Authentication(String),
    #[error("LLM rate limit reached: {0}")]
    RateLimited(String),
    #[error("LLM response error: {0}")]
    Response(String),
    #[error("LLM configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Maps a non-success HTTP status from a provider to an error kind.
    pub fn from_status(provider: &str, status: StatusCode, body: &str) -> Self {
        let detail = format!("{} responded with status {}: {}", provider, status, truncate(body, 300));
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Authentication(detail),
            StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(detail),
            _ => LlmError::Response(detail),
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LlmError::Response(err.to_string())
        } else {
            LlmError::Connection(err.to_string())
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// A single completion call, with credentials already resolved.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub api_key: Option<String>,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// Whether calls must carry an API key.
    fn requires_api_key(&self) -> bool {
        true
    }
}

/// A configured backend: the client plus the per-provider call defaults.
pub struct Provider {
    pub name: String,
    pub client: Arc<dyn CompletionClient>,
    pub models: Vec<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub api_key_env: Option<String>,
}

impl Provider {
    pub fn default_model(&self) -> &str {
        // Config validation guarantees at least one model
        self.models.first().map(String::as_str).unwrap_or_default()
    }

    /// Key from the environment variable this provider is configured with.
    pub fn env_api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub models: Vec<String>,
    pub default_model: String,
    pub requires_api_key: bool,
    pub api_key_configured: bool,
}

/// All configured backends, keyed by name.
pub struct ProviderRegistry {
    providers: BTreeMap<String, Provider>,
    default_provider: String,
}

impl ProviderRegistry {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let mut registry = Self::new(config.default_provider.clone());
        for (name, provider_config) in &config.providers {
            let client: Arc<dyn CompletionClient> = match provider_config.kind {
                ProviderKind::Gemini => Arc::new(providers::gemini::GeminiProvider::new(
                    http.clone(),
                    provider_config,
                )),
                ProviderKind::OpenAi => Arc::new(providers::openai::OpenAiProvider::new(
                    http.clone(),
                    provider_config,
                )),
                ProviderKind::Ollama => Arc::new(providers::ollama::OllamaProvider::new(
                    http.clone(),
                    provider_config,
                )),
            };
            registry.register(name, provider_config, client);
        }

        if registry.get(&registry.default_provider).is_none() {
            return Err(LlmError::Config(format!(
                "Unsupported LLM provider: {}",
                registry.default_provider
            )));
        }

        Ok(registry)
    }

    pub fn new(default_provider: String) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_provider,
        }
    }

    pub fn register(&mut self, name: &str, config: &ProviderConfig, client: Arc<dyn CompletionClient>) {
        self.providers.insert(
            name.to_string(),
            Provider {
                name: name.to_string(),
                client,
                models: config.models.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                api_key_env: config.api_key_env.clone(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.get(name)
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn describe(&self) -> Vec<ProviderInfo> {
        self.providers
            .values()
            .map(|p| ProviderInfo {
                name: p.name.clone(),
                models: p.models.clone(),
                default_model: p.default_model().to_string(),
                requires_api_key: p.client.requires_api_key(),
                api_key_configured: p.env_api_key().is_some(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_to_error_kind() {
        assert!(matches!(
            LlmError::from_status("groq", StatusCode::UNAUTHORIZED, "bad key"),
            LlmError::Authentication(_)
        ));
        assert!(matches!(
            LlmError::from_status("groq", StatusCode::TOO_MANY_REQUESTS, ""),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            LlmError::from_status("groq", StatusCode::BAD_GATEWAY, ""),
            LlmError::Response(_)
        ));
    }

    #[test]
    fn registry_builds_every_configured_backend() {
        let config = crate::config::AppConfig::default();
        let registry = ProviderRegistry::from_config(&config.llm).unwrap();

        let names: Vec<String> = registry.describe().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["gemini", "groq"]);
        assert_eq!(registry.get("groq").unwrap().default_model(), "llama3-8b-8192");
        assert_eq!(registry.default_provider(), "gemini");
    }
}
