use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::QueryError;
use crate::db::executor::{QueryExecutor, ResultSet};
use crate::llm::prompts::{build_explanation_prompt, build_sql_prompt, SQL_SYSTEM_PROMPT};
use crate::llm::sanitize::{sanitize_completion, SanitizeError};
use crate::llm::{CompletionRequest, LlmError, Provider, ProviderRegistry};
use crate::session::{LastResult, Session, SessionSettings, TurnMode};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Input(String),
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Provider(#[from] LlmError),
    #[error("The model response did not contain usable SQL: {0}")]
    Response(#[from] SanitizeError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

impl PipelineError {
    /// Short category shown to the user next to the message.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Input(_) => "input",
            PipelineError::Config(_) | PipelineError::Provider(LlmError::Config(_)) => "config",
            PipelineError::Provider(_) => "provider",
            PipelineError::Response(_) => "response",
            PipelineError::Query(QueryError::Rejected(_) | QueryError::Database(_)) => "query",
            PipelineError::Query(_) => "internal",
        }
    }
}

/// Everything produced by one question.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub question: String,
    pub sql: String,
    pub provider: String,
    pub model: String,
    pub mode: TurnMode,
    pub result: Option<ResultSet>,
    pub explanation: Option<String>,
}

/// Provider, model and credentials chosen for a turn.
struct Selection<'a> {
    provider: &'a Provider,
    model: String,
}

/// Question in, SQL (and optionally rows and an explanation) out.
pub struct Pipeline {
    providers: ProviderRegistry,
    executor: QueryExecutor,
}

impl Pipeline {
    pub fn new(providers: ProviderRegistry, executor: QueryExecutor) -> Self {
        Self { providers, executor }
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Checks that the session names a configured provider and one of its models.
    pub fn check_selection(&self, settings: &SessionSettings) -> Result<(), PipelineError> {
        self.select(settings).map(|_| ())
    }

    fn select(&self, settings: &SessionSettings) -> Result<Selection<'_>, PipelineError> {
        let name = settings
            .provider
            .as_deref()
            .unwrap_or_else(|| self.providers.default_provider());
        let provider = self
            .providers
            .get(name)
            .ok_or_else(|| PipelineError::Config(format!("Unknown LLM provider '{}'", name)))?;

        let model = match settings.model.as_deref() {
            Some(model) if provider.models.iter().any(|m| m == model) => model.to_string(),
            Some(model) => {
                return Err(PipelineError::Config(format!(
                    "Model '{}' is not available for provider '{}'",
                    model, provider.name
                )));
            }
            None => provider.default_model().to_string(),
        };

        Ok(Selection { provider, model })
    }

    fn resolve_api_key(provider: &Provider, settings: &SessionSettings) -> Result<Option<String>, PipelineError> {
        if !provider.client.requires_api_key() {
            return Ok(None);
        }

        let session_key = settings
            .api_key
            .as_ref()
            .filter(|key| !key.trim().is_empty())
            .cloned();

        match session_key.or_else(|| provider.env_api_key()) {
            Some(key) => Ok(Some(key)),
            None => Err(PipelineError::Config(match &provider.api_key_env {
                Some(var) => format!(
                    "No API key for provider '{}'. Set {} or enter a key in the settings.",
                    provider.name, var
                ),
                None => format!(
                    "No API key for provider '{}'. Enter a key in the settings.",
                    provider.name
                ),
            })),
        }
    }

    /// Runs one question through the session's configured flow. Any error
    /// ends this turn only; the session remains usable.
    pub async fn run_turn(&self, session: &mut Session, question: &str) -> Result<TurnOutcome, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::Input("Please enter a question.".to_string()));
        }
        if session.settings.schema.trim().is_empty() {
            return Err(PipelineError::Input("Please enter your database schema.".to_string()));
        }

        let Selection { provider, model } = self.select(&session.settings)?;
        let api_key = Self::resolve_api_key(provider, &session.settings)?;
        let mode = session.settings.mode;

        info!(
            "Session {}: generating SQL with {} ({})",
            session.id, provider.name, model
        );

        let prompt = build_sql_prompt(&session.settings.schema, question);
        debug!("Prepared LLM prompt: {}", prompt);

        let raw = provider
            .client
            .complete(&CompletionRequest {
                prompt,
                system: Some(SQL_SYSTEM_PROMPT.to_string()),
                model: model.clone(),
                temperature: provider.temperature,
                max_tokens: provider.max_tokens,
                api_key: api_key.clone(),
            })
            .await?;
        debug!("Raw completion: {}", raw);

        let sql = sanitize_completion(&raw)?;
        info!("Generated SQL: {}", sql);
        session.history.push(question, &sql);

        let mut outcome = TurnOutcome {
            question: question.to_string(),
            sql,
            provider: provider.name.clone(),
            model: model.clone(),
            mode,
            result: None,
            explanation: None,
        };

        if mode == TurnMode::SqlOnly {
            return Ok(outcome);
        }

        let result = self.executor.run(&outcome.sql).await?;
        session.last_result = Some(LastResult {
            question: outcome.question.clone(),
            sql: outcome.sql.clone(),
            result: result.clone(),
        });

        if mode == TurnMode::ExecuteAndExplain {
            let explanation = provider
                .client
                .complete(&CompletionRequest {
                    prompt: build_explanation_prompt(question, &outcome.sql, &result),
                    system: None,
                    model,
                    temperature: provider.temperature,
                    max_tokens: provider.max_tokens,
                    api_key,
                })
                .await?;
            outcome.explanation = Some(explanation.trim().to_string());
        }

        outcome.result = Some(result);
        Ok(outcome)
    }
}
