//! Shared fixtures for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::config::{ProviderConfig, ProviderKind};
use crate::db::db_pool::{build_pool, DbPool};
use crate::db::seed::seed_demo_data;
use crate::llm::{CompletionClient, CompletionRequest, LlmError, ProviderRegistry};

/// Replays canned completions and records every request it receives.
pub struct StubClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubClient {
    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: LlmError) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Err(error)])),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for StubClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Response("stub has no reply left".to_string())))
    }
}

pub fn stub_provider_config() -> ProviderConfig {
    ProviderConfig {
        kind: ProviderKind::OpenAi,
        models: vec!["stub-small".to_string(), "stub-large".to_string()],
        temperature: 0.1,
        max_tokens: Some(1000),
        api_key_env: None,
        api_url: None,
    }
}

/// A registry whose only provider, `stub`, is backed by `client`.
pub fn stub_registry(client: Arc<StubClient>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new("stub".to_string());
    registry.register("stub", &stub_provider_config(), client);
    registry
}

/// A DuckDB file in `dir` holding the six demo jobs.
pub fn seeded_pool(dir: &tempfile::TempDir) -> DbPool {
    let path = dir.path().join("jobs.duckdb");
    let pool = build_pool(path.to_str().unwrap(), 2).unwrap();
    seed_demo_data(&mut pool.get().unwrap()).unwrap();
    pool
}
