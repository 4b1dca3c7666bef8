use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::executor::ResultSet;
use crate::llm::ProviderInfo;
use crate::pipeline::{PipelineError, TurnOutcome};
use crate::session::{LastResult, Session, SessionSettings, SharedSession, TurnMode};
use crate::web::state::AppState;

// Error type

/// JSON error body: `{"kind": ..., "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    fn input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "input", message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let kind = err.kind();
        let status = match kind {
            "input" | "config" => StatusCode::BAD_REQUEST,
            "query" => StatusCode::UNPROCESSABLE_ENTITY,
            "internal" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, kind, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::input(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} error: {}", self.kind, self.message);
        }
        (
            self.status,
            Json(json!({ "kind": self.kind, "message": self.message })),
        )
            .into_response()
    }
}

// Request types

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Partial settings update; absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub schema: Option<String>,
    /// Empty string selects the default provider.
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Empty string clears the stored key.
    pub api_key: Option<String>,
    pub mode: Option<TurnMode>,
}

// Response types

#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub schema: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key_set: bool,
    pub mode: TurnMode,
}

#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub number: usize,
    pub question: String,
    pub sql: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub settings: SettingsView,
    /// Newest first.
    pub history: Vec<HistoryItem>,
    pub last_result: Option<LastResult>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        let settings = &session.settings;
        Self {
            id: session.id,
            created_at: session.created_at,
            settings: SettingsView {
                schema: settings.schema.clone(),
                provider: settings.provider.clone(),
                model: settings.model.clone(),
                api_key_set: settings.api_key.is_some(),
                mode: settings.mode,
            },
            history: session
                .history
                .newest_first()
                .map(|(number, entry)| HistoryItem {
                    number,
                    question: entry.question.clone(),
                    sql: entry.sql.clone(),
                    timestamp: entry.timestamp,
                })
                .collect(),
            last_result: session.last_result.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    pub default_provider: String,
    pub providers: Vec<ProviderInfo>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub session_count: usize,
    pub table_count: usize,
    pub default_provider: String,
}

// API Implementations

async fn find_session(state: &AppState, id: &str) -> Result<SharedSession, ApiError> {
    let not_found = || ApiError::not_found(format!("Session '{}' not found", id));
    let id = Uuid::parse_str(id).map_err(|_| not_found())?;
    state.sessions.get(&id).await.ok_or_else(not_found)
}

// System status
pub async fn system_status(State(state): State<Arc<AppState>>) -> Result<Json<SystemStatus>, ApiError> {
    let uptime = Utc::now().signed_duration_since(state.startup_time).num_seconds();
    let pool = state.db_pool.clone();

    let table_count = tokio::task::spawn_blocking(move || -> Result<usize, String> {
        let conn = pool.get().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = 'main'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count as usize)
        .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))?
    .map_err(|e| ApiError::internal(format!("Failed to count tables: {}", e)))?;

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        session_count: state.sessions.len().await,
        table_count,
        default_provider: state.pipeline.providers().default_provider().to_string(),
    }))
}

pub async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersResponse> {
    let providers = state.pipeline.providers();
    Json(ProvidersResponse {
        default_provider: providers.default_provider().to_string(),
        providers: providers.describe(),
    })
}

// Live schema of the local database
pub async fn get_schema(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let ddl = state
        .get_schemas_ddl()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to read schema: {}", e)))?;
    Ok(Json(json!({ "schema": ddl })))
}

// Sessions
pub async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (_, session) = state.sessions.create(state.default_settings()).await;
    let view = SessionView::from(&*session.lock().await);
    (StatusCode::CREATED, Json(view))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let session = find_session(&state, &id).await?;
    let view = SessionView::from(&*session.lock().await);
    Ok(Json(view))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = find_session(&state, &id).await?;
    let id = session.lock().await.id;
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("Session '{}' not found", id)))
    }
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    update: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Result<Json<SessionView>, ApiError> {
    let Json(update) = update?;
    let session = find_session(&state, &id).await?;
    let mut session = session.lock().await;

    let mut settings: SessionSettings = session.settings.clone();
    if let Some(schema) = update.schema {
        settings.schema = schema;
    }
    if let Some(provider) = update.provider {
        let provider = Some(provider.trim().to_string()).filter(|p| !p.is_empty());
        if provider != settings.provider {
            // A model only makes sense for the provider it was picked from
            settings.model = None;
        }
        settings.provider = provider;
    }
    if let Some(model) = update.model {
        settings.model = Some(model.trim().to_string()).filter(|m| !m.is_empty());
    }
    if let Some(api_key) = update.api_key {
        settings.api_key = Some(api_key.trim().to_string()).filter(|k| !k.is_empty());
    }
    if let Some(mode) = update.mode {
        settings.mode = mode;
    }

    state.pipeline.check_selection(&settings)?;
    session.settings = settings;
    info!("Session {}: settings updated", session.id);

    Ok(Json(SessionView::from(&*session)))
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let Json(payload) = payload?;
    let session = find_session(&state, &id).await?;
    let mut session = session.lock().await;

    match state.pipeline.run_turn(&mut session, &payload.question).await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(e) => {
            warn!("Session {}: turn failed: {}", session.id, e);
            Err(e.into())
        }
    }
}

pub async fn clear_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = find_session(&state, &id).await?;
    let mut session = session.lock().await;
    session.history.clear();
    info!("Session {}: history cleared", session.id);
    Ok(StatusCode::NO_CONTENT)
}

// Data export
pub async fn export_result(
    State(state): State<Arc<AppState>>,
    Path((id, format)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let session = find_session(&state, &id).await?;
    let session = session.lock().await;
    let last = session
        .last_result
        .as_ref()
        .ok_or_else(|| ApiError::not_found("No query results to export yet"))?;

    match format.as_str() {
        "csv" => {
            let body = result_to_csv(&last.result).map_err(|e| ApiError::internal(format!("CSV export failed: {}", e)))?;
            Ok(attachment("text/csv; charset=utf-8", "query_results.csv", body))
        }
        "json" => {
            let body = serde_json::to_vec_pretty(last).map_err(|e| ApiError::internal(e.to_string()))?;
            Ok(attachment("application/json", "query_results.json", body))
        }
        other => Err(ApiError::input(format!("Unsupported export format '{}'", other))),
    }
}

fn attachment(content_type: &'static str, filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        body,
    )
        .into_response()
}

fn result_to_csv(result: &ResultSet) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&result.columns)?;
    for row in &result.rows {
        writer.write_record(row.iter().map(csv_field))?;
    }
    writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
