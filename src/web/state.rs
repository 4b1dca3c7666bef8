use crate::config::AppConfig;
use crate::db::db_pool::DbPool;
use crate::db::schema::describe_tables;
use crate::pipeline::Pipeline;
use crate::session::{SessionSettings, SessionStore};
use minijinja::Environment;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub template_env: Environment<'static>,
    pub pipeline: Pipeline,
    pub sessions: SessionStore,
    /// Schema descriptor new sessions start with.
    pub default_schema: String,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, db_pool: DbPool, pipeline: Pipeline, default_schema: String) -> Self {
        Self {
            config,
            db_pool,
            template_env: super::templates::init_templates(),
            pipeline,
            sessions: SessionStore::new(),
            default_schema,
            startup_time: chrono::Utc::now(),
        }
    }

    /// Settings for a freshly created session.
    pub fn default_settings(&self) -> SessionSettings {
        SessionSettings {
            schema: self.default_schema.clone(),
            provider: None,
            model: None,
            api_key: None,
            mode: self.config.llm.default_mode,
        }
    }

    /// Current schema DDL, read from the database.
    pub async fn get_schemas_ddl(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let pool = self.db_pool.clone();

        // Use a blocking task to keep DuckDB off the async workers
        let ddl = tokio::task::spawn_blocking(move || -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            let conn = pool.get()?;
            Ok(describe_tables(&conn)?)
        })
        .await??;

        Ok(ddl)
    }
}
