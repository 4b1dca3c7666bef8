use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod db;
mod llm;
mod pipeline;
mod session;
mod util;
mod web;

#[cfg(test)]
mod testing;

use crate::config::{AppConfig, CliArgs};
use crate::db::db_pool::build_pool;
use crate::db::executor::QueryExecutor;
use crate::db::schema::{describe_tables, EMPTY_SCHEMA};
use crate::db::seed::seed_demo_data;
use crate::llm::ProviderRegistry;
use crate::pipeline::Pipeline;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Initialize logging
    init_tracing(args.log_format);

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Ensure data directory exists
    let db_path = &config.database.connection_string;
    if let Some(data_dir) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
        if !data_dir.exists() {
            info!("Creating data directory: {}", data_dir.display());
            std::fs::create_dir_all(data_dir)?;
        }
    }

    info!("Initializing DuckDB connection pool at {}", db_path);
    let pool = build_pool(db_path, config.database.pool_size)?;

    if config.database.seed_demo_data || args.seed_only {
        let mut conn = pool.get()?;
        let inserted = seed_demo_data(&mut conn)?;
        info!("Demo data ready ({} rows inserted)", inserted);
    }
    if args.seed_only {
        return Ok(());
    }

    let default_schema = {
        let conn = pool.get()?;
        describe_tables(&conn)?
    };
    if default_schema == EMPTY_SCHEMA {
        info!("Database has no tables yet; sessions start with an empty schema");
    }

    // Initialize LLM providers
    info!(
        "Initializing LLM providers (default: {})",
        config.llm.default_provider
    );
    let providers = ProviderRegistry::from_config(&config.llm)?;
    let executor = QueryExecutor::new(pool.clone(), config.database.max_rows);
    let pipeline = Pipeline::new(providers, executor);

    let web_config = config.web.clone();
    let app_state = Arc::new(AppState::new(config, pool, pipeline, default_schema));

    // Start the web server
    info!("Starting NL2SQL server on {}:{}", web_config.host, web_config.port);
    match web::run_server(web_config, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
