pub mod db_pool;
pub mod executor;
pub mod guard;
pub mod schema;
pub mod seed;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("SQL rejected: {0}")]
    Rejected(String),
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("Database connection error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Failed to read query results: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Database task execution failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
