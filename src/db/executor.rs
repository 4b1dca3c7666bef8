use arrow::array::{Array, ArrayRef};
use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use duckdb::Connection;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::db_pool::DbPool;
use super::schema::table_names;
use super::{guard, QueryError};

/// Column names plus rows of JSON scalars, in the order the engine returned them.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// More rows matched than were fetched.
    pub truncated: bool,
}

/// Runs generated SQL against the local store, behind the read-only guard.
pub struct QueryExecutor {
    pool: DbPool,
    max_rows: usize,
}

impl QueryExecutor {
    pub fn new(pool: DbPool, max_rows: usize) -> Self {
        Self { pool, max_rows }
    }

    pub async fn run(&self, sql: &str) -> Result<ResultSet, QueryError> {
        let sql = sql.to_string();
        let pool = self.pool.clone();
        let max_rows = self.max_rows;

        tokio::task::spawn_blocking(move || -> Result<ResultSet, QueryError> {
            let start_time = Instant::now();
            let conn = pool.get()?;

            let tables = table_names(&conn)?;
            let statement =
                guard::check_read_only(&sql, &tables).inspect_err(|e| warn!("Refusing to run SQL: {}", e))?;
            debug!("Executing checked SQL: {}", statement);

            let result = fetch_rows(&conn, &statement, max_rows)?;

            info!(
                "Query executed successfully. Row count: {}, Execution time: {}ms",
                result.rows.len(),
                start_time.elapsed().as_millis()
            );
            Ok(result)
        })
        .await?
    }
}

fn fetch_rows(conn: &Connection, sql: &str, max_rows: usize) -> Result<ResultSet, QueryError> {
    let mut stmt = conn.prepare(sql)?;
    let arrow_batches = stmt.query_arrow([])?;

    let columns = arrow_batches
        .get_schema()
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect::<Vec<String>>();

    let mut rows = Vec::new();
    let mut truncated = false;

    'batches: for batch in arrow_batches {
        for row in 0..batch.num_rows() {
            if rows.len() == max_rows {
                truncated = true;
                break 'batches;
            }
            rows.push(row_values(&batch, row)?);
        }
    }

    Ok(ResultSet {
        columns,
        rows,
        truncated,
    })
}

fn row_values(batch: &RecordBatch, row: usize) -> Result<Vec<Value>, ArrowError> {
    batch
        .columns()
        .iter()
        .map(|column| cell_value(column, row))
        .collect()
}

fn cell_value(column: &ArrayRef, row: usize) -> Result<Value, ArrowError> {
    if column.is_null(row) {
        return Ok(Value::Null);
    }

    let text = array_value_to_string(column.as_ref(), row)?;
    let value = match column.data_type() {
        DataType::Boolean => Value::Bool(text == "true"),
        data_type if data_type.is_numeric() => match serde_json::from_str::<serde_json::Number>(&text) {
            Ok(number) => Value::Number(number),
            Err(_) => Value::String(text),
        },
        _ => Value::String(text),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::seeded_pool;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn seeded_executor(dir: &tempfile::TempDir, max_rows: usize) -> QueryExecutor {
        QueryExecutor::new(seeded_pool(dir), max_rows)
    }

    #[tokio::test]
    async fn rows_come_back_as_typed_json() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(&dir, 100);

        let result = executor
            .run("SELECT job_role, min_salary, max_salary FROM jobs WHERE location = 'Remote'")
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["job_role", "min_salary", "max_salary"]);
        assert_eq!(result.rows, vec![vec![json!("Frontend Developer"), json!(50000.0), json!(75000.0)]]);
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn rows_beyond_the_cap_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(&dir, 4);

        let result = executor.run("SELECT job_id FROM jobs ORDER BY job_id").await.unwrap();

        assert_eq!(result.rows.len(), 4);
        assert!(result.truncated);
    }

    #[tokio::test]
    async fn empty_results_keep_column_names() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(&dir, 10);

        let result = executor
            .run("SELECT job_role FROM jobs WHERE department = 'Legal'")
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["job_role"]);
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn guard_blocks_destructive_sql_before_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(&dir, 10);

        let err = executor.run("DROP TABLE jobs").await.unwrap_err();
        assert!(matches!(err, QueryError::Rejected(_)));

        let still_there = executor.run("SELECT COUNT(*) AS n FROM jobs").await.unwrap();
        assert_eq!(still_there.rows, vec![vec![json!(6)]]);
    }

    #[tokio::test]
    async fn engine_errors_surface_as_database_errors() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(&dir, 10);

        let err = executor.run("SELECT salary FROM jobs").await.unwrap_err();
        assert!(matches!(err, QueryError::Database(_)));
    }

    #[tokio::test]
    async fn file_backed_relations_never_reach_the_engine() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(&dir, 10);

        let err = executor.run("SELECT * FROM \"jobs.csv\"").await.unwrap_err();
        assert!(matches!(err, QueryError::Rejected(_)));
    }

    #[tokio::test]
    async fn sequences_are_not_advanced_by_queries() {
        let dir = tempfile::tempdir().unwrap();
        let executor = seeded_executor(&dir, 10);

        let err = executor.run("SELECT nextval('jobs_job_id_seq')").await.unwrap_err();
        assert!(matches!(err, QueryError::Rejected(_)));

        let max_id = executor.run("SELECT MAX(job_id) AS id FROM jobs").await.unwrap();
        assert_eq!(max_id.rows, vec![vec![json!(6)]]);
    }
}
