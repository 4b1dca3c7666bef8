//! Read-only gate for generated SQL. Only a single query statement over
//! known database tables gets through; the re-rendered statement is what runs.

use sqlparser::ast::{
    visit_expressions, visit_relations, Expr, ObjectName, Query, SetExpr, Statement, Visit, Visitor,
};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use std::ops::ControlFlow;

use super::QueryError;

/// DuckDB table functions that reach outside the database file.
const EXTERNAL_READERS: &[&str] = &[
    "read_csv",
    "read_csv_auto",
    "read_parquet",
    "parquet_scan",
    "parquet_metadata",
    "parquet_schema",
    "read_json",
    "read_json_auto",
    "read_json_objects",
    "read_ndjson",
    "read_ndjson_auto",
    "read_ndjson_objects",
    "read_text",
    "read_blob",
    "read_xlsx",
    "glob",
    "sniff_csv",
    "st_read",
    "iceberg_scan",
    "delta_scan",
    "sqlite_scan",
    "postgres_scan",
    "mysql_scan",
];

/// Functions that change database state even inside a SELECT.
const STATE_CHANGING_FUNCTIONS: &[&str] = &["nextval", "setval"];

/// Table functions that only generate values.
const GENERATOR_FUNCTIONS: &[&str] = &["range", "generate_series"];

/// Schemas whose views may be queried by qualified name.
const CATALOG_SCHEMAS: &[&str] = &["information_schema", "pg_catalog"];

/// Checks that `sql` is exactly one read-only query over `tables` (lower-case
/// names from the `main` schema) and returns it re-rendered.
pub fn check_read_only(sql: &str, tables: &HashSet<String>) -> Result<String, QueryError> {
    let statements = Parser::parse_sql(&DuckDbDialect {}, sql)
        .map_err(|e| QueryError::Rejected(format!("could not parse generated SQL: {}", e)))?;

    let statement = match statements.as_slice() {
        [statement] => statement,
        [] => return Err(QueryError::Rejected("no SQL statement found".to_string())),
        _ => {
            return Err(QueryError::Rejected(format!(
                "expected a single statement, found {}",
                statements.len()
            )))
        }
    };

    let Statement::Query(query) = statement else {
        return Err(QueryError::Rejected(format!(
            "only SELECT queries may run, got: {}",
            statement_kind(statement)
        )));
    };

    if !query_is_read_only(query) {
        return Err(QueryError::Rejected(
            "query writes data (SELECT INTO or a data-modifying clause)".to_string(),
        ));
    }

    let mut aliases = CteAliases::default();
    let _ = statement.visit(&mut aliases);

    if let ControlFlow::Break(name) = visit_relations(statement, |relation| {
        if is_known_relation(relation, tables, &aliases.names) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(relation.to_string())
        }
    }) {
        return Err(QueryError::Rejected(format!("access to '{}' is not allowed", name)));
    }

    if let ControlFlow::Break(name) = visit_expressions(statement, |expr| match expr {
        Expr::Function(function) if is_denied_function(&function.name) => {
            ControlFlow::Break(function.name.to_string())
        }
        _ => ControlFlow::Continue(()),
    }) {
        return Err(QueryError::Rejected(format!("calling '{}' is not allowed", name)));
    }

    Ok(statement.to_string())
}

/// Names introduced by `WITH` clauses anywhere in the statement.
#[derive(Default)]
struct CteAliases {
    names: HashSet<String>,
}

impl Visitor for CteAliases {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.names.insert(cte.alias.name.value.to_lowercase());
            }
        }
        ControlFlow::Continue(())
    }
}

fn query_is_read_only(query: &Query) -> bool {
    let ctes_read_only = query
        .with
        .as_ref()
        .is_none_or(|with| with.cte_tables.iter().all(|cte| query_is_read_only(&cte.query)));

    ctes_read_only && set_expr_is_read_only(&query.body)
}

fn set_expr_is_read_only(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => query_is_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_is_read_only(left) && set_expr_is_read_only(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

/// A relation must name a table in `main`, a CTE, a catalog view or a value
/// generator. Anything else could be resolved by DuckDB as a file path.
fn is_known_relation(name: &ObjectName, tables: &HashSet<String>, ctes: &HashSet<String>) -> bool {
    let parts: Vec<String> = name.0.iter().map(|ident| ident.value.to_lowercase()).collect();
    if name.0.iter().any(|ident| ident.quote_style == Some('\'')) {
        return false;
    }
    if parts.iter().any(|part| part.contains(['.', '/', '\\'])) {
        return false;
    }

    match parts.as_slice() {
        [table] => {
            tables.contains(table) || ctes.contains(table) || GENERATOR_FUNCTIONS.contains(&table.as_str())
        }
        [schema, table] if schema == "main" => tables.contains(table),
        [schema, _] => CATALOG_SCHEMAS.contains(&schema.as_str()),
        _ => false,
    }
}

fn is_denied_function(name: &ObjectName) -> bool {
    name.0.last().is_some_and(|ident| {
        let value = ident.value.to_lowercase();
        EXTERNAL_READERS.contains(&value.as_str()) || STATE_CHANGING_FUNCTIONS.contains(&value.as_str())
    })
}

fn statement_kind(statement: &Statement) -> String {
    let rendered = statement.to_string();
    rendered
        .split_whitespace()
        .next()
        .unwrap_or("unknown")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jobs() -> HashSet<String> {
        HashSet::from(["jobs".to_string()])
    }

    fn check(sql: &str) -> Result<String, QueryError> {
        check_read_only(sql, &jobs())
    }

    fn rejected(sql: &str) -> String {
        match check(sql) {
            Err(QueryError::Rejected(reason)) => reason,
            other => panic!("expected rejection for {sql:?}, got {other:?}"),
        }
    }

    #[test]
    fn plain_select_passes_and_is_rendered() {
        let sql = check("select job_role from jobs where location = 'Remote';").unwrap();
        assert_eq!(sql, "SELECT job_role FROM jobs WHERE location = 'Remote'");
    }

    #[test]
    fn ctes_and_set_operations_pass() {
        check(
            "WITH eng AS (SELECT * FROM jobs WHERE department = 'Engineering') SELECT COUNT(*) FROM eng",
        )
        .unwrap();
        check("SELECT job_role FROM jobs UNION SELECT location FROM jobs").unwrap();
    }

    #[test]
    fn ddl_and_dml_are_rejected() {
        assert!(rejected("DROP TABLE jobs").contains("DROP"));
        assert!(rejected("DELETE FROM jobs").contains("DELETE"));
        rejected("UPDATE jobs SET min_salary = 0");
        rejected("INSERT INTO jobs (job_role) VALUES ('x')");
        rejected("CREATE TABLE x (a INT)");
    }

    #[test]
    fn stacked_statements_are_rejected() {
        assert!(rejected("SELECT 1; DROP TABLE jobs;").contains("single statement"));
    }

    #[test]
    fn select_into_is_rejected() {
        rejected("SELECT * INTO copy_of_jobs FROM jobs");
    }

    #[test]
    fn file_readers_are_rejected() {
        assert!(rejected("SELECT * FROM read_csv('/etc/passwd')").contains("read_csv"));
        rejected("SELECT * FROM jobs WHERE job_role IN (SELECT * FROM read_text('secret.txt'))");
    }

    #[test]
    fn empty_and_garbage_input_is_rejected() {
        rejected("");
        rejected("this is not sql");
    }

    #[test]
    fn quoted_file_names_are_rejected() {
        assert!(rejected("SELECT * FROM \"secrets.csv\"").contains("secrets.csv"));
        rejected("SELECT * FROM 'secrets.csv'");
        rejected("SELECT * FROM \"data/export.parquet\"");
        rejected("SELECT j.job_role FROM jobs j JOIN \"salaries.json\" s ON j.job_id = s.job_id");
    }

    #[test]
    fn only_known_tables_and_ctes_are_allowed() {
        assert!(rejected("SELECT * FROM payroll").contains("payroll"));
        rejected("SELECT * FROM other_db.main.jobs");
        check("SELECT * FROM main.jobs").unwrap();
        check("SELECT * FROM JOBS").unwrap();
        check("WITH remote AS (SELECT * FROM jobs WHERE location = 'Remote') SELECT * FROM remote").unwrap();
        check("SELECT table_name FROM information_schema.tables").unwrap();
        check("SELECT * FROM range(3)").unwrap();
    }

    #[test]
    fn sequence_mutators_are_rejected() {
        assert!(rejected("SELECT nextval('jobs_job_id_seq')").contains("nextval"));
        rejected("SELECT job_role, setval('jobs_job_id_seq', 1) FROM jobs");
    }
}
