use duckdb::Connection;
use std::collections::{BTreeMap, HashSet};

/// Placeholder descriptor used when the database holds no user tables.
pub const EMPTY_SCHEMA: &str = "-- No tables found in the database.";

/// Describes every table in the `main` schema as `CREATE TABLE` DDL, the
/// form the prompt builder embeds as the schema descriptor.
pub fn describe_tables(conn: &Connection) -> Result<String, duckdb::Error> {
    let mut stmt = conn.prepare(
        "SELECT table_name, column_name, data_type, is_nullable
         FROM information_schema.columns
         WHERE table_schema = 'main'
         ORDER BY table_name, ordinal_position",
    )?;

    let columns = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?, // table_name
            row.get::<_, String>(1)?, // column_name
            row.get::<_, String>(2)?, // data_type
            row.get::<_, String>(3)? == "YES", // is_nullable
        ))
    })?;

    let mut tables: BTreeMap<String, Vec<(String, String, bool)>> = BTreeMap::new();
    for column in columns {
        let (table, name, data_type, nullable) = column?;
        tables.entry(table).or_default().push((name, data_type, nullable));
    }

    if tables.is_empty() {
        return Ok(EMPTY_SCHEMA.to_string());
    }

    let ddl_statements: Vec<String> = tables
        .into_iter()
        .map(|(table, columns)| {
            let definitions: Vec<String> = columns
                .iter()
                .map(|(name, data_type, nullable)| {
                    let null_str = if *nullable { "" } else { " NOT NULL" };
                    format!("    {} {}{}", name, data_type, null_str)
                })
                .collect();
            format!("CREATE TABLE {} (\n{}\n);", table, definitions.join(",\n"))
        })
        .collect();

    Ok(ddl_statements.join("\n\n"))
}

/// Lower-case names of the tables and views in the `main` schema.
pub fn table_names(conn: &Connection) -> Result<HashSet<String>, duckdb::Error> {
    let mut stmt = conn.prepare("SELECT table_name FROM information_schema.tables WHERE table_schema = 'main'")?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    names.map(|name| name.map(|n| n.to_lowercase())).collect()
}
