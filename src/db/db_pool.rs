use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use std::sync::Mutex;

pub type DbPool = Pool<DuckDBConnectionManager>;

/// Hands out clones of one root connection so every pooled connection
/// shares the same database instance.
pub struct DuckDBConnectionManager {
    root: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn open(connection_string: &str) -> Result<Self, duckdb::Error> {
        Ok(Self {
            root: Mutex::new(Connection::open(connection_string)?),
        })
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let root = self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        root.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1")
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

pub fn build_pool(connection_string: &str, pool_size: usize) -> Result<DbPool, Box<dyn std::error::Error + Send + Sync>> {
    let manager = DuckDBConnectionManager::open(connection_string)?;
    let pool = Pool::builder().max_size(pool_size as u32).build(manager)?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_connections_share_one_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.duckdb");
        let pool = build_pool(path.to_str().unwrap(), 2).unwrap();

        let writer = pool.get().unwrap();
        writer.execute_batch("CREATE TABLE t (n INTEGER); INSERT INTO t VALUES (7);").unwrap();

        let reader = pool.get().unwrap();
        let n: i32 = reader.query_row("SELECT n FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(n, 7);
    }
}
