use duckdb::{params, Connection};
use tracing::info;

const JOBS_DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS jobs_job_id_seq START 1;
CREATE TABLE IF NOT EXISTS jobs (
    job_id INTEGER PRIMARY KEY DEFAULT nextval('jobs_job_id_seq'),
    job_role VARCHAR,
    experience_level VARCHAR(50),
    min_salary DECIMAL(10,2),
    max_salary DECIMAL(10,2),
    location VARCHAR(100),
    department VARCHAR(100)
);
"#;

/// (job_role, experience_level, min_salary, max_salary, location, department)
pub const DEMO_JOBS: [(&str, &str, f64, f64, &str, &str); 6] = [
    ("Backend Developer", "Mid", 70000.00, 100000.00, "New York", "Engineering"),
    ("Frontend Developer", "Junior", 50000.00, 75000.00, "Remote", "Engineering"),
    ("DevOps Engineer", "Senior", 90000.00, 130000.00, "San Francisco", "Infrastructure"),
    ("Data Scientist", "Mid", 80000.00, 110000.00, "Boston", "Data Science"),
    ("Product Manager", "Senior", 95000.00, 140000.00, "Seattle", "Product"),
    ("UX Designer", "Mid", 65000.00, 90000.00, "Austin", "Design"),
];

/// Creates the `jobs` table and fills it with the demo rows if it is empty.
/// Returns the number of rows inserted.
pub fn seed_demo_data(conn: &mut Connection) -> Result<usize, duckdb::Error> {
    conn.execute_batch(JOBS_DDL)?;

    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
    if existing > 0 {
        info!("Table jobs already holds {} rows, skipping seed", existing);
        return Ok(0);
    }

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO jobs (job_role, experience_level, min_salary, max_salary, location, department)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        for (role, level, min_salary, max_salary, location, department) in DEMO_JOBS {
            stmt.execute(params![role, level, min_salary, max_salary, location, department])?;
        }
    }
    tx.commit()?;

    info!("Seeded jobs table with {} rows", DEMO_JOBS.len());
    Ok(DEMO_JOBS.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_is_applied_once() {
        let mut conn = Connection::open_in_memory().unwrap();

        assert_eq!(seed_demo_data(&mut conn).unwrap(), 6);
        assert_eq!(seed_demo_data(&mut conn).unwrap(), 0);

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM jobs", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 6);

        let ids: Vec<i32> = conn
            .prepare("SELECT job_id FROM jobs ORDER BY job_id")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn seeded_values_are_bound_not_interpolated() {
        let mut conn = Connection::open_in_memory().unwrap();
        seed_demo_data(&mut conn).unwrap();

        let role: String = conn
            .query_row("SELECT job_role FROM jobs WHERE location = ?", ["Remote"], |r| r.get(0))
            .unwrap();
        assert_eq!(role, "Frontend Developer");
    }
}
