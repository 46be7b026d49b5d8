use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS points (
    metric TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '{}',
    ts INTEGER NOT NULL,
    value REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS points_metric_ts ON points (metric, ts);

CREATE TABLE IF NOT EXISTS downsamplers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_metric TEXT NOT NULL,
    out_metric TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '{}',
    window_spec TEXT NOT NULL,
    aggregators TEXT NOT NULL DEFAULT '[]',
    run_every_ns INTEGER NOT NULL,
    last_progress_mark INTEGER
);
";

pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    conn.busy_timeout(busy_timeout)?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "database opened");
    migrate(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    migrate(&conn)?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("failed to apply database schema")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_dirs_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/store.db");

        let conn = open(&path, Duration::from_millis(100)).expect("open");
        conn.execute(
            "INSERT INTO points (metric, ts, value) VALUES ('cpu', 1, 2.0)",
            [],
        )
        .expect("insert");
        drop(conn);

        let conn = open(&path, Duration::from_millis(100)).expect("reopen");
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }
}
