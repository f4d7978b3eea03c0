use crate::errors::{EngineError, EngineResult};
use crate::state::DbCommand;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type DbPool = Arc<Mutex<Connection>>;

pub fn init_db(data_dir: &Path) -> EngineResult<DbPool> {
    std::fs::create_dir_all(data_dir).map_err(|e| EngineError::Database(format!("create dir: {e}")))?;
    let db_path = data_dir.join("breakeven.db");
    let conn = Connection::open(&db_path)?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

    let schema = include_str!("../migrations/001_init.sql");
    conn.execute_batch(schema)?;

    tracing::info!("database initialized at {}", db_path.display());
    Ok(Arc::new(Mutex::new(conn)))
}

/// Dedicated DB writer task. Reads commands from bounded channel, executes SQL.
/// This is the ONLY task that writes to the database connection.
/// Returns once every sender has been dropped.
pub async fn run_db_writer(db: DbPool, mut rx: mpsc::Receiver<DbCommand>) {
    tracing::info!("db writer task started");

    while let Some(cmd) = rx.recv().await {
        if let Err(e) = execute_command(&db, cmd) {
            tracing::error!("db write error: {e}");
        }
    }

    tracing::info!("db writer task shutting down");
}

fn execute_command(db: &DbPool, cmd: DbCommand) -> EngineResult<()> {
    let conn = db.lock().map_err(|e| EngineError::Database(format!("lock poisoned: {e}")))?;

    match cmd {
        DbCommand::InsertRun { run_id, scenario, mode, started_at } => {
            conn.execute(
                "INSERT INTO runs (run_id, scenario, mode, started_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![run_id, scenario, mode, started_at],
            )?;
        }
        DbCommand::InsertResult {
            run_id, scenario, valuation_date, mode, result_kind,
            lower, upper, evaluations, snapshot_json, recorded_at,
        } => {
            conn.execute(
                "INSERT INTO search_results (run_id, scenario, valuation_date, mode, result_kind, lower, upper, evaluations, snapshot_json, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![run_id, scenario, valuation_date, mode, result_kind, lower, upper, evaluations, snapshot_json, recorded_at],
            )?;
        }
        DbCommand::FinishRun { run_id, finished_at, summary_json } => {
            conn.execute(
                "UPDATE runs SET finished_at = ?1, summary_json = ?2 WHERE run_id = ?3",
                rusqlite::params![finished_at, summary_json, run_id],
            )?;
        }
    }
    Ok(())
}

// ── Query helpers (read path, after the writer has finished) ──

pub fn get_run_results(db: &DbPool, run_id: &str) -> EngineResult<Vec<ResultRow>> {
    let conn = db.lock().map_err(|e| EngineError::Database(format!("lock: {e}")))?;
    let mut stmt = conn.prepare(
        "SELECT valuation_date, mode, result_kind, lower, upper, evaluations FROM search_results WHERE run_id = ?1 ORDER BY valuation_date"
    )?;
    let rows = stmt.query_map(rusqlite::params![run_id], |row| {
        Ok(ResultRow {
            valuation_date: row.get(0)?,
            mode: row.get(1)?,
            result_kind: row.get(2)?,
            lower: row.get(3)?,
            upper: row.get(4)?,
            evaluations: row.get(5)?,
        })
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ── Row types ──

#[derive(Debug, Clone, serde::Serialize)]
pub struct ResultRow {
    pub valuation_date: String,
    pub mode: String,
    pub result_kind: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub evaluations: i64,
}
