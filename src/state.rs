use crate::errors::{EngineError, EngineResult};
use portable_atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

// ── Messages to the DB writer (bounded channel) ──

#[derive(Debug, Clone)]
pub enum DbCommand {
    InsertRun {
        run_id: String,
        scenario: String,
        mode: String,
        started_at: String,
    },
    InsertResult {
        run_id: String,
        scenario: String,
        valuation_date: String,
        mode: String,
        result_kind: &'static str,
        lower: Option<f64>,
        upper: Option<f64>,
        evaluations: i64,
        snapshot_json: Option<String>,
        recorded_at: String,
    },
    FinishRun {
        run_id: String,
        finished_at: String,
        summary_json: String,
    },
}

// ── Run counters (lock-free, shared by worker tasks) ──

#[derive(Debug, Default)]
pub struct RunCounters {
    pub searches_run: AtomicU64,
    pub roots_found: AtomicU64,
    pub not_found: AtomicU64,
    pub failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RunSummary {
    pub searches_run: u64,
    pub roots_found: u64,
    pub not_found: u64,
    pub failures: u64,
}

impl RunCounters {
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            searches_run: self.searches_run.load(Ordering::Relaxed),
            roots_found: self.roots_found.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

// ── Shared state ──

pub struct AppState {
    pub db_tx: mpsc::Sender<DbCommand>,
    pub counters: RunCounters,
}

impl AppState {
    pub fn new(db_tx: mpsc::Sender<DbCommand>) -> Self {
        Self {
            db_tx,
            counters: RunCounters::default(),
        }
    }

    /// Hand a command to the writer. Fails only if the writer has shut down.
    pub async fn record(&self, cmd: DbCommand) -> EngineResult<()> {
        self.db_tx
            .send(cmd)
            .await
            .map_err(|e| EngineError::ChannelClosed(format!("db writer: {e}")))
    }
}
