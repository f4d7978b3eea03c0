mod config;
mod db;
mod errors;
mod feeds;
mod models;
mod scenario;
mod search;
mod state;

use crate::errors::{EngineError, EngineResult};
use crate::scenario::runner;
use crate::search::SearchResult;
use crate::state::{AppState, DbCommand};
use std::sync::Arc;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("straddle_breakeven starting");

    let cfg = match config::AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("config error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cfg).await {
        tracing::error!(error = %e, "run failed");
        std::process::exit(1);
    }
}

async fn run(cfg: config::AppConfig) -> EngineResult<()> {
    let scenario = scenario::load_scenario(&cfg.scenario_path)?;

    let quotes = if scenario.needs_quotes() {
        feeds::option_data::load_quotes(&cfg.option_data_path)?
    } else {
        Vec::new()
    };

    let jobs = scenario::build_jobs(&scenario, &quotes, cfg.risk_free_rate, cfg.search)?;
    if jobs.is_empty() {
        tracing::warn!(scenario = %scenario.name, "no valuation dates before expiry, nothing to search");
        return Ok(());
    }

    let db_pool = db::init_db(&cfg.data_dir)?;
    let (db_tx, db_rx) = mpsc::channel::<DbCommand>(1024);
    let writer = tokio::spawn(db::run_db_writer(db_pool.clone(), db_rx));
    let state = Arc::new(AppState::new(db_tx));

    let run_id = uuid::Uuid::new_v4().to_string();
    state
        .record(DbCommand::InsertRun {
            run_id: run_id.clone(),
            scenario: scenario.name.clone(),
            mode: scenario.mode.to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
        })
        .await?;

    let outcomes = runner::run_batch(state.clone(), &run_id, jobs).await?;

    for outcome in &outcomes {
        match outcome.result {
            SearchResult::RootPair { lower, upper } => {
                tracing::info!(date = %outcome.valuation_date, lower, upper, "unsafe band (objective < 0 inside)");
            }
            SearchResult::LowerBoundOnly { x_min, x_max_search } => {
                tracing::info!(date = %outcome.valuation_date, x_min, x_max_search, "safe above");
            }
            SearchResult::SingleRoot { x } => {
                tracing::info!(date = %outcome.valuation_date, x, "crossing");
            }
            SearchResult::NotFound => {
                tracing::info!(date = %outcome.valuation_date, "no crossing within search bounds");
            }
        }
    }

    let summary = state.counters.summary();
    state
        .record(DbCommand::FinishRun {
            run_id: run_id.clone(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            summary_json: serde_json::to_string(&summary)?,
        })
        .await?;

    // Last sender goes away here; the writer drains and exits
    drop(state);
    writer
        .await
        .map_err(|e| EngineError::ChannelClosed(format!("db writer task: {e}")))?;

    let report_path = cfg.data_dir.join(format!("{run_id}.json"));
    std::fs::write(&report_path, serde_json::to_string_pretty(&outcomes)?)?;

    let persisted = db::get_run_results(&db_pool, &run_id)?.len();
    tracing::info!(
        run_id = %run_id,
        searches = summary.searches_run,
        found = summary.roots_found,
        not_found = summary.not_found,
        failures = summary.failures,
        persisted,
        report = %report_path.display(),
        "run complete"
    );
    Ok(())
}
