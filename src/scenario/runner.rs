use crate::errors::EngineResult;
use crate::scenario::SearchJob;
use crate::search::objective::PositionSnapshot;
use crate::search::{search, SearchResult};
use crate::state::{AppState, DbCommand};
use chrono::NaiveDate;
use portable_atomic::Ordering;
use std::sync::Arc;

/// What one search produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobOutcome {
    pub valuation_date: NaiveDate,
    pub result: SearchResult,
    pub evaluations: u64,
    pub snapshot: Option<PositionSnapshot>,
}

/// Run one search to completion. Pure computation, no IO: safe to call from
/// any thread.
pub fn run_job(job: &SearchJob) -> EngineResult<JobOutcome> {
    let mut evaluations: u64 = 0;
    let result = search(
        |x| {
            evaluations += 1;
            job.objective.evaluate(x)
        },
        &job.config,
        job.mode,
    )?;

    let snapshot = job
        .reference_spot
        .map(|spot| job.objective.snapshot(spot))
        .transpose()?;

    tracing::debug!(
        scenario = %job.scenario,
        valuation_date = %job.valuation_date,
        model = job.objective.model_name(),
        evaluations,
        result = result.kind(),
        "search complete"
    );

    Ok(JobOutcome {
        valuation_date: job.valuation_date,
        result,
        evaluations,
        snapshot,
    })
}

/// Run every job on the blocking pool, one search per task, and hand each
/// result to the DB writer as it completes (in date order).
/// A failed search is logged and counted; the rest of the batch continues.
pub async fn run_batch(state: Arc<AppState>, run_id: &str, jobs: Vec<SearchJob>) -> EngineResult<Vec<JobOutcome>> {
    tracing::info!(run_id, jobs = jobs.len(), "batch started");

    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let valuation_date = job.valuation_date;
            let handle = tokio::task::spawn_blocking(move || {
                let outcome = run_job(&job);
                (job, outcome)
            });
            (valuation_date, handle)
        })
        .collect();

    let total = handles.len();
    let mut outcomes = Vec::with_capacity(total);
    for (index, (valuation_date, handle)) in handles.into_iter().enumerate() {
        state.counters.searches_run.fetch_add(1, Ordering::Relaxed);

        match handle.await {
            Ok((job, Ok(outcome))) => {
                if outcome.result.is_found() {
                    state.counters.roots_found.fetch_add(1, Ordering::Relaxed);
                } else {
                    state.counters.not_found.fetch_add(1, Ordering::Relaxed);
                }
                if let Err(e) = state.record(result_command(run_id, &job, &outcome)).await {
                    // Searches still on the blocking pool finish but their results are lost
                    tracing::error!(
                        run_id,
                        error = %e,
                        collected = outcomes.len(),
                        abandoned = total - index,
                        "result sink closed, abandoning batch"
                    );
                    return Err(e);
                }
                outcomes.push(outcome);
            }
            Ok((_, Err(e))) => {
                state.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(valuation_date = %valuation_date, error = %e, "search failed");
            }
            Err(e) => {
                state.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(valuation_date = %valuation_date, error = %e, "search task panicked");
            }
        }
    }

    Ok(outcomes)
}

fn result_command(run_id: &str, job: &SearchJob, outcome: &JobOutcome) -> DbCommand {
    let (lower, upper) = outcome.result.bounds();
    let snapshot_json = outcome
        .snapshot
        .as_ref()
        .and_then(|s| serde_json::to_string(s).ok());

    DbCommand::InsertResult {
        run_id: run_id.to_string(),
        scenario: job.scenario.clone(),
        valuation_date: job.valuation_date.to_string(),
        mode: job.mode.to_string(),
        result_kind: outcome.result.kind(),
        lower,
        upper,
        evaluations: i64::try_from(outcome.evaluations).unwrap_or(i64::MAX),
        snapshot_json,
        recorded_at: chrono::Utc::now().to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;
    use crate::models::black_scholes::BlackScholes;
    use crate::models::{Contract, MarketContext, OptionKind};
    use crate::search::objective::{Adjustment, StraddleObjective, Target};
    use crate::search::{SearchConfig, SearchMode};
    use tokio::sync::mpsc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn job(valuation_date: NaiveDate, target: Target) -> SearchJob {
        let call = Contract {
            kind: OptionKind::Call,
            strike: 100.0,
            volatility: 0.3,
            expiry: date(2025, 6, 30),
            theta: None,
        };
        let put = Contract { kind: OptionKind::Put, ..call };
        let market = MarketContext::new(valuation_date);
        SearchJob {
            scenario: "straddle".into(),
            valuation_date,
            objective: StraddleObjective::new(BlackScholes::new(), call, put, &market, target, Adjustment::None)
                .unwrap(),
            config: SearchConfig::default(),
            mode: SearchMode::TwoCrossings,
            reference_spot: Some(100.0),
        }
    }

    #[test]
    fn test_run_job_counts_evaluations_and_snapshots() {
        let outcome = run_job(&job(date(2025, 3, 1), Target::new(9.0, 7.7).unwrap())).unwrap();
        assert!(matches!(outcome.result, SearchResult::RootPair { .. }), "{:?}", outcome.result);
        assert!(outcome.evaluations > 0);
        let snap = outcome.snapshot.unwrap();
        assert_eq!(snap.spot, 100.0);
        assert!(snap.objective < 0.0, "inside the band the objective is negative");
    }

    #[test]
    fn test_run_job_is_deterministic() {
        let j = job(date(2025, 3, 1), Target::new(9.0, 7.7).unwrap());
        let a = run_job(&j).unwrap();
        let b = run_job(&j).unwrap();
        assert_eq!(a.result, b.result);
        assert_eq!(a.evaluations, b.evaluations);
    }

    #[tokio::test]
    async fn test_run_batch_records_every_result() {
        let (tx, mut rx) = mpsc::channel(16);
        let state = Arc::new(AppState::new(tx));
        let jobs = vec![
            job(date(2025, 3, 1), Target::new(9.0, 7.7).unwrap()),
            // Target too small to ever be undercut: no crossing
            job(date(2025, 3, 2), Target::new(0.0, 0.0).unwrap()),
        ];

        let outcomes = run_batch(state.clone(), "run-1", jobs).await.unwrap();
        assert_eq!(outcomes.len(), 2);

        let summary = state.counters.summary();
        assert_eq!(summary.searches_run, 2);
        assert_eq!(summary.roots_found, 1);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.failures, 0);

        drop(state);
        let mut kinds = Vec::new();
        while let Some(cmd) = rx.recv().await {
            if let DbCommand::InsertResult { run_id, valuation_date, result_kind, .. } = cmd {
                assert_eq!(run_id, "run-1");
                kinds.push((valuation_date, result_kind));
            }
        }
        assert_eq!(
            kinds,
            vec![("2025-03-01".to_string(), "root_pair"), ("2025-03-02".to_string(), "not_found")]
        );
    }

    #[tokio::test]
    async fn test_run_batch_fails_when_sink_closes() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let state = Arc::new(AppState::new(tx));
        let jobs = vec![
            job(date(2025, 3, 1), Target::new(9.0, 7.7).unwrap()),
            job(date(2025, 3, 2), Target::new(9.0, 7.7).unwrap()),
        ];

        let result = run_batch(state.clone(), "run-2", jobs).await;
        assert!(matches!(result, Err(EngineError::ChannelClosed(_))), "{result:?}");
        // Stopped at the first result it could not record
        assert_eq!(state.counters.summary().searches_run, 1);
    }
}
