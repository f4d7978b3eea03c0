pub mod runner;

use crate::errors::{EngineError, EngineResult};
use crate::feeds::option_data::{find_quote, OptionQuote, VolatilityUnit};
use crate::models::black_scholes::BlackScholes;
use crate::models::{Contract, MarketContext, OptionKind, MIN_TTL_YEARS};
use crate::search::objective::{Adjustment, StraddleObjective, Target};
use crate::search::{SearchConfig, SearchMode};
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use std::path::Path;

// ── Scenario file ──

/// A position and the valuation dates to search it over.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub call: LegSpec,
    pub put: LegSpec,
    pub target: TargetSpec,
    #[serde(default)]
    pub adjustment: Adjustment,
    pub mode: SearchMode,
    pub valuation: ValuationSweep,
    /// Overrides the environment's rate for this scenario.
    pub risk_free_rate: Option<f64>,
    #[serde(default)]
    pub search: SearchOverrides,
    /// Underlying price at which leg prices and greeks are reported.
    pub reference_spot: Option<f64>,
    #[serde(default)]
    pub volatility_unit: VolatilityUnit,
}

/// Either a symbol in the quote export or the contract terms inline.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LegSpec {
    Quote {
        quote: String,
    },
    Inline {
        strike: f64,
        volatility: f64,
        expiry: NaiveDate,
        theta: Option<f64>,
    },
}

impl LegSpec {
    fn uses_quotes(&self) -> bool {
        matches!(self, Self::Quote { .. })
    }

    fn resolve(&self, kind: OptionKind, quotes: &[OptionQuote], unit: VolatilityUnit) -> EngineResult<Contract> {
        match self {
            Self::Quote { quote } => find_quote(quotes, quote)?.to_contract(kind, unit),
            Self::Inline {
                strike,
                volatility,
                expiry,
                theta,
            } => {
                let contract = Contract {
                    kind,
                    strike: *strike,
                    volatility: *volatility,
                    expiry: *expiry,
                    theta: *theta,
                };
                contract.validate()?;
                Ok(contract)
            }
        }
    }
}

/// Where c1 and p1 come from.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TargetSpec {
    /// Premiums actually paid.
    Observed { call_premium: f64, put_premium: f64 },
    /// Model value of both legs at `spot` on the entry date `at`.
    Priced { spot: f64, at: NaiveDate },
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ValuationSweep {
    pub from: NaiveDate,
    pub to: NaiveDate,
    #[serde(default = "default_every_days")]
    pub every_days: u32,
}

fn default_every_days() -> u32 {
    1
}

impl ValuationSweep {
    pub fn dates(&self) -> EngineResult<Vec<NaiveDate>> {
        if self.every_days == 0 {
            return Err(EngineError::InvalidConfig("every_days must be at least 1".into()));
        }
        if self.to < self.from {
            return Err(EngineError::InvalidConfig(format!(
                "valuation sweep ends ({}) before it starts ({})",
                self.to, self.from
            )));
        }
        let mut dates = Vec::new();
        let mut day = self.from;
        while day <= self.to {
            dates.push(day);
            day = match day.checked_add_days(Days::new(u64::from(self.every_days))) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(dates)
    }
}

/// Optional per-scenario replacements for the environment's search config.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SearchOverrides {
    pub start: Option<f64>,
    pub step: Option<f64>,
    pub max_iterations: Option<u32>,
    pub precision: Option<f64>,
    pub x_max_search: Option<f64>,
}

impl SearchOverrides {
    pub fn apply(&self, base: SearchConfig) -> SearchConfig {
        SearchConfig {
            start: self.start.unwrap_or(base.start),
            step: self.step.unwrap_or(base.step),
            max_iterations: self.max_iterations.unwrap_or(base.max_iterations),
            precision: self.precision.unwrap_or(base.precision),
            x_max_search: self.x_max_search.unwrap_or(base.x_max_search),
        }
    }
}

impl Scenario {
    pub fn needs_quotes(&self) -> bool {
        self.call.uses_quotes() || self.put.uses_quotes()
    }
}

pub fn load_scenario(path: &Path) -> EngineResult<Scenario> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
    let scenario: Scenario = serde_json::from_str(&raw)?;
    tracing::info!(name = %scenario.name, mode = %scenario.mode, "scenario loaded");
    Ok(scenario)
}

// ── Jobs ──

/// One search: a position valued on one date. Owns everything it needs so it
/// can move onto a worker thread.
#[derive(Debug, Clone)]
pub struct SearchJob {
    pub scenario: String,
    pub valuation_date: NaiveDate,
    pub objective: StraddleObjective<BlackScholes>,
    pub config: SearchConfig,
    pub mode: SearchMode,
    pub reference_spot: Option<f64>,
}

/// Resolve legs and target once, then build one job per valuation date.
/// Dates on or after the first expiry are skipped.
pub fn build_jobs(
    scenario: &Scenario,
    quotes: &[OptionQuote],
    default_rate: f64,
    default_search: SearchConfig,
) -> EngineResult<Vec<SearchJob>> {
    let rate = scenario.risk_free_rate.unwrap_or(default_rate);
    let config = scenario.search.apply(default_search);
    config.validate()?;
    scenario.adjustment.validate()?;

    let call = scenario.call.resolve(OptionKind::Call, quotes, scenario.volatility_unit)?;
    let put = scenario.put.resolve(OptionKind::Put, quotes, scenario.volatility_unit)?;
    let target = resolve_target(&scenario.target, call, put, rate)?;
    tracing::info!(
        call_premium = target.call_premium,
        put_premium = target.put_premium,
        "target resolved"
    );

    let mut jobs = Vec::new();
    for date in scenario.valuation.dates()? {
        let market = MarketContext::new(date).with_rate(rate);
        let first_expiry = call.expiry.min(put.expiry);
        if market.ttl_years(first_expiry) <= MIN_TTL_YEARS {
            tracing::warn!(valuation_date = %date, expiry = %first_expiry, "skipping date at or past expiry");
            continue;
        }
        let objective = StraddleObjective::new(BlackScholes::new(), call, put, &market, target, scenario.adjustment)?;
        jobs.push(SearchJob {
            scenario: scenario.name.clone(),
            valuation_date: date,
            objective,
            config,
            mode: scenario.mode,
            reference_spot: scenario.reference_spot,
        });
    }
    Ok(jobs)
}

fn resolve_target(source: &TargetSpec, call: Contract, put: Contract, rate: f64) -> EngineResult<Target> {
    match *source {
        TargetSpec::Observed {
            call_premium,
            put_premium,
        } => Target::new(call_premium, put_premium),
        TargetSpec::Priced { spot, at } => {
            let market = MarketContext::new(at).with_rate(rate);
            let entry = StraddleObjective::new(
                BlackScholes::new(),
                call,
                put,
                &market,
                Target::new(0.0, 0.0)?,
                Adjustment::None,
            )?;
            let snapshot = entry.snapshot(spot)?;
            Target::new(snapshot.call_price, snapshot.put_price)
        }
    }
}
