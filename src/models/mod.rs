pub mod black_scholes;

use crate::errors::{EngineError, EngineResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Annual risk-free rate used when neither the environment nor a scenario
/// overrides it.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.042197;

/// Shortest time-to-expiry (in years) accepted by the pricer.
/// Below this `sigma * sqrt(T)` is too close to zero for d1/d2 to mean anything.
pub const MIN_TTL_YEARS: f64 = 1e-6;

pub(crate) const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl std::fmt::Display for OptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// One option leg. Built once before a search and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub kind: OptionKind,
    pub strike: f64,
    /// Annualized volatility as a fraction (0.56, not 56).
    pub volatility: f64,
    pub expiry: NaiveDate,
    /// Time decay as quoted by the data source. May be negative.
    #[serde(default)]
    pub theta: Option<f64>,
}

impl Contract {
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.strike.is_finite() && self.strike > 0.0) {
            return Err(EngineError::Domain(format!(
                "{} strike must be positive, got {}",
                self.kind, self.strike
            )));
        }
        if !(self.volatility.is_finite() && self.volatility > 0.0) {
            return Err(EngineError::Domain(format!(
                "{} volatility must be positive, got {}",
                self.kind, self.volatility
            )));
        }
        if let Some(theta) = self.theta {
            if !theta.is_finite() {
                return Err(EngineError::Domain(format!("{} theta is not finite", self.kind)));
            }
        }
        Ok(())
    }
}

/// Market state shared by every evaluation of one search.
/// The valuation date is an explicit input: nothing here reads the clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketContext {
    pub risk_free_rate: f64,
    pub valuation_date: NaiveDate,
}

impl MarketContext {
    pub fn new(valuation_date: NaiveDate) -> Self {
        Self {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            valuation_date,
        }
    }

    pub fn with_rate(mut self, risk_free_rate: f64) -> Self {
        self.risk_free_rate = risk_free_rate;
        self
    }

    /// Time to `expiry` in years, counted in whole elapsed days over 365.
    /// Zero or negative when the contract has expired as of the valuation date.
    #[inline]
    pub fn ttl_years(&self, expiry: NaiveDate) -> f64 {
        expiry.signed_duration_since(self.valuation_date).num_days() as f64 / DAYS_PER_YEAR
    }
}

/// Scalar inputs for one closed-form evaluation. Stack-allocated, Copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingInputs {
    pub spot: f64,
    pub strike: f64,
    pub sigma: f64,
    pub ttl_years: f64,
    pub rate: f64,
}

impl PricingInputs {
    /// Rejects anything outside the model's domain. Called before every evaluation.
    pub fn validate(&self) -> EngineResult<()> {
        let all_finite = self.spot.is_finite()
            && self.strike.is_finite()
            && self.sigma.is_finite()
            && self.ttl_years.is_finite()
            && self.rate.is_finite();
        if !all_finite {
            return Err(EngineError::Domain(format!("non-finite pricing input: {self:?}")));
        }
        if self.spot <= 0.0 {
            return Err(EngineError::Domain(format!("spot must be positive, got {}", self.spot)));
        }
        if self.strike <= 0.0 {
            return Err(EngineError::Domain(format!("strike must be positive, got {}", self.strike)));
        }
        if self.sigma <= 0.0 {
            return Err(EngineError::Domain(format!("sigma must be positive, got {}", self.sigma)));
        }
        if self.ttl_years <= MIN_TTL_YEARS {
            return Err(EngineError::Domain(format!(
                "time to expiry must exceed {MIN_TTL_YEARS} years, got {}",
                self.ttl_years
            )));
        }
        Ok(())
    }
}

/// Sensitivities of one option. Theta is reported both per year (model units)
/// and per calendar day (how quote services usually print it).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Greeks {
    pub delta: f64,
    pub theta_per_year: f64,
    pub theta_per_day: f64,
}

/// All pricing models implement this trait.
/// price() must be a pure function: deterministic output from inputs only.
pub trait PricingModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fair value of a European option, or a `Domain` error for invalid inputs.
    fn price(&self, kind: OptionKind, inputs: &PricingInputs) -> EngineResult<f64>;

    fn greeks(&self, kind: OptionKind, inputs: &PricingInputs) -> EngineResult<Greeks>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_ttl_counts_whole_days() {
        let ctx = MarketContext::new(date(2025, 1, 1));
        let t = ctx.ttl_years(date(2025, 4, 2));
        assert!((t - 91.0 / 365.0).abs() < 1e-12, "ttl={t}");
        assert!(ctx.ttl_years(date(2024, 12, 31)) < 0.0);
        assert_eq!(ctx.ttl_years(date(2025, 1, 1)), 0.0);
    }

    #[test]
    fn test_default_rate() {
        let ctx = MarketContext::new(date(2025, 1, 1));
        assert_eq!(ctx.risk_free_rate, DEFAULT_RISK_FREE_RATE);
        assert_eq!(ctx.with_rate(0.05).risk_free_rate, 0.05);
    }

    #[test]
    fn test_inputs_reject_out_of_domain() {
        let ok = PricingInputs { spot: 100.0, strike: 100.0, sigma: 0.2, ttl_years: 0.25, rate: 0.04 };
        assert!(ok.validate().is_ok());
        for bad in [
            PricingInputs { spot: 0.0, ..ok },
            PricingInputs { strike: -1.0, ..ok },
            PricingInputs { sigma: 0.0, ..ok },
            PricingInputs { ttl_years: 0.0, ..ok },
            PricingInputs { ttl_years: 1e-9, ..ok },
            PricingInputs { rate: f64::NAN, ..ok },
        ] {
            assert!(
                matches!(bad.validate(), Err(EngineError::Domain(_))),
                "expected domain error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_contract_validation() {
        let c = Contract {
            kind: OptionKind::Call,
            strike: 140.0,
            volatility: 0.56,
            expiry: date(2025, 5, 2),
            theta: Some(-0.0023),
        };
        assert!(c.validate().is_ok());
        assert!(Contract { volatility: 0.0, ..c }.validate().is_err());
        assert!(Contract { strike: f64::INFINITY, ..c }.validate().is_err());
    }
}
