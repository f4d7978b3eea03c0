use crate::errors::{EngineError, EngineResult};
use crate::models::{Contract, OptionKind};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ── Quote records ──

/// One option record as written by the quote export: Greeks plus the
/// underlying and contract terms. Everything past the symbol is optional
/// because exports differ in what they fill in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionQuote {
    pub symbol: String,
    pub implied_volatility: Option<f64>,
    pub delta: Option<f64>,
    pub theta: Option<f64>,
    pub rho: Option<f64>,
    pub underlying_price: Option<f64>,
    pub expiration_date: Option<String>,
    pub strike_price: Option<f64>,
    pub option_type: Option<OptionKind>,
    /// Last traded option price.
    pub premium: Option<f64>,
}

/// How `implied_volatility` is expressed in the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityUnit {
    /// 56.3 means 56.3%
    #[default]
    Percent,
    Fraction,
}

impl VolatilityUnit {
    #[inline]
    fn to_fraction(self, value: f64) -> f64 {
        match self {
            Self::Percent => value / 100.0,
            Self::Fraction => value,
        }
    }
}

impl OptionQuote {
    /// Build a contract from this quote. `kind` overrides `option_type`
    /// when the export leaves it blank.
    pub fn to_contract(&self, kind: OptionKind, unit: VolatilityUnit) -> EngineResult<Contract> {
        if let Some(quoted) = self.option_type {
            if quoted != kind {
                return Err(EngineError::Parse(format!(
                    "{} is a {quoted}, used as a {kind} leg",
                    self.symbol
                )));
            }
        }
        let strike = self.strike_price.ok_or_else(|| missing(&self.symbol, "strike_price"))?;
        let iv = self
            .implied_volatility
            .ok_or_else(|| missing(&self.symbol, "implied_volatility"))?;
        let expiry = self
            .expiration_date
            .as_deref()
            .ok_or_else(|| missing(&self.symbol, "expiration_date"))?;

        let contract = Contract {
            kind,
            strike,
            volatility: unit.to_fraction(iv),
            expiry: parse_date(expiry)?,
            theta: self.theta,
        };
        contract.validate()?;
        Ok(contract)
    }
}

fn missing(symbol: &str, field: &str) -> EngineError {
    EngineError::Parse(format!("{symbol}: missing {field}"))
}

/// Accepts `2025-05-02` and the tuple-style `(2025, 5, 2)`.
pub fn parse_date(raw: &str) -> EngineResult<NaiveDate> {
    let raw = raw.trim();
    if raw.starts_with('(') {
        return Ok(NaiveDate::parse_from_str(raw, "(%Y, %m, %d)")?);
    }
    // Some exports append a time
    let day = raw.split([' ', 'T']).next().unwrap_or(raw);
    Ok(NaiveDate::parse_from_str(day, "%Y-%m-%d")?)
}

// ── Loading ──

pub fn load_quotes(path: &Path) -> EngineResult<Vec<OptionQuote>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
    let quotes: Vec<OptionQuote> = serde_json::from_str(&raw)?;
    tracing::info!(path = %path.display(), count = quotes.len(), "option quotes loaded");
    Ok(quotes)
}

pub fn find_quote<'a>(quotes: &'a [OptionQuote], symbol: &str) -> EngineResult<&'a OptionQuote> {
    quotes
        .iter()
        .find(|q| q.symbol == symbol)
        .ok_or_else(|| EngineError::Parse(format!("no quote for symbol {symbol}")))
}
