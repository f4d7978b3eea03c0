use crate::errors::{EngineError, EngineResult};
use crate::models::{
    Contract, Greeks, MarketContext, OptionKind, PricingInputs, PricingModel, MIN_TTL_YEARS,
};
use serde::{Deserialize, Serialize};

/// Premiums the position must recover: c1 + p1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Target {
    pub call_premium: f64,
    pub put_premium: f64,
}

impl Target {
    pub fn new(call_premium: f64, put_premium: f64) -> EngineResult<Self> {
        for (name, value) in [("call premium", call_premium), ("put premium", put_premium)] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(Self {
            call_premium,
            put_premium,
        })
    }

    #[inline]
    pub fn total(&self) -> f64 {
        self.call_premium + self.put_premium
    }
}

/// Constant added to the objective on top of `premium(x) - target`.
/// This is caller policy: the engine only sees the resulting function.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Adjustment {
    #[default]
    None,
    Offset { value: f64 },
    /// `T_call * theta_call + T_put * theta_put - profit / ratio`.
    /// A leg without a theta contributes nothing.
    DecayProfit { profit: f64, ratio: f64 },
}

impl Adjustment {
    pub fn validate(&self) -> EngineResult<()> {
        match *self {
            Self::None => Ok(()),
            Self::Offset { value } if value.is_finite() => Ok(()),
            Self::Offset { value } => Err(EngineError::InvalidConfig(format!(
                "adjustment offset is not finite: {value}"
            ))),
            Self::DecayProfit { profit, ratio } => {
                if !profit.is_finite() || !ratio.is_finite() {
                    return Err(EngineError::InvalidConfig(format!(
                        "profit/ratio must be finite, got {profit}/{ratio}"
                    )));
                }
                if ratio == 0.0 {
                    return Err(EngineError::InvalidConfig("ratio must be non-zero".into()));
                }
                Ok(())
            }
        }
    }

    fn offset(&self, call: &Leg, put: &Leg) -> f64 {
        match *self {
            Self::None => 0.0,
            Self::Offset { value } => value,
            Self::DecayProfit { profit, ratio } => {
                call.decay() + put.decay() - profit / ratio
            }
        }
    }
}

/// A contract with its time to expiry fixed for the duration of a search.
#[derive(Debug, Clone, Copy)]
struct Leg {
    contract: Contract,
    ttl_years: f64,
}

impl Leg {
    fn new(contract: Contract, expected: OptionKind, market: &MarketContext) -> EngineResult<Self> {
        if contract.kind != expected {
            return Err(EngineError::InvalidConfig(format!(
                "{expected} leg was given a {} contract",
                contract.kind
            )));
        }
        contract.validate()?;

        let ttl_years = market.ttl_years(contract.expiry);
        if ttl_years <= MIN_TTL_YEARS {
            return Err(EngineError::Domain(format!(
                "{} expiring {} has no time left as of {}",
                contract.kind, contract.expiry, market.valuation_date
            )));
        }
        Ok(Self { contract, ttl_years })
    }

    #[inline]
    fn inputs(&self, spot: f64, rate: f64) -> PricingInputs {
        PricingInputs {
            spot,
            strike: self.contract.strike,
            sigma: self.contract.volatility,
            ttl_years: self.ttl_years,
            rate,
        }
    }

    #[inline]
    fn decay(&self) -> f64 {
        self.ttl_years * self.contract.theta.unwrap_or(0.0)
    }
}

/// Leg prices and greeks at one underlying price, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionSnapshot {
    pub spot: f64,
    pub call_price: f64,
    pub put_price: f64,
    pub call_greeks: Greeks,
    pub put_greeks: Greeks,
    pub objective: f64,
}

/// f(x) = Call(x) + Put(x) - (c1 + p1) + adjustment
///
/// Legs may differ in strike, volatility and expiry (strangles). Both times
/// to expiry are computed once from the valuation date at construction.
#[derive(Debug, Clone)]
pub struct StraddleObjective<M: PricingModel> {
    model: M,
    call: Leg,
    put: Leg,
    rate: f64,
    target: Target,
    offset: f64,
}

impl<M: PricingModel> StraddleObjective<M> {
    pub fn new(
        model: M,
        call: Contract,
        put: Contract,
        market: &MarketContext,
        target: Target,
        adjustment: Adjustment,
    ) -> EngineResult<Self> {
        if !market.risk_free_rate.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "risk-free rate is not finite: {}",
                market.risk_free_rate
            )));
        }
        adjustment.validate()?;
        let call = Leg::new(call, OptionKind::Call, market)?;
        let put = Leg::new(put, OptionKind::Put, market)?;
        let offset = adjustment.offset(&call, &put);
        if !offset.is_finite() {
            return Err(EngineError::InvalidConfig(format!(
                "adjustment {adjustment:?} overflows to {offset}"
            )));
        }

        Ok(Self {
            model,
            call,
            put,
            rate: market.risk_free_rate,
            target,
            offset,
        })
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Call plus put value at underlying price `x`.
    pub fn combined_premium(&self, x: f64) -> EngineResult<f64> {
        let call = self.model.price(OptionKind::Call, &self.call.inputs(x, self.rate))?;
        let put = self.model.price(OptionKind::Put, &self.put.inputs(x, self.rate))?;
        Ok(call + put)
    }

    /// The function handed to the search engine.
    #[inline]
    pub fn evaluate(&self, x: f64) -> EngineResult<f64> {
        Ok(self.combined_premium(x)? - self.target.total() + self.offset)
    }

    pub fn snapshot(&self, spot: f64) -> EngineResult<PositionSnapshot> {
        let call_inputs = self.call.inputs(spot, self.rate);
        let put_inputs = self.put.inputs(spot, self.rate);
        let call_price = self.model.price(OptionKind::Call, &call_inputs)?;
        let put_price = self.model.price(OptionKind::Put, &put_inputs)?;

        Ok(PositionSnapshot {
            spot,
            call_price,
            put_price,
            call_greeks: self.model.greeks(OptionKind::Call, &call_inputs)?,
            put_greeks: self.model.greeks(OptionKind::Put, &put_inputs)?,
            objective: call_price + put_price - self.target.total() + self.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::black_scholes::BlackScholes;
    use crate::search::{search, SearchConfig, SearchMode, SearchResult};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn leg(kind: OptionKind, strike: f64, expiry: NaiveDate) -> Contract {
        Contract {
            kind,
            strike,
            volatility: 0.3,
            expiry,
            theta: None,
        }
    }

    fn entry_target(spot: f64, on: NaiveDate, call: Contract, put: Contract) -> Target {
        let objective = StraddleObjective::new(
            BlackScholes::new(),
            call,
            put,
            &MarketContext::new(on),
            Target::new(0.0, 0.0).unwrap(),
            Adjustment::None,
        )
        .unwrap();
        let snap = objective.snapshot(spot).unwrap();
        Target::new(snap.call_price, snap.put_price).unwrap()
    }

    #[test]
    fn test_target_rejects_negative_premiums() {
        assert!(matches!(Target::new(-1.0, 2.0), Err(EngineError::InvalidConfig(_))));
        assert!(matches!(Target::new(1.0, -0.01), Err(EngineError::InvalidConfig(_))));
        assert!(matches!(Target::new(f64::NAN, 1.0), Err(EngineError::InvalidConfig(_))));
        assert_eq!(Target::new(10.0, 5.0).unwrap().total(), 15.0);
    }

    #[test]
    fn test_evaluate_matches_leg_sum() {
        let expiry = date(2025, 6, 30);
        let market = MarketContext::new(date(2025, 1, 1));
        let call = leg(OptionKind::Call, 140.0, expiry);
        let put = leg(OptionKind::Put, 120.0, expiry);
        let objective = StraddleObjective::new(
            BlackScholes::new(),
            call,
            put,
            &market,
            Target::new(10.0, 5.0).unwrap(),
            Adjustment::Offset { value: 1.5 },
        )
        .unwrap();

        let bs = BlackScholes::new();
        let ttl = market.ttl_years(expiry);
        let inputs = |strike| PricingInputs { spot: 130.0, strike, sigma: 0.3, ttl_years: ttl, rate: market.risk_free_rate };
        let expected = bs.price(OptionKind::Call, &inputs(140.0)).unwrap()
            + bs.price(OptionKind::Put, &inputs(120.0)).unwrap()
            - 15.0
            + 1.5;
        let got = objective.evaluate(130.0).unwrap();
        assert!((got - expected).abs() < 1e-12, "got={got} expected={expected}");
        assert_eq!(objective.model_name(), "Black-Scholes");
    }

    #[test]
    fn test_decay_profit_offset() {
        let market = MarketContext::new(date(2025, 3, 1));
        let call = Contract {
            theta: Some(-0.0023),
            ..leg(OptionKind::Call, 140.0, date(2025, 5, 2))
        };
        let put = Contract {
            theta: Some(-0.0074),
            ..leg(OptionKind::Put, 120.0, date(2025, 5, 10))
        };
        let adjustment = Adjustment::DecayProfit { profit: 5.0, ratio: 2.0 };
        let objective = StraddleObjective::new(
            BlackScholes::new(),
            call,
            put,
            &market,
            Target::new(10.0, 5.0).unwrap(),
            adjustment,
        )
        .unwrap();
        let expected = 62.0 / 365.0 * -0.0023 + 70.0 / 365.0 * -0.0074 - 2.5;
        assert!((objective.offset - expected).abs() < 1e-12, "offset={}", objective.offset);

        let no_theta = StraddleObjective::new(
            BlackScholes::new(),
            Contract { theta: None, ..call },
            Contract { theta: None, ..put },
            &market,
            Target::new(10.0, 5.0).unwrap(),
            adjustment,
        )
        .unwrap();
        assert!((no_theta.offset + 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_construction() {
        let market = MarketContext::new(date(2025, 3, 1));
        let expiry = date(2025, 6, 30);
        let call = leg(OptionKind::Call, 100.0, expiry);
        let put = leg(OptionKind::Put, 100.0, expiry);
        let target = Target::new(1.0, 1.0).unwrap();

        let swapped = StraddleObjective::new(BlackScholes::new(), put, call, &market, target, Adjustment::None);
        assert!(matches!(swapped, Err(EngineError::InvalidConfig(_))));

        let zero_ratio = Adjustment::DecayProfit { profit: 1.0, ratio: 0.0 };
        let bad_policy = StraddleObjective::new(BlackScholes::new(), call, put, &market, target, zero_ratio);
        assert!(matches!(bad_policy, Err(EngineError::InvalidConfig(_))));

        // Non-zero but so small that profit / ratio overflows
        let tiny_ratio = Adjustment::DecayProfit { profit: 1.0, ratio: 1e-310 };
        assert!(tiny_ratio.validate().is_ok());
        let overflow = StraddleObjective::new(BlackScholes::new(), call, put, &market, target, tiny_ratio);
        assert!(matches!(overflow, Err(EngineError::InvalidConfig(_))));

        let expired = Contract { expiry: date(2025, 3, 1), ..call };
        let late = StraddleObjective::new(BlackScholes::new(), expired, put, &market, target, Adjustment::None);
        assert!(matches!(late, Err(EngineError::Domain(_))));

        let flat = Contract { volatility: 0.0, ..put };
        let no_vol = StraddleObjective::new(BlackScholes::new(), call, flat, &market, target, Adjustment::None);
        assert!(matches!(no_vol, Err(EngineError::Domain(_))));
    }

    #[test]
    fn test_straddle_decay_opens_a_band() {
        let expiry = date(2025, 6, 30);
        let call = leg(OptionKind::Call, 100.0, expiry);
        let put = leg(OptionKind::Put, 100.0, expiry);
        let target = entry_target(100.0, date(2025, 1, 1), call, put);

        // Two months of decay: the straddle is worth less than paid near the strike
        let later = MarketContext::new(date(2025, 3, 1));
        let objective =
            StraddleObjective::new(BlackScholes::new(), call, put, &later, target, Adjustment::None).unwrap();
        assert!(objective.evaluate(100.0).unwrap() < 0.0);

        let cfg = SearchConfig::default();
        let result = search(|x| objective.evaluate(x), &cfg, SearchMode::TwoCrossings).unwrap();
        let SearchResult::RootPair { lower, upper } = result else {
            panic!("expected root pair, got {result:?}");
        };
        assert!(lower < 100.0 && 100.0 < upper, "band [{lower}, {upper}] should contain the strike");
        for root in [lower, upper] {
            // Straddle delta is at most 2 in magnitude
            let residual = objective.evaluate(root).unwrap().abs();
            assert!(residual <= 2.0 * cfg.precision, "|f({root})|={residual}");
        }
    }

    #[test]
    fn test_profit_hurdle_widens_the_band() {
        let expiry = date(2025, 6, 30);
        let call = leg(OptionKind::Call, 100.0, expiry);
        let put = leg(OptionKind::Put, 100.0, expiry);
        let target = entry_target(100.0, date(2025, 1, 1), call, put);
        let later = MarketContext::new(date(2025, 3, 1));
        let cfg = SearchConfig::default();

        let band = |adjustment| {
            let objective =
                StraddleObjective::new(BlackScholes::new(), call, put, &later, target, adjustment).unwrap();
            match search(|x| objective.evaluate(x), &cfg, SearchMode::TwoCrossings).unwrap() {
                SearchResult::RootPair { lower, upper } => (lower, upper),
                other => panic!("expected root pair, got {other:?}"),
            }
        };

        let (plain_lo, plain_hi) = band(Adjustment::None);
        let (hurdle_lo, hurdle_hi) = band(Adjustment::DecayProfit { profit: 4.0, ratio: 1.0 });
        assert!(hurdle_lo < plain_lo, "{hurdle_lo} !< {plain_lo}");
        assert!(hurdle_hi > plain_hi, "{hurdle_hi} !> {plain_hi}");
    }

    #[test]
    fn test_lower_threshold_on_call_heavy_position() {
        // Far OTM put: the combined value rises with the underlying
        let expiry = date(2025, 12, 31);
        let market = MarketContext::new(date(2025, 1, 1));
        let call = leg(OptionKind::Call, 100.0, expiry);
        let put = leg(OptionKind::Put, 20.0, expiry);
        let objective = StraddleObjective::new(
            BlackScholes::new(),
            call,
            put,
            &market,
            Target::new(15.0, 0.0).unwrap(),
            Adjustment::None,
        )
        .unwrap();
        let cfg = SearchConfig {
            start: 50.0,
            ..SearchConfig::default()
        };
        let result = search(|x| objective.evaluate(x), &cfg, SearchMode::LowerThreshold).unwrap();
        let SearchResult::LowerBoundOnly { x_min, .. } = result else {
            panic!("expected lower bound, got {result:?}");
        };
        assert!(objective.evaluate(x_min + cfg.precision).unwrap() > 0.0);
        assert!(objective.evaluate(x_min - cfg.precision).unwrap() < 0.0);
    }
}
