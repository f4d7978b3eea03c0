use crate::errors::EngineResult;
use crate::models::{Greeks, OptionKind, PricingInputs, PricingModel, DAYS_PER_YEAR};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

/// Black-Scholes pricing of European calls and puts.
///
/// d1 = (ln(S/K) + (r + sigma^2/2)*T) / (sigma * sqrt(T))
/// d2 = d1 - sigma * sqrt(T)
///
/// Call = S*Phi(d1) - K*exp(-rT)*Phi(d2)
/// Put  = K*exp(-rT)*Phi(-d2) - S*Phi(-d1)
#[derive(Debug, Clone, Copy)]
pub struct BlackScholes {
    /// Standard normal distribution (created once, reused)
    normal: Normal,
}

/// Intermediate terms shared by price and greeks.
#[derive(Debug, Clone, Copy)]
struct Terms {
    d1: f64,
    d2: f64,
    sigma_sqrt_t: f64,
    discounted_strike: f64,
}

impl BlackScholes {
    pub fn new() -> Self {
        Self {
            normal: Normal::standard(),
        }
    }

    #[inline]
    fn terms(inputs: &PricingInputs) -> EngineResult<Terms> {
        inputs.validate()?;
        let sigma_sqrt_t = inputs.sigma * inputs.ttl_years.sqrt();
        let d1 = ((inputs.spot / inputs.strike).ln()
            + (inputs.rate + 0.5 * inputs.sigma * inputs.sigma) * inputs.ttl_years)
            / sigma_sqrt_t;
        Ok(Terms {
            d1,
            d2: d1 - sigma_sqrt_t,
            sigma_sqrt_t,
            discounted_strike: inputs.strike * (-inputs.rate * inputs.ttl_years).exp(),
        })
    }
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingModel for BlackScholes {
    #[inline]
    fn name(&self) -> &'static str {
        "Black-Scholes"
    }

    #[inline]
    fn price(&self, kind: OptionKind, inputs: &PricingInputs) -> EngineResult<f64> {
        let t = Self::terms(inputs)?;
        let value = match kind {
            OptionKind::Call => {
                inputs.spot * self.normal.cdf(t.d1) - t.discounted_strike * self.normal.cdf(t.d2)
            }
            OptionKind::Put => {
                t.discounted_strike * self.normal.cdf(-t.d2) - inputs.spot * self.normal.cdf(-t.d1)
            }
        };
        Ok(value)
    }

    #[inline]
    fn greeks(&self, kind: OptionKind, inputs: &PricingInputs) -> EngineResult<Greeks> {
        let t = Self::terms(inputs)?;
        // Shared decay from the volatility term
        let vol_decay = -inputs.spot * self.normal.pdf(t.d1) * t.sigma_sqrt_t / (2.0 * inputs.ttl_years);

        let (delta, theta_per_year) = match kind {
            OptionKind::Call => (
                self.normal.cdf(t.d1),
                vol_decay - inputs.rate * t.discounted_strike * self.normal.cdf(t.d2),
            ),
            OptionKind::Put => (
                self.normal.cdf(t.d1) - 1.0,
                vol_decay + inputs.rate * t.discounted_strike * self.normal.cdf(-t.d2),
            ),
        };

        Ok(Greeks {
            delta,
            theta_per_year,
            theta_per_day: theta_per_year / DAYS_PER_YEAR,
        })
    }
}
