//! Breakeven search engine.
//!
//! Locates where a scalar objective `f(x)` changes sign using a coarse forward
//! scan from `start` in increments of `step`, then bisection inside each
//! bracket the scan finds. The engine knows nothing about options: callers
//! hand it any `FnMut(f64) -> EngineResult<f64>` (see [`objective`] for the
//! straddle objective).
//!
//! Per search: Init -> CoarseScan -> Bisect -> RecordRoot -> (CoarseScan | Done).
//! The scan is bounded by `max_iterations` and `x_max_search`, bisection by
//! `precision`, [`MAX_BISECTION_STEPS`] and floating-point resolution.

pub mod objective;

use crate::errors::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Hard cap on halvings per bracket. 200 halvings shrink any finite f64
/// bracket below one ulp, so this only bites when `precision` is unreachable.
pub const MAX_BISECTION_STEPS: u32 = 200;

/// Scan and bisection parameters. All fields must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub start: f64,
    pub step: f64,
    pub max_iterations: u32,
    pub precision: f64,
    pub x_max_search: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            start: 1.0,
            step: 0.1,
            max_iterations: 10_000,
            precision: 0.01,
            x_max_search: 10_000.0,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let fields = [
            ("start", self.start),
            ("step", self.step),
            ("precision", self.precision),
            ("x_max_search", self.x_max_search),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(EngineError::InvalidConfig("max_iterations must be at least 1".into()));
        }
        if self.x_max_search < self.start {
            return Err(EngineError::InvalidConfig(format!(
                "x_max_search ({}) is below start ({})",
                self.x_max_search, self.start
            )));
        }
        Ok(())
    }

    /// Scan sample `i`. Computed from `start` each time so long scans don't drift.
    #[inline]
    fn sample(&self, i: u32) -> f64 {
        self.start + f64::from(i) * self.step
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Smallest x >= start with f(x) > 0; everything above it is assumed to hold.
    LowerThreshold,
    /// Both crossings of a U-shaped objective.
    TwoCrossings,
    /// First crossing only.
    SingleCrossing,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowerThreshold => write!(f, "lower_threshold"),
            Self::TwoCrossings => write!(f, "two_crossings"),
            Self::SingleCrossing => write!(f, "single_crossing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchResult {
    NotFound,
    SingleRoot { x: f64 },
    /// `lower < upper`. The objective is negative between them.
    RootPair { lower: f64, upper: f64 },
    /// The safe region is `[x_min, x_max_search]`.
    LowerBoundOnly { x_min: f64, x_max_search: f64 },
}

impl SearchResult {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::SingleRoot { .. } => "single_root",
            Self::RootPair { .. } => "root_pair",
            Self::LowerBoundOnly { .. } => "lower_bound_only",
        }
    }

    /// (lower, upper) edges for recording. A single root fills only `lower`.
    pub fn bounds(&self) -> (Option<f64>, Option<f64>) {
        match *self {
            Self::NotFound => (None, None),
            Self::SingleRoot { x } => (Some(x), None),
            Self::RootPair { lower, upper } => (Some(lower), Some(upper)),
            Self::LowerBoundOnly { x_min, x_max_search } => (Some(x_min), Some(x_max_search)),
        }
    }

    #[inline]
    pub fn is_found(&self) -> bool {
        !matches!(self, Self::NotFound)
    }
}

/// Run one search. Fails with `InvalidConfig` before evaluating `f` when the
/// config is invalid; errors from `f` (and non-finite values) abort the search.
pub fn search<F>(mut f: F, config: &SearchConfig, mode: SearchMode) -> EngineResult<SearchResult>
where
    F: FnMut(f64) -> EngineResult<f64>,
{
    config.validate()?;

    let result = match mode {
        SearchMode::LowerThreshold => lower_threshold(&mut f, config)?,
        SearchMode::TwoCrossings => match scan_crossings(&mut f, config, 2)?.as_slice() {
            &[lower, upper] if lower < upper => SearchResult::RootPair { lower, upper },
            _ => SearchResult::NotFound,
        },
        SearchMode::SingleCrossing => match scan_crossings(&mut f, config, 1)?.first() {
            Some(&x) => SearchResult::SingleRoot { x },
            None => SearchResult::NotFound,
        },
    };

    tracing::debug!(mode = %mode, result = ?result, "search finished");
    Ok(result)
}

/// Evaluate `f`, turning NaN/inf into a domain error so the scan never
/// compares against garbage.
#[inline]
fn checked<F>(f: &mut F, x: f64) -> EngineResult<f64>
where
    F: FnMut(f64) -> EngineResult<f64>,
{
    let y = f(x)?;
    if y.is_finite() {
        Ok(y)
    } else {
        Err(EngineError::Domain(format!("objective is not finite at x={x}: {y}")))
    }
}

/// Equivalent to `a * b <= 0` without the underflow of the product.
#[inline]
fn brackets(a: f64, b: f64) -> bool {
    a == 0.0 || b == 0.0 || (a < 0.0) != (b < 0.0)
}

fn lower_threshold<F>(f: &mut F, config: &SearchConfig) -> EngineResult<SearchResult>
where
    F: FnMut(f64) -> EngineResult<f64>,
{
    // The last sample that failed the test, as (x, f(x))
    let mut below: Option<(f64, f64)> = None;

    for i in 0..config.max_iterations {
        let x = config.sample(i);
        if x > config.x_max_search {
            break;
        }
        let fx = checked(f, x)?;
        if fx > 0.0 {
            let x_min = match below {
                Some((low, f_low)) => bisect(f, low, f_low, x, config.precision)?.midpoint(),
                // Already satisfied at start
                None => x,
            };
            return Ok(SearchResult::LowerBoundOnly {
                x_min,
                x_max_search: config.x_max_search,
            });
        }
        below = Some((x, fx));
    }

    Ok(SearchResult::NotFound)
}

/// Scan forward and collect up to `wanted` roots in increasing order.
///
/// A root is recorded only where the sign changes. A run of samples sitting
/// exactly on zero counts as one root, at its first sample, when the next
/// non-zero sample has the opposite sign to the one before the run. A zero
/// run that opens the scan or is still open when it ends has no sign change
/// on both sides and is not recorded.
fn scan_crossings<F>(f: &mut F, config: &SearchConfig, wanted: usize) -> EngineResult<SmallVec<[f64; 2]>>
where
    F: FnMut(f64) -> EngineResult<f64>,
{
    let mut roots: SmallVec<[f64; 2]> = SmallVec::new();

    let f_start = checked(f, config.start)?;
    // Last sample with a non-zero value, and the first zero sample after it
    let mut signed: Option<(f64, f64)> = None;
    let mut zero_run: Option<f64> = None;
    if f_start == 0.0 {
        zero_run = Some(config.start);
    } else {
        signed = Some((config.start, f_start));
    }

    let mut i: u32 = 1;
    while roots.len() < wanted && i <= config.max_iterations {
        let x = config.sample(i);
        if x > config.x_max_search {
            break;
        }
        let f_curr = checked(f, x)?;
        i += 1;

        if f_curr == 0.0 {
            zero_run.get_or_insert(x);
            continue;
        }

        match (signed, zero_run.take()) {
            (Some((_, f_before)), Some(zero_at)) => {
                if brackets(f_before, f_curr) {
                    tracing::debug!(root = zero_at, "crossing on a sample");
                    roots.push(zero_at);
                }
            }
            (Some((x_before, f_before)), None) => {
                if brackets(f_before, f_curr) {
                    let root = bisect(f, x_before, f_before, x, config.precision)?.midpoint();
                    tracing::debug!(root, low = x_before, high = x, "crossing bracketed");
                    roots.push(root);
                }
            }
            (None, _) => {}
        }
        signed = Some((x, f_curr));
    }

    roots.truncate(wanted);
    Ok(roots)
}

/// Final bracket of a bisection. `high - low <= precision` unless the
/// step cap or float resolution stopped it first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub low: f64,
    pub high: f64,
}

impl Bracket {
    #[inline]
    pub fn midpoint(&self) -> f64 {
        self.low + 0.5 * (self.high - self.low)
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Halve `[low, high]` until it is no wider than `precision`.
///
/// Keeps the half where `f(low)` and `f(mid)` straddle zero. When `f(mid)` is
/// exactly zero, `mid` becomes the new `high`.
pub fn bisect<F>(f: &mut F, low: f64, f_low: f64, high: f64, precision: f64) -> EngineResult<Bracket>
where
    F: FnMut(f64) -> EngineResult<f64>,
{
    let mut bracket = Bracket { low, high };
    let mut f_low = f_low;
    let mut steps: u32 = 0;

    while bracket.width() > precision && steps < MAX_BISECTION_STEPS {
        let mid = bracket.midpoint();
        if mid <= bracket.low || mid >= bracket.high {
            // No representable point left between the ends
            break;
        }
        let f_mid = checked(f, mid)?;
        if brackets(f_low, f_mid) {
            bracket.high = mid;
        } else {
            bracket.low = mid;
            f_low = f_mid;
        }
        steps += 1;
    }

    Ok(bracket)
}
