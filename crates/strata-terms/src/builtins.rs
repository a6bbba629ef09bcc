//! Built-in trailing-window factors and filters.
//!
//! Kernels see one `window_length x n` float window per input, with missing
//! cells already turned into `NaN` and booleans into `1.0` / `0.0`, and
//! produce one value per column. Filter kernels return `1.0` / `0.0`.

use crate::error::{Result, TermError};
use crate::factor::Factor;
use crate::filter::Filter;
use crate::sid::Sid;
use crate::term::{Role, Term, TermBuilder, TermKind};
use ndarray::{ArrayView1, ArrayView2};
use std::collections::BTreeSet;
use strata_adjusted::{DType, FloatKey, Scalar};

/// Built-in window computations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WindowKernel {
    /// Mean of the non-missing values
    SimpleMovingAverage,
    /// Exponentially weighted mean, newest row weighted 1
    ExponentialWeightedMovingAverage {
        /// Weight multiplier per row of age, in (0, 1]
        decay_rate: FloatKey,
    },
    /// Percent change from the first to the last row
    Returns,
    /// `sum(close * volume) / window_length`
    AverageDollarVolume,
    /// Volume-weighted average price
    Vwap,
    /// Population standard deviation scaled by `sqrt(annualization_factor)`
    AnnualizedVolatility {
        /// Periods per year
        annualization_factor: FloatKey,
    },
    /// Largest peak-to-trough decline, as a fraction of the peak
    MaxDrawdown,
    /// Input present on every row
    AllPresent,
    /// Input true on every row
    All,
    /// Input true on some row
    Any,
    /// Input true on at least `n` rows
    AtLeastN(usize),
}

impl WindowKernel {
    /// Display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SimpleMovingAverage => "SimpleMovingAverage",
            Self::ExponentialWeightedMovingAverage { .. } => "ExponentialWeightedMovingAverage",
            Self::Returns => "Returns",
            Self::AverageDollarVolume => "AverageDollarVolume",
            Self::Vwap => "VWAP",
            Self::AnnualizedVolatility { .. } => "AnnualizedVolatility",
            Self::MaxDrawdown => "MaxDrawdown",
            Self::AllPresent => "AllPresent",
            Self::All => "All",
            Self::Any => "Any",
            Self::AtLeastN(_) => "AtLeastN",
        }
    }

    /// Output dtype.
    pub const fn dtype(&self) -> DType {
        match self {
            Self::AllPresent | Self::All | Self::Any | Self::AtLeastN(_) => DType::Bool,
            _ => DType::Float64,
        }
    }

    /// True if restating history leaves the output unchanged.
    pub const fn window_safe(&self) -> bool {
        matches!(
            self,
            Self::Returns | Self::AllPresent | Self::All | Self::Any | Self::AtLeastN(_)
        )
    }

    /// Smallest accepted window length.
    pub const fn minimum_window(&self) -> usize {
        match self {
            Self::Returns => 2,
            _ => 1,
        }
    }

    /// Number of inputs the kernel reads.
    pub const fn arity(&self) -> usize {
        match self {
            Self::AverageDollarVolume | Self::Vwap => 2,
            _ => 1,
        }
    }

    /// One value per column of the windows.
    pub fn compute(&self, windows: &[ArrayView2<'_, f64>]) -> Vec<f64> {
        let Some(first) = windows.first() else {
            return Vec::new();
        };
        let ncols = first.ncols();
        (0..ncols)
            .map(|c| {
                let x = first.column(c);
                match self {
                    Self::SimpleMovingAverage => nanmean(x),
                    Self::ExponentialWeightedMovingAverage { decay_rate } => {
                        ewma(x, decay_rate.get())
                    }
                    Self::Returns => {
                        let last = x[x.len() - 1];
                        (last - x[0]) / x[0]
                    }
                    Self::AverageDollarVolume => {
                        let v = windows[1].column(c);
                        let total: f64 = x
                            .iter()
                            .zip(v.iter())
                            .map(|(p, q)| p * q)
                            .filter(|d| !d.is_nan())
                            .sum();
                        total / x.len() as f64
                    }
                    Self::Vwap => {
                        let v = windows[1].column(c);
                        let (pv, vol) = x
                            .iter()
                            .zip(v.iter())
                            .filter(|(p, q)| !p.is_nan() && !q.is_nan())
                            .fold((0.0, 0.0), |(a, b), (p, q)| (a + p * q, b + q));
                        pv / vol
                    }
                    Self::AnnualizedVolatility {
                        annualization_factor,
                    } => nanstd(x) * annualization_factor.get().sqrt(),
                    Self::MaxDrawdown => drawdown(x),
                    Self::AllPresent => truth(x.iter().all(|v| !v.is_nan())),
                    Self::All => truth(x.iter().all(|&v| crate::expr::is_true(v))),
                    Self::Any => truth(x.iter().any(|&v| crate::expr::is_true(v))),
                    Self::AtLeastN(n) => {
                        truth(x.iter().filter(|&&v| crate::expr::is_true(v)).count() >= *n)
                    }
                }
            })
            .collect()
    }
}

const fn truth(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

fn nanmean(x: ArrayView1<'_, f64>) -> f64 {
    let (sum, n) = x
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

fn nanstd(x: ArrayView1<'_, f64>) -> f64 {
    let mean = nanmean(x);
    let (ss, n) = x
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, n), v| (s + (v - mean).powi(2), n + 1));
    if n == 0 { f64::NAN } else { (ss / n as f64).sqrt() }
}

fn ewma(x: ArrayView1<'_, f64>, decay_rate: f64) -> f64 {
    let len = x.len();
    let (num, den) = x
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold((0.0, 0.0), |(num, den), (i, v)| {
            let w = decay_rate.powi((len - 1 - i) as i32);
            (num + w * v, den + w)
        });
    if den == 0.0 { f64::NAN } else { num / den }
}

fn drawdown(x: ArrayView1<'_, f64>) -> f64 {
    let mut peak = f64::NAN;
    let mut worst = f64::NAN;
    for &v in x.iter().filter(|v| !v.is_nan()) {
        peak = peak.max(v);
        let drawdown = (peak - v) / peak;
        worst = worst.max(drawdown);
    }
    worst
}

fn window_term(kernel: WindowKernel, inputs: Vec<Term>, window_length: usize) -> Result<Term> {
    let role = Role::for_dtype(kernel.dtype());
    let dtype = kernel.dtype();
    let window_safe = kernel.window_safe();
    TermBuilder::new(TermKind::Window(kernel), role, dtype)
        .window(window_length)
        .inputs(inputs)
        .window_safe(window_safe)
        .build()
}

fn window_factor(kernel: WindowKernel, inputs: &[&Factor], window_length: usize) -> Result<Factor> {
    let inputs = inputs.iter().map(|f| f.term().clone()).collect();
    window_term(kernel, inputs, window_length).map(Factor::wrap)
}

/// Mean of the last `window_length` values.
pub fn simple_moving_average(input: &Factor, window_length: usize) -> Result<Factor> {
    window_factor(WindowKernel::SimpleMovingAverage, &[input], window_length)
}

/// Exponentially weighted mean with weight `decay_rate^age`.
pub fn exponential_weighted_moving_average(
    input: &Factor,
    window_length: usize,
    decay_rate: f64,
) -> Result<Factor> {
    if !(decay_rate > 0.0 && decay_rate <= 1.0) {
        return Err(TermError::InvalidParameter {
            name: "decay_rate",
            reason: format!("must be in (0, 1], got {decay_rate}"),
        });
    }
    let kernel = WindowKernel::ExponentialWeightedMovingAverage {
        decay_rate: FloatKey::from(decay_rate),
    };
    window_factor(kernel, &[input], window_length)
}

/// EWMA whose decay matches a pandas-style span: `1 - 2 / (span + 1)`.
pub fn ewma_from_span(input: &Factor, window_length: usize, span: f64) -> Result<Factor> {
    if span < 1.0 {
        return Err(TermError::InvalidParameter {
            name: "span",
            reason: format!("must be >= 1, got {span}"),
        });
    }
    exponential_weighted_moving_average(input, window_length, 1.0 - 2.0 / (span + 1.0))
}

/// EWMA whose weights halve every `halflife` rows.
pub fn ewma_from_halflife(input: &Factor, window_length: usize, halflife: f64) -> Result<Factor> {
    if halflife <= 0.0 {
        return Err(TermError::InvalidParameter {
            name: "halflife",
            reason: format!("must be positive, got {halflife}"),
        });
    }
    exponential_weighted_moving_average(input, window_length, 0.5f64.powf(1.0 / halflife))
}

/// Percent change of `close` over the window (at least two rows).
pub fn returns(close: &Factor, window_length: usize) -> Result<Factor> {
    window_factor(WindowKernel::Returns, &[close], window_length)
}

/// Average daily traded value.
pub fn average_dollar_volume(close: &Factor, volume: &Factor, window_length: usize) -> Result<Factor> {
    window_factor(WindowKernel::AverageDollarVolume, &[close, volume], window_length)
}

/// Volume-weighted average price.
pub fn vwap(close: &Factor, volume: &Factor, window_length: usize) -> Result<Factor> {
    window_factor(WindowKernel::Vwap, &[close, volume], window_length)
}

/// Volatility of `returns`, annualised.
pub fn annualized_volatility(
    returns: &Factor,
    window_length: usize,
    annualization_factor: f64,
) -> Result<Factor> {
    let kernel = WindowKernel::AnnualizedVolatility {
        annualization_factor: FloatKey::from(annualization_factor),
    };
    window_factor(kernel, &[returns], window_length)
}

/// Largest drawdown within the window.
pub fn max_drawdown(input: &Factor, window_length: usize) -> Result<Factor> {
    window_factor(WindowKernel::MaxDrawdown, &[input], window_length)
}

/// True where `input` had data on each of the last `window_length` rows.
pub fn all_present(input: &Term, window_length: usize) -> Result<Filter> {
    if input.role() == Role::Filter {
        return Err(TermError::UnsupportedOperation {
            op: "all_present",
            dtype: input.dtype(),
        });
    }
    window_term(WindowKernel::AllPresent, vec![input.clone()], window_length).map(Filter::wrap)
}

/// True where `input` held on each of the last `window_length` rows.
pub fn all(input: &Filter, window_length: usize) -> Result<Filter> {
    window_term(WindowKernel::All, vec![input.term().clone()], window_length).map(Filter::wrap)
}

/// True where `input` held on any of the last `window_length` rows.
pub fn any(input: &Filter, window_length: usize) -> Result<Filter> {
    window_term(WindowKernel::Any, vec![input.term().clone()], window_length).map(Filter::wrap)
}

/// True where `input` held on at least `n` of the last `window_length` rows.
pub fn at_least_n(input: &Filter, window_length: usize, n: usize) -> Result<Filter> {
    window_term(WindowKernel::AtLeastN(n), vec![input.term().clone()], window_length)
        .map(Filter::wrap)
}

/// True for a fixed set of assets on every date.
pub fn static_assets(sids: impl IntoIterator<Item = Sid>) -> Result<Filter> {
    let sids: BTreeSet<Sid> = sids.into_iter().collect();
    TermBuilder::new(TermKind::StaticAssets(sids), Role::Filter, DType::Bool)
        .window_safe(true)
        .build()
        .map(Filter::wrap)
}

/// True everywhere the root mask is.
pub fn everything() -> Result<Filter> {
    Term::constant(Scalar::Bool(true))?.into_filter()
}
