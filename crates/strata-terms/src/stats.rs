//! Cross-sectional statistics over one row of values.
//!
//! Every routine takes the row as a slice in which `NaN` marks a value that
//! must be ignored (masked out or missing) and returns `NaN` in those slots.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How tied values are ranked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankMethod {
    /// Distinct ranks, ties broken by position
    #[default]
    Ordinal,
    /// Mean of the tied ranks
    Average,
    /// Lowest of the tied ranks
    Min,
    /// Highest of the tied ranks
    Max,
    /// Like `Min`, but ranks increase by one between groups
    Dense,
}

/// Rank the non-NaN values of `values`, starting at 1.
pub fn rank(values: &[f64], method: RankMethod, ascending: bool) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).filter(|&i| !values[i].is_nan()).collect();
    order.sort_by(|&a, &b| {
        let by_value = values[a].total_cmp(&values[b]);
        let by_value = if ascending { by_value } else { by_value.reverse() };
        by_value.then(a.cmp(&b))
    });

    let mut out = vec![f64::NAN; values.len()];
    let mut start = 0;
    let mut dense = 0.0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        dense += 1.0;
        for (offset, &idx) in order[start..end].iter().enumerate() {
            out[idx] = match method {
                RankMethod::Ordinal => (start + offset + 1) as f64,
                RankMethod::Average => (start + end + 1) as f64 / 2.0,
                RankMethod::Min => (start + 1) as f64,
                RankMethod::Max => end as f64,
                RankMethod::Dense => dense,
            };
        }
        start = end;
    }
    out
}

fn finite_mean(values: &[f64]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Subtract the mean of the non-NaN values.
pub fn demean(values: &[f64]) -> Vec<f64> {
    let Some(mean) = finite_mean(values) else {
        return vec![f64::NAN; values.len()];
    };
    values.iter().map(|v| v - mean).collect()
}

/// Standardise with the population standard deviation (ddof = 0).
pub fn zscore(values: &[f64]) -> Vec<f64> {
    let Some(mean) = finite_mean(values) else {
        return vec![f64::NAN; values.len()];
    };
    let (ss, count) = values
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), v| (s + (v - mean).powi(2), c + 1));
    let std = (ss / count as f64).sqrt();
    values.iter().map(|v| (v - mean) / std).collect()
}

/// Linearly interpolated percentile `q` (0..=100) of sorted values.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

/// Sorted copy of the non-NaN values.
pub fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Bucket labels `0..bins` by equal-count quantiles; `-1` for NaN.
///
/// Bucket `i` holds values in `(edge_i, edge_{i+1}]`, with the lowest value
/// always in bucket 0.
pub fn quantiles(values: &[f64], bins: usize) -> Vec<i64> {
    let sorted = sorted_finite(values);
    if sorted.is_empty() || bins == 0 {
        return vec![-1; values.len()];
    }
    let edges: Vec<f64> = (1..bins)
        .map(|i| percentile(&sorted, 100.0 * i as f64 / bins as f64))
        .collect();
    values
        .iter()
        .map(|v| {
            if v.is_nan() {
                -1
            } else {
                edges.iter().filter(|&&e| *v > e).count() as i64
            }
        })
        .collect()
}

/// Apply `f` separately within each group; cells without a group get NaN.
pub fn grouped<F>(values: &[f64], groups: &[Option<i64>], f: F) -> Vec<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let mut members: HashMap<i64, Vec<usize>> = HashMap::new();
    for (idx, group) in groups.iter().enumerate() {
        if let Some(g) = group {
            members.entry(*g).or_default().push(idx);
        }
    }
    let mut out = vec![f64::NAN; values.len()];
    for idx in members.values() {
        let subset: Vec<f64> = idx.iter().map(|&i| values[i]).collect();
        for (&i, v) in idx.iter().zip(f(&subset)) {
            out[i] = v;
        }
    }
    out
}
