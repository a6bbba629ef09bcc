//! Per-column summaries of a pipeline result.

use crate::result::{ColumnValues, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use strata_adjusted::{DType, NAT};

/// Descriptive statistics for one output column.
///
/// `mean`, `min` and `max` are computed over the present values of numeric
/// and boolean columns (booleans count as 0 / 1) and are `None` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSummary {
    /// Column name.
    pub name: String,

    /// Column dtype.
    pub dtype: DType,

    /// Number of present values.
    pub count: usize,

    /// Number of missing values (`NaN`, `NaT` or a missing label).
    pub missing: usize,

    /// Mean of the present values.
    pub mean: Option<f64>,

    /// Smallest present value.
    pub min: Option<f64>,

    /// Largest present value.
    pub max: Option<f64>,
}

impl ColumnSummary {
    /// Summarise one column.
    pub fn of(name: &str, values: &ColumnValues) -> Self {
        let numeric: Option<Vec<f64>> = match values {
            ColumnValues::Float64(v) => Some(v.iter().copied().filter(|x| !x.is_nan()).collect()),
            ColumnValues::Int64(v) => Some(v.iter().map(|x| *x as f64).collect()),
            ColumnValues::Bool(v) => Some(v.iter().map(|x| if *x { 1.0 } else { 0.0 }).collect()),
            ColumnValues::Datetime(_) | ColumnValues::Categorical(_) => None,
        };
        let count = match values {
            ColumnValues::Datetime(v) => v.iter().filter(|x| **x != NAT).count(),
            ColumnValues::Categorical(v) => v.iter().filter(|x| x.is_some()).count(),
            _ => numeric.as_ref().map_or(0, Vec::len),
        };
        let (mean, min, max) = match numeric.as_deref() {
            Some(xs) if !xs.is_empty() => (
                Some(xs.iter().sum::<f64>() / xs.len() as f64),
                Some(xs.iter().copied().fold(f64::INFINITY, f64::min)),
                Some(xs.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
            ),
            _ => (None, None, None),
        };
        Self {
            name: name.to_string(),
            dtype: values.dtype(),
            count,
            missing: values.len() - count,
            mean,
            min,
            max,
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

impl fmt::Display for ColumnSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): count={}, missing={}, mean={}, min={}, max={}",
            self.name,
            self.dtype,
            self.count,
            self.missing,
            fmt_opt(self.mean),
            fmt_opt(self.min),
            fmt_opt(self.max)
        )
    }
}

/// Summaries of every column, in column order.
pub fn summarize(result: &PipelineResult) -> Vec<ColumnSummary> {
    result
        .columns()
        .iter()
        .map(|(name, values)| ColumnSummary::of(name, values))
        .collect()
}

/// Format summaries as an ASCII table for terminal display.
pub fn to_ascii_table(summaries: &[ColumnSummary]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<24} {:>14} {:>8} {:>8} {:>12} {:>12} {:>12}\n",
        "Column", "DType", "Count", "Missing", "Mean", "Min", "Max"
    ));
    output.push_str(&"-".repeat(96));
    output.push('\n');
    for s in summaries {
        output.push_str(&format!(
            "{:<24} {:>14} {:>8} {:>8} {:>12} {:>12} {:>12}\n",
            s.name,
            s.dtype.name(),
            s.count,
            s.missing,
            fmt_opt(s.mean),
            fmt_opt(s.min),
            fmt_opt(s.max)
        ));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_float_summary() {
        let s = ColumnSummary::of("x", &ColumnValues::Float64(vec![1.0, f64::NAN, 3.0]));
        assert_eq!(s.count, 2);
        assert_eq!(s.missing, 1);
        assert_relative_eq!(s.mean.unwrap(), 2.0);
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.max, Some(3.0));
    }

    #[test]
    fn test_bool_and_label_summary() {
        let s = ColumnSummary::of("f", &ColumnValues::Bool(vec![true, false, true, true]));
        assert_relative_eq!(s.mean.unwrap(), 0.75);

        let labels = ColumnValues::Categorical(vec![Some("A".to_string()), None]);
        let s = ColumnSummary::of("sector", &labels);
        assert_eq!((s.count, s.missing), (1, 1));
        assert_eq!(s.mean, None);
    }

    #[test]
    fn test_all_missing() {
        let s = ColumnSummary::of("x", &ColumnValues::Float64(vec![f64::NAN]));
        assert_eq!(s.count, 0);
        assert_eq!(s.mean, None);
        assert!(s.to_string().contains("mean=-"));
    }

    #[test]
    fn test_ascii_table() {
        let summaries = vec![ColumnSummary::of("x", &ColumnValues::Int64(vec![1, 2]))];
        let table = to_ascii_table(&summaries);
        assert!(table.contains("Column"));
        assert!(table.contains("1.5000"));
    }
}
