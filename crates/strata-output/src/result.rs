//! Long-format pipeline results.

use crate::export::ExportError;
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;
use strata_adjusted::{ArrayData, DType, NAT, Scalar};
use strata_terms::Sid;

/// Values of one output column, one per result row.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Float values, `NaN` where missing
    Float64(Vec<f64>),
    /// Integer values
    Int64(Vec<i64>),
    /// Boolean values
    Bool(Vec<bool>),
    /// Nanosecond timestamps, [`NAT`] where missing
    Datetime(Vec<i64>),
    /// Labels, `None` where missing
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    /// Empty column of `dtype`.
    pub const fn empty(dtype: DType) -> Self {
        match dtype {
            DType::Float64 => Self::Float64(Vec::new()),
            DType::Int64 => Self::Int64(Vec::new()),
            DType::Bool => Self::Bool(Vec::new()),
            DType::Datetime => Self::Datetime(Vec::new()),
            DType::Categorical => Self::Categorical(Vec::new()),
        }
    }

    /// Values of `data` at `cells`, in order.
    pub fn gather(data: &ArrayData, cells: &[(usize, usize)]) -> Self {
        match data {
            ArrayData::Float64(a) => Self::Float64(cells.iter().map(|&(r, c)| a[[r, c]]).collect()),
            ArrayData::Int64(a) => Self::Int64(cells.iter().map(|&(r, c)| a[[r, c]]).collect()),
            ArrayData::Bool(a) => Self::Bool(cells.iter().map(|&(r, c)| a[[r, c]]).collect()),
            ArrayData::Datetime(a) => {
                Self::Datetime(cells.iter().map(|&(r, c)| a[[r, c]]).collect())
            }
            ArrayData::Categorical(labels) => Self::Categorical(
                cells
                    .iter()
                    .map(|&(r, c)| labels.get(r, c).map(str::to_string))
                    .collect(),
            ),
        }
    }

    /// Element type.
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Float64(_) => DType::Float64,
            Self::Int64(_) => DType::Int64,
            Self::Bool(_) => DType::Bool,
            Self::Datetime(_) => DType::Datetime,
            Self::Categorical(_) => DType::Categorical,
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(v) => v.len(),
            Self::Int64(v) | Self::Datetime(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }

    /// True if there are no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index`.
    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            Self::Float64(v) => v.get(index).map(|x| Scalar::Float(*x)),
            Self::Int64(v) => v.get(index).map(|x| Scalar::Int(*x)),
            Self::Bool(v) => v.get(index).map(|x| Scalar::Bool(*x)),
            Self::Datetime(v) => v.get(index).map(|x| Scalar::Datetime(*x)),
            Self::Categorical(v) => v.get(index).map(|x| Scalar::Label(x.clone())),
        }
    }

    /// Append `other`, which must have the same dtype.
    pub fn extend_from(&mut self, other: &Self) -> Result<(), ExportError> {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => a.extend_from_slice(b),
            (Self::Int64(a), Self::Int64(b)) | (Self::Datetime(a), Self::Datetime(b)) => {
                a.extend_from_slice(b)
            }
            (Self::Bool(a), Self::Bool(b)) => a.extend_from_slice(b),
            (Self::Categorical(a), Self::Categorical(b)) => a.extend_from_slice(b),
            (this, other) => {
                return Err(ExportError::ColumnMismatch(format!(
                    "cannot append {} values to a {} column",
                    other.dtype(),
                    this.dtype()
                )));
            }
        }
        Ok(())
    }

    /// Polars series; missing values become nulls.
    pub fn to_series(&self, name: &str) -> PolarsResult<Series> {
        let name = PlSmallStr::from(name);
        Ok(match self {
            Self::Float64(v) => {
                let values: Vec<Option<f64>> =
                    v.iter().map(|x| (!x.is_nan()).then_some(*x)).collect();
                Series::new(name, values)
            }
            Self::Int64(v) => Series::new(name, v.as_slice()),
            Self::Bool(v) => Series::new(name, v.as_slice()),
            Self::Datetime(v) => {
                let values: Vec<Option<i64>> = v.iter().map(|x| (*x != NAT).then_some(*x)).collect();
                Series::new(name, values)
                    .cast(&DataType::Datetime(TimeUnit::Nanoseconds, None))?
            }
            Self::Categorical(v) => Series::new(name, v.as_slice()),
        })
    }
}

/// One row per (date, asset) that passed the screen.
///
/// Rows are sorted by date, then by ascending sid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineResult {
    dates: Vec<NaiveDate>,
    sids: Vec<Sid>,
    columns: BTreeMap<String, ColumnValues>,
}

impl PipelineResult {
    /// Result from row labels and columns of matching length.
    pub fn new(
        dates: Vec<NaiveDate>,
        sids: Vec<Sid>,
        columns: BTreeMap<String, ColumnValues>,
    ) -> Result<Self, ExportError> {
        if sids.len() != dates.len() {
            return Err(ExportError::LengthMismatch {
                column: "sid".to_string(),
                expected: dates.len(),
                actual: sids.len(),
            });
        }
        if let Some((name, values)) = columns.iter().find(|(_, v)| v.len() != dates.len()) {
            return Err(ExportError::LengthMismatch {
                column: name.clone(),
                expected: dates.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            dates,
            sids,
            columns,
        })
    }

    /// Result with no rows and the given columns.
    pub fn empty<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, DType)>,
        S: Into<String>,
    {
        Self {
            dates: Vec::new(),
            sids: Vec::new(),
            columns: columns
                .into_iter()
                .map(|(name, dtype)| (name.into(), ColumnValues::empty(dtype)))
                .collect(),
        }
    }

    /// Stack results with identical columns, in order.
    pub fn concat(parts: Vec<Self>) -> Result<Self, ExportError> {
        let mut parts = parts.into_iter();
        let Some(mut out) = parts.next() else {
            return Ok(Self::default());
        };
        for part in parts {
            if !part.columns.keys().eq(out.columns.keys()) {
                return Err(ExportError::ColumnMismatch(format!(
                    "expected columns {:?}, got {:?}",
                    out.column_names(),
                    part.column_names()
                )));
            }
            out.dates.extend_from_slice(&part.dates);
            out.sids.extend_from_slice(&part.sids);
            for (name, values) in &part.columns {
                if let Some(column) = out.columns.get_mut(name) {
                    column.extend_from(values)?;
                }
            }
        }
        Ok(out)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    /// True if no row passed the screen.
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Row dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Row assets.
    pub fn sids(&self) -> &[Sid] {
        &self.sids
    }

    /// Column names, sorted.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(String::as_str).collect()
    }

    /// Column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnValues> {
        self.columns.get(name)
    }

    /// All columns.
    pub const fn columns(&self) -> &BTreeMap<String, ColumnValues> {
        &self.columns
    }

    /// Row index of `(date, sid)`.
    pub fn position(&self, date: NaiveDate, sid: Sid) -> Option<usize> {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if (self.dates[mid], self.sids[mid]) < (date, sid) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        (lo < self.len() && self.dates[lo] == date && self.sids[lo] == sid).then_some(lo)
    }

    /// Value of `column` for `(date, sid)`, if that row passed the screen.
    pub fn value(&self, date: NaiveDate, sid: Sid, column: &str) -> Option<Scalar> {
        let idx = self.position(date, sid)?;
        self.columns.get(column)?.get(idx)
    }

    /// Polars frame with `date`, `sid` and one column per output.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let epoch = chrono::DateTime::UNIX_EPOCH.date_naive();
        let days: Vec<i32> = self
            .dates
            .iter()
            .map(|d| (*d - epoch).num_days() as i32)
            .collect();
        let sids: Vec<u32> = self.sids.iter().map(|s| s.get()).collect();

        let mut columns: Vec<Column> = vec![
            Series::new("date".into(), days).cast(&DataType::Date)?.into(),
            Series::new("sid".into(), sids).into(),
        ];
        for (name, values) in &self.columns {
            columns.push(values.to_series(name)?.into());
        }
        DataFrame::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn sample() -> PipelineResult {
        let mut columns = BTreeMap::new();
        columns.insert("x".to_string(), ColumnValues::Float64(vec![1.0, f64::NAN, 3.0]));
        columns.insert("flag".to_string(), ColumnValues::Bool(vec![true, false, true]));
        PipelineResult::new(
            vec![day(2), day(2), day(3)],
            vec![Sid(1), Sid(4), Sid(1)],
            columns,
        )
        .unwrap()
    }

    #[test]
    fn test_lookup() {
        let result = sample();
        assert_eq!(result.len(), 3);
        assert_eq!(result.value(day(3), Sid(1), "x"), Some(Scalar::Float(3.0)));
        assert_eq!(result.value(day(2), Sid(4), "flag"), Some(Scalar::Bool(false)));
        assert_eq!(result.value(day(3), Sid(4), "x"), None);
        assert_eq!(result.value(day(2), Sid(1), "missing"), None);
    }

    #[test]
    fn test_length_checked() {
        let mut columns = BTreeMap::new();
        columns.insert("x".to_string(), ColumnValues::Float64(vec![1.0]));
        let err = PipelineResult::new(vec![day(2), day(3)], vec![Sid(1), Sid(1)], columns);
        assert!(matches!(err, Err(ExportError::LengthMismatch { .. })));
    }

    #[test]
    fn test_concat() {
        let result = PipelineResult::concat(vec![sample(), sample()]).unwrap();
        assert_eq!(result.len(), 6);
        assert_eq!(result.column("x").unwrap().len(), 6);

        let other = PipelineResult::empty([("y", DType::Float64)]);
        assert!(matches!(
            PipelineResult::concat(vec![sample(), other]),
            Err(ExportError::ColumnMismatch(_))
        ));
        assert!(PipelineResult::concat(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_gather() {
        let data = ArrayData::Float64(array![[1.0, 2.0], [3.0, 4.0]]);
        let values = ColumnValues::gather(&data, &[(0, 1), (1, 0)]);
        assert_eq!(values, ColumnValues::Float64(vec![2.0, 3.0]));
    }

    #[test]
    fn test_to_dataframe() {
        let df = sample().to_dataframe().unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 4);
        assert_eq!(df.column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(df.column("x").unwrap().null_count(), 1);
    }
}
