//! Loader fed from polars frames.

use crate::error::LoadError;
use crate::loader::{LoadRequest, PipelineLoader};
use crate::loaders::memory::{AdjustmentRecord, InMemoryLoader};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use strata_adjusted::{AdjustedArray, AdjustmentOp, ArrayData, DType, LabelArray, Scalar};
use strata_terms::{BoundColumn, Sid};

/// Loader built from long-format frames.
///
/// Baselines have one row per observation:
///
/// | date | sid | value |
/// |------|-----|-------|
///
/// `date` is a Date (or an ISO `YYYY-MM-DD` string), `sid` an integer and
/// `value` anything castable to the column dtype. Dates and sids not in the
/// loader's axes are ignored; cells without an observation are missing.
///
/// Adjustments have one row per restatement:
///
/// | sid | kind | value | start_date | end_date | apply_date |
/// |-----|------|-------|------------|----------|------------|
///
/// with `kind` one of `multiply`, `add` or `overwrite`.
#[derive(Debug, Clone, Default)]
pub struct FrameLoader {
    inner: InMemoryLoader,
}

fn source_error(column: &BoundColumn, err: impl std::fmt::Display) -> LoadError {
    LoadError::Source {
        columns: vec![column.qualname()],
        message: err.to_string(),
    }
}

fn parse_dates(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<NaiveDate>>> {
    let dates = df.column(name)?.cast(&DataType::String)?;
    let dates = dates.str()?;
    Ok(dates
        .into_iter()
        .map(|d| d.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
        .collect())
}

fn parse_sids(df: &DataFrame) -> PolarsResult<Vec<Option<Sid>>> {
    let sids = df.column("sid")?.cast(&DataType::UInt32)?;
    let sids = sids.u32()?;
    Ok(sids.into_iter().map(|s| s.map(Sid)).collect())
}

impl FrameLoader {
    /// Loader over the given axes.
    pub fn new(dates: Vec<NaiveDate>, sids: Vec<Sid>) -> Self {
        Self {
            inner: InMemoryLoader::new(dates, sids),
        }
    }

    /// Store the baseline of `column` from a `date, sid, value` frame.
    pub fn add_frame(&mut self, column: &BoundColumn, baseline: &DataFrame) -> Result<(), LoadError> {
        let values = self
            .dense(column, baseline)
            .map_err(|e| source_error(column, e))?;
        self.inner.add_column(column, values)
    }

    /// Attach the restatements in `adjustments` to a stored column.
    pub fn add_adjustments(&mut self, column: &BoundColumn, adjustments: &DataFrame) -> Result<(), LoadError> {
        let records = records(column, adjustments).map_err(|e| source_error(column, e))?;
        for record in records {
            self.inner.add_adjustment(column, record?)?;
        }
        Ok(())
    }

    fn dense(&self, column: &BoundColumn, df: &DataFrame) -> PolarsResult<ArrayData> {
        let dates = parse_dates(df, "date")?;
        let sids = parse_sids(df)?;
        let date_index: HashMap<NaiveDate, usize> =
            self.inner.dates().iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let sid_index: HashMap<Sid, usize> =
            self.inner.sids().iter().enumerate().map(|(i, s)| (*s, i)).collect();
        let cells: Vec<Option<(usize, usize)>> = dates
            .iter()
            .zip(&sids)
            .map(|(d, s)| Some((*date_index.get(d.as_ref()?)?, *sid_index.get(s.as_ref()?)?)))
            .collect();
        let shape = (self.inner.dates().len(), self.inner.sids().len());
        let value = df.column("value")?;

        Ok(match column.dtype() {
            DType::Float64 => {
                let fill = column.missing_value().as_f64().unwrap_or(f64::NAN);
                let mut out = ndarray::Array2::from_elem(shape, fill);
                let values = value.cast(&DataType::Float64)?;
                for (cell, v) in cells.iter().zip(values.f64()?) {
                    if let (Some(cell), Some(v)) = (cell, v) {
                        out[*cell] = v;
                    }
                }
                ArrayData::Float64(out)
            }
            DType::Int64 | DType::Datetime => {
                let fill = column.missing_value().as_i64().unwrap_or_default();
                let mut out = ndarray::Array2::from_elem(shape, fill);
                let values = value.cast(&DataType::Int64)?;
                for (cell, v) in cells.iter().zip(values.i64()?) {
                    if let (Some(cell), Some(v)) = (cell, v) {
                        out[*cell] = v;
                    }
                }
                if column.dtype() == DType::Int64 {
                    ArrayData::Int64(out)
                } else {
                    ArrayData::Datetime(out)
                }
            }
            DType::Bool => {
                let fill = column.missing_value().as_bool().unwrap_or(false);
                let mut out = ndarray::Array2::from_elem(shape, fill);
                let values = value.cast(&DataType::Boolean)?;
                for (cell, v) in cells.iter().zip(values.bool()?) {
                    if let (Some(cell), Some(v)) = (cell, v) {
                        out[*cell] = v;
                    }
                }
                ArrayData::Bool(out)
            }
            DType::Categorical => {
                let mut out = LabelArray::missing(shape);
                let values = value.cast(&DataType::String)?;
                for (cell, v) in cells.iter().zip(values.str()?) {
                    if let Some((r, c)) = cell {
                        out.set(*r, *c, v);
                    }
                }
                ArrayData::Categorical(out)
            }
        })
    }
}

fn records(
    column: &BoundColumn,
    df: &DataFrame,
) -> PolarsResult<Vec<Result<AdjustmentRecord, LoadError>>> {
    let sids = parse_sids(df)?;
    let starts = parse_dates(df, "start_date")?;
    let ends = parse_dates(df, "end_date")?;
    let applies = parse_dates(df, "apply_date")?;
    let kinds = df.column("kind")?.cast(&DataType::String)?;
    let kinds = kinds.str()?;
    let values = df.column("value")?;
    let numeric = values.cast(&DataType::Float64)?;
    let numeric = numeric.f64()?;

    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(sid), Some(start), Some(end), Some(apply_date)) = (sids[i], starts[i], ends[i], applies[i])
        else {
            out.push(Err(source_error(column, format!("incomplete adjustment row {i}"))));
            continue;
        };
        let op = match (kinds.get(i), numeric.get(i)) {
            (Some("multiply"), Some(v)) => Ok(AdjustmentOp::Multiply(v)),
            (Some("add"), Some(v)) => Ok(AdjustmentOp::Add(v)),
            (Some("multiply" | "add"), None) => {
                Err(source_error(column, format!("missing value in adjustment row {i}")))
            }
            (Some("overwrite"), _) => overwrite_value(column, values, i).map(AdjustmentOp::Overwrite),
            (other, _) => Err(source_error(column, format!("unknown adjustment kind {other:?}"))),
        };
        out.push(op.map(|op| AdjustmentRecord {
            sid,
            op,
            start,
            end,
            apply_date,
        }));
    }
    Ok(out)
}

fn overwrite_value(column: &BoundColumn, values: &Column, i: usize) -> Result<Scalar, LoadError> {
    let cast = |dtype: &DataType| values.cast(dtype).map_err(|e| source_error(column, e));
    let scalar = match column.dtype() {
        DType::Float64 => cast(&DataType::Float64)?
            .f64()
            .map_err(|e| source_error(column, e))?
            .get(i)
            .map(Scalar::Float),
        DType::Int64 => cast(&DataType::Int64)?
            .i64()
            .map_err(|e| source_error(column, e))?
            .get(i)
            .map(Scalar::Int),
        DType::Datetime => cast(&DataType::Int64)?
            .i64()
            .map_err(|e| source_error(column, e))?
            .get(i)
            .map(Scalar::Datetime),
        DType::Bool => cast(&DataType::Boolean)?
            .bool()
            .map_err(|e| source_error(column, e))?
            .get(i)
            .map(Scalar::Bool),
        DType::Categorical => Some(Scalar::Label(
            cast(&DataType::String)?
                .str()
                .map_err(|e| source_error(column, e))?
                .get(i)
                .map(str::to_string),
        )),
    };
    Ok(scalar.unwrap_or_else(|| column.missing_value().clone()))
}

impl PipelineLoader for FrameLoader {
    fn load_adjusted_array(
        &self,
        request: &LoadRequest<'_>,
    ) -> Result<BTreeMap<BoundColumn, AdjustedArray>, LoadError> {
        self.inner.load_adjusted_array(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use strata_terms::{Domain, equity_pricing};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn baseline() -> DataFrame {
        DataFrame::new(vec![
            Series::new("date".into(), vec!["2024-01-02", "2024-01-03", "2024-01-03", "2024-01-04"]).into(),
            Series::new("sid".into(), vec![1u32, 1, 2, 1]).into(),
            Series::new("value".into(), vec![10.0, 11.0, 20.0, 12.0]).into(),
        ])
        .unwrap()
    }

    fn load(loader: &FrameLoader, column: &BoundColumn) -> AdjustedArray {
        let dates = [day(2), day(3), day(4)];
        let sids = [Sid(1), Sid(2)];
        let mask = Array2::from_elem((3, 2), true);
        let mut out = loader
            .load_adjusted_array(&LoadRequest {
                domain: &Domain::Generic,
                columns: std::slice::from_ref(column),
                dates: &dates,
                sids: &sids,
                mask: &mask,
            })
            .unwrap();
        out.remove(column).unwrap()
    }

    #[test]
    fn test_baseline_pivots_to_dense() {
        let close = equity_pricing().column("close").unwrap();
        let mut loader = FrameLoader::new(vec![day(2), day(3), day(4)], vec![Sid(1), Sid(2)]);
        loader.add_frame(&close, &baseline()).unwrap();

        let array = load(&loader, &close);
        let data = array.data().as_float().unwrap();
        assert_eq!(data[[0, 0]], 10.0);
        assert_eq!(data[[1, 1]], 20.0);
        assert!(data[[0, 1]].is_nan());
        assert!(data[[2, 1]].is_nan());
    }

    #[test]
    fn test_adjustment_frame() {
        let close = equity_pricing().column("close").unwrap();
        let mut loader = FrameLoader::new(vec![day(2), day(3), day(4)], vec![Sid(1), Sid(2)]);
        loader.add_frame(&close, &baseline()).unwrap();
        let adjustments = DataFrame::new(vec![
            Series::new("sid".into(), vec![1u32]).into(),
            Series::new("kind".into(), vec!["multiply"]).into(),
            Series::new("value".into(), vec![0.5]).into(),
            Series::new("start_date".into(), vec!["2024-01-01"]).into(),
            Series::new("end_date".into(), vec!["2024-01-03"]).into(),
            Series::new("apply_date".into(), vec!["2024-01-04"]).into(),
        ])
        .unwrap();
        loader.add_adjustments(&close, &adjustments).unwrap();

        let array = load(&loader, &close);
        let adjusted = array.adjusted_data();
        let adjusted = adjusted.as_float().unwrap();
        assert_eq!(adjusted[[0, 0]], 5.0);
        assert_eq!(adjusted[[1, 0]], 5.5);
        assert_eq!(adjusted[[2, 0]], 12.0);
    }

    #[test]
    fn test_unknown_kind_is_a_source_error() {
        let close = equity_pricing().column("close").unwrap();
        let mut loader = FrameLoader::new(vec![day(2)], vec![Sid(1)]);
        loader.add_frame(&close, &baseline()).unwrap();
        let adjustments = DataFrame::new(vec![
            Series::new("sid".into(), vec![1u32]).into(),
            Series::new("kind".into(), vec!["rescale"]).into(),
            Series::new("value".into(), vec![2.0]).into(),
            Series::new("start_date".into(), vec!["2024-01-01"]).into(),
            Series::new("end_date".into(), vec!["2024-01-01"]).into(),
            Series::new("apply_date".into(), vec!["2024-01-02"]).into(),
        ])
        .unwrap();
        let err = loader.add_adjustments(&close, &adjustments).unwrap_err();
        assert!(matches!(err, LoadError::Source { .. }));
    }

    #[test]
    fn test_missing_value_column_is_a_source_error() {
        let close = equity_pricing().column("close").unwrap();
        let mut loader = FrameLoader::new(vec![day(2)], vec![Sid(1)]);
        let df = DataFrame::new(vec![
            Series::new("date".into(), vec!["2024-01-02"]).into(),
            Series::new("sid".into(), vec![1u32]).into(),
        ])
        .unwrap();
        assert!(matches!(
            loader.add_frame(&close, &df),
            Err(LoadError::Source { .. })
        ));
    }
}
