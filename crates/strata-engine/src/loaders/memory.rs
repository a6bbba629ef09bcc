//! Loader over dense tables held in memory.

use crate::error::LoadError;
use crate::loader::{LoadRequest, PipelineLoader};
use chrono::NaiveDate;
use ndarray::Array2;
use std::collections::{BTreeMap, HashMap};
use strata_adjusted::{AdjustedArray, Adjustment, AdjustmentOp, Adjustments, ArrayData, ArrayError, Scalar};
use strata_terms::{BoundColumn, Sid};

/// A restatement of one asset's history.
///
/// Values dated `start..=end` change by `op`, and the change becomes known
/// on `apply_date`: windows ending before that date see the old values.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentRecord {
    /// Asset affected.
    pub sid: Sid,
    /// Multiply, add or overwrite.
    pub op: AdjustmentOp,
    /// First restated date.
    pub start: NaiveDate,
    /// Last restated date.
    pub end: NaiveDate,
    /// Date the restatement became known.
    pub apply_date: NaiveDate,
}

impl AdjustmentRecord {
    /// Split-style record: multiply every value before `apply_date` by `ratio`.
    pub fn split(sid: Sid, ratio: f64, apply_date: NaiveDate) -> Self {
        Self {
            sid,
            op: AdjustmentOp::Multiply(ratio),
            start: NaiveDate::MIN,
            end: apply_date.pred_opt().unwrap_or(NaiveDate::MIN),
            apply_date,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredColumn {
    values: ArrayData,
    records: Vec<AdjustmentRecord>,
}

/// Columns stored as dense `(dates, sids)` tables.
///
/// Requests are answered by picking the requested sessions and assets out
/// of each table; anything the table does not cover is missing. Columns are
/// matched by dataset and column name, so the same data serves every domain
/// the dataset is specialised to. A column that was never added reports
/// [`LoadError::NoData`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    dates: Vec<NaiveDate>,
    sids: Vec<Sid>,
    date_index: HashMap<NaiveDate, usize>,
    sid_index: HashMap<Sid, usize>,
    columns: BTreeMap<String, StoredColumn>,
}

fn column_key(column: &BoundColumn) -> String {
    format!("{}.{}", column.dataset(), column.name())
}

impl InMemoryLoader {
    /// Loader whose tables have one row per date and one column per sid.
    pub fn new(dates: Vec<NaiveDate>, sids: Vec<Sid>) -> Self {
        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let sid_index = sids.iter().enumerate().map(|(i, s)| (*s, i)).collect();
        Self {
            dates,
            sids,
            date_index,
            sid_index,
            columns: BTreeMap::new(),
        }
    }

    /// Table dates.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Table assets.
    pub fn sids(&self) -> &[Sid] {
        &self.sids
    }

    /// True if `column` has a table.
    pub fn has_column(&self, column: &BoundColumn) -> bool {
        self.columns.contains_key(&column_key(column))
    }

    /// Store the table for `column`, replacing any previous one.
    pub fn add_column(&mut self, column: &BoundColumn, values: ArrayData) -> Result<(), LoadError> {
        let expected = (self.dates.len(), self.sids.len());
        if values.shape() != expected {
            return Err(LoadError::Shape {
                column: column.qualname(),
                expected,
                actual: values.shape(),
            });
        }
        column.missing_value().expect_dtype(values.dtype())?;
        self.columns.insert(
            column_key(column),
            StoredColumn {
                values,
                records: Vec::new(),
            },
        );
        Ok(())
    }

    /// Builder form of [`add_column`](Self::add_column).
    pub fn with_column(mut self, column: &BoundColumn, values: ArrayData) -> Result<Self, LoadError> {
        self.add_column(column, values)?;
        Ok(self)
    }

    /// Float column from a `(dates, sids)` array.
    pub fn add_float_column(&mut self, column: &BoundColumn, values: Array2<f64>) -> Result<(), LoadError> {
        self.add_column(column, ArrayData::Float64(values))
    }

    /// Attach a restatement to a stored column. Records apply in the order
    /// they are added.
    pub fn add_adjustment(&mut self, column: &BoundColumn, record: AdjustmentRecord) -> Result<(), LoadError> {
        let stored = self
            .columns
            .get_mut(&column_key(column))
            .ok_or_else(|| LoadError::NoData {
                column: column.qualname(),
            })?;
        if matches!(record.op, AdjustmentOp::OverwriteRows(_)) {
            return Err(ArrayError::IncompatibleAdjustment {
                op: record.op.name(),
                dtype: stored.values.dtype(),
            }
            .into());
        }
        Adjustment::new(0, 0, 0, 0, record.op.clone())?.check_dtype(stored.values.dtype())?;
        stored.records.push(record);
        Ok(())
    }

    fn gather(
        &self,
        values: &ArrayData,
        request: &LoadRequest<'_>,
        missing: &Scalar,
    ) -> Result<ArrayData, LoadError> {
        let rows: Vec<Option<usize>> = request
            .dates
            .iter()
            .map(|d| self.date_index.get(d).copied())
            .collect();
        let cols: Vec<Option<usize>> = request
            .sids
            .iter()
            .map(|s| self.sid_index.get(s).copied())
            .collect();
        let shape = request.shape();
        if values.nrows() == 0 || values.ncols() == 0 {
            return Ok(ArrayData::full(missing, shape));
        }
        let row_idx: Vec<usize> = rows.iter().map(|r| r.unwrap_or(0)).collect();
        let col_idx: Vec<usize> = cols.iter().map(|c| c.unwrap_or(0)).collect();
        let taken = values.select_rows(&row_idx).select_columns(&col_idx);
        let present = Array2::from_shape_fn(shape, |(r, c)| rows[r].is_some() && cols[c].is_some());
        Ok(taken.where_mask(&present, missing)?)
    }
}

/// Key and bound records against the requested sessions and assets.
///
/// The key is the first requested session on or after the apply date, so
/// records applied after the last requested session are not yet known and
/// are dropped. Records touching no requested row or asset are dropped too.
fn keyed_adjustments(
    records: &[AdjustmentRecord],
    dates: &[NaiveDate],
    sids: &[Sid],
) -> Result<Adjustments, LoadError> {
    let mut out = Adjustments::new();
    for record in records {
        let Some(col) = sids.iter().position(|sid| *sid == record.sid) else {
            continue;
        };
        let key = dates.partition_point(|d| *d < record.apply_date);
        if key == dates.len() {
            continue;
        }
        let first_row = dates.partition_point(|d| *d < record.start);
        let end_row = dates.partition_point(|d| *d <= record.end);
        if first_row >= end_row {
            continue;
        }
        let adjustment = Adjustment::new(first_row, end_row - 1, col, col, record.op.clone())?;
        out.entry(key).or_default().push(adjustment);
    }
    Ok(out)
}

impl PipelineLoader for InMemoryLoader {
    fn load_adjusted_array(
        &self,
        request: &LoadRequest<'_>,
    ) -> Result<BTreeMap<BoundColumn, AdjustedArray>, LoadError> {
        let mut out = BTreeMap::new();
        for column in request.columns {
            let stored = self
                .columns
                .get(&column_key(column))
                .ok_or_else(|| LoadError::NoData {
                    column: column.qualname(),
                })?;
            let missing = column.missing_value();
            let data = self.gather(&stored.values, request, missing)?;
            let adjustments = keyed_adjustments(&stored.records, request.dates, request.sids)?;
            out.insert(
                column.clone(),
                AdjustedArray::new(data, adjustments, missing.clone())?,
            );
        }
        Ok(out)
    }
}
