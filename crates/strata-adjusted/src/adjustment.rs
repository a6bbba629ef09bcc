//! Point-in-time adjustments to rectangular regions of a buffer.
//!
//! An adjustment covers the inclusive region `[first_row, last_row] x
//! [first_col, last_col]` in full-buffer coordinates. [`crate::AdjustedArray`]
//! stores adjustments keyed by the row at which they become known; a window
//! whose trailing edge reaches that row sees the region adjusted.

use crate::data::ArrayData;
use crate::dtype::{DType, Scalar};
use crate::error::{ArrayError, Result};
use ndarray::{Array2, s};
use std::fmt;
use std::ops::RangeInclusive;

/// Operation carried by an [`Adjustment`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentOp {
    /// Multiply every covered cell (Float64, or Int64 with an integral value)
    Multiply(f64),
    /// Add to every covered cell (Float64, or Int64 with an integral value)
    Add(f64),
    /// Replace every covered cell with one value
    Overwrite(Scalar),
    /// Replace each covered row with its own value across the column range
    OverwriteRows(Vec<Scalar>),
}

impl AdjustmentOp {
    /// Operation name used in messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Multiply(_) => "Multiply",
            Self::Add(_) => "Add",
            Self::Overwrite(_) => "Overwrite",
            Self::OverwriteRows(_) => "OverwriteRows",
        }
    }
}

/// A pending change to a region of a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    first_row: usize,
    last_row: usize,
    first_col: usize,
    last_col: usize,
    op: AdjustmentOp,
}

impl Adjustment {
    /// Create an adjustment over inclusive row and column bounds.
    pub fn new(
        first_row: usize,
        last_row: usize,
        first_col: usize,
        last_col: usize,
        op: AdjustmentOp,
    ) -> Result<Self> {
        if first_row > last_row || first_col > last_col {
            return Err(ArrayError::InvalidAdjustmentBounds {
                first_row,
                last_row,
                first_col,
                last_col,
            });
        }
        if let AdjustmentOp::OverwriteRows(values) = &op {
            let expected = last_row - first_row + 1;
            if values.len() != expected {
                return Err(ArrayError::RowValueCount {
                    expected,
                    actual: values.len(),
                });
            }
            if let Some(first) = values.first() {
                let dtype = first.dtype();
                for value in values {
                    value.expect_dtype(dtype)?;
                }
            }
        }
        Ok(Self {
            first_row,
            last_row,
            first_col,
            last_col,
            op,
        })
    }

    /// Multiply a region by `value`.
    pub fn multiply(
        first_row: usize,
        last_row: usize,
        first_col: usize,
        last_col: usize,
        value: f64,
    ) -> Result<Self> {
        Self::new(first_row, last_row, first_col, last_col, AdjustmentOp::Multiply(value))
    }

    /// Add `value` to a region.
    pub fn add(
        first_row: usize,
        last_row: usize,
        first_col: usize,
        last_col: usize,
        value: f64,
    ) -> Result<Self> {
        Self::new(first_row, last_row, first_col, last_col, AdjustmentOp::Add(value))
    }

    /// Overwrite a region with `value`.
    pub fn overwrite(
        first_row: usize,
        last_row: usize,
        first_col: usize,
        last_col: usize,
        value: Scalar,
    ) -> Result<Self> {
        Self::new(first_row, last_row, first_col, last_col, AdjustmentOp::Overwrite(value))
    }

    /// First covered row.
    pub const fn first_row(&self) -> usize {
        self.first_row
    }

    /// Last covered row (inclusive).
    pub const fn last_row(&self) -> usize {
        self.last_row
    }

    /// First covered column.
    pub const fn first_col(&self) -> usize {
        self.first_col
    }

    /// Last covered column (inclusive).
    pub const fn last_col(&self) -> usize {
        self.last_col
    }

    /// Covered rows.
    pub const fn rows(&self) -> RangeInclusive<usize> {
        self.first_row..=self.last_row
    }

    /// Covered columns.
    pub const fn cols(&self) -> RangeInclusive<usize> {
        self.first_col..=self.last_col
    }

    /// Operation.
    pub const fn op(&self) -> &AdjustmentOp {
        &self.op
    }

    /// Ensure the operation is defined for `dtype`.
    pub fn check_dtype(&self, dtype: DType) -> Result<()> {
        match &self.op {
            AdjustmentOp::Multiply(v) | AdjustmentOp::Add(v) => match dtype {
                DType::Float64 => Ok(()),
                DType::Int64 if as_integral(*v).is_some() => Ok(()),
                DType::Int64 => Err(ArrayError::NonIntegralAdjustment {
                    op: self.op.name(),
                    value: *v,
                }),
                _ => Err(ArrayError::IncompatibleAdjustment {
                    op: self.op.name(),
                    dtype,
                }),
            },
            AdjustmentOp::Overwrite(value) => value.expect_dtype(dtype),
            AdjustmentOp::OverwriteRows(values) => {
                values.iter().try_for_each(|value| value.expect_dtype(dtype))
            }
        }
    }

    /// True if the region lies inside a buffer of `shape`.
    pub const fn fits(&self, shape: (usize, usize)) -> bool {
        self.last_row < shape.0 && self.last_col < shape.1
    }

    /// Apply in place. Bounds and dtype must already have been validated.
    pub(crate) fn apply(&self, data: &mut ArrayData) {
        let (r0, r1, c0, c1) = (self.first_row, self.last_row, self.first_col, self.last_col);
        match (&self.op, data) {
            (AdjustmentOp::Multiply(v), ArrayData::Float64(a)) => {
                a.slice_mut(s![r0..=r1, c0..=c1]).mapv_inplace(|x| x * v);
            }
            (AdjustmentOp::Add(v), ArrayData::Float64(a)) => {
                a.slice_mut(s![r0..=r1, c0..=c1]).mapv_inplace(|x| x + v);
            }
            (AdjustmentOp::Multiply(v), ArrayData::Int64(a)) => {
                let v = as_integral(*v).unwrap_or(1);
                a.slice_mut(s![r0..=r1, c0..=c1]).mapv_inplace(|x| x.saturating_mul(v));
            }
            (AdjustmentOp::Add(v), ArrayData::Int64(a)) => {
                let v = as_integral(*v).unwrap_or(0);
                a.slice_mut(s![r0..=r1, c0..=c1]).mapv_inplace(|x| x.saturating_add(v));
            }
            (AdjustmentOp::Overwrite(value), data) => {
                for row in r0..=r1 {
                    overwrite_row(data, row, c0, c1, value);
                }
            }
            (AdjustmentOp::OverwriteRows(values), data) => {
                for (row, value) in (r0..=r1).zip(values) {
                    overwrite_row(data, row, c0, c1, value);
                }
            }
            // Arithmetic on other dtypes is rejected by `check_dtype`.
            (AdjustmentOp::Multiply(_) | AdjustmentOp::Add(_), _) => {}
        }
    }
}

/// `value` as an `i64`, if it is a whole number in range.
fn as_integral(value: f64) -> Option<i64> {
    // i64::MAX rounds up to 2^63 as f64, so the upper bound is exclusive.
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.fract() == 0.0 && in_range).then_some(value as i64)
}

fn overwrite_row(data: &mut ArrayData, row: usize, c0: usize, c1: usize, value: &Scalar) {
    match (data, value) {
        (ArrayData::Float64(a), Scalar::Float(v)) => fill(a, row, c0, c1, *v),
        (ArrayData::Int64(a), Scalar::Int(v)) | (ArrayData::Datetime(a), Scalar::Datetime(v)) => {
            fill(a, row, c0, c1, *v);
        }
        (ArrayData::Bool(a), Scalar::Bool(v)) => fill(a, row, c0, c1, *v),
        (ArrayData::Categorical(a), Scalar::Label(label)) => {
            a.fill_region((row, row), (c0, c1), label.as_deref());
        }
        _ => {}
    }
}

fn fill<T: Clone>(a: &mut Array2<T>, row: usize, c0: usize, c1: usize, value: T) {
    a.slice_mut(s![row, c0..=c1]).fill(value);
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(rows={}..={}, cols={}..={}",
            self.op.name(),
            self.first_row,
            self.last_row,
            self.first_col,
            self.last_col
        )?;
        match &self.op {
            AdjustmentOp::Multiply(v) | AdjustmentOp::Add(v) => write!(f, ", value={v})"),
            AdjustmentOp::Overwrite(v) => write!(f, ", value={v})"),
            AdjustmentOp::OverwriteRows(values) => {
                f.write_str(", values=[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("])")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::LabelArray;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = Adjustment::multiply(3, 1, 0, 0, 2.0).unwrap_err();
        assert!(matches!(err, ArrayError::InvalidAdjustmentBounds { .. }));
    }

    #[test]
    fn test_row_values_must_match_row_count() {
        let op = AdjustmentOp::OverwriteRows(vec![Scalar::Float(1.0)]);
        let err = Adjustment::new(0, 2, 0, 0, op).unwrap_err();
        assert_eq!(err, ArrayError::RowValueCount { expected: 3, actual: 1 });
    }

    #[test]
    fn test_arithmetic_on_numeric_dtypes() {
        let adj = Adjustment::add(0, 0, 0, 0, 1.0).unwrap();
        assert!(adj.check_dtype(DType::Float64).is_ok());
        assert!(adj.check_dtype(DType::Int64).is_ok());
        assert!(matches!(
            adj.check_dtype(DType::Bool),
            Err(ArrayError::IncompatibleAdjustment { op: "Add", .. })
        ));
        assert!(matches!(
            adj.check_dtype(DType::Datetime),
            Err(ArrayError::IncompatibleAdjustment { op: "Add", .. })
        ));
        let fractional = Adjustment::multiply(0, 0, 0, 0, 0.5).unwrap();
        assert!(matches!(
            fractional.check_dtype(DType::Int64),
            Err(ArrayError::NonIntegralAdjustment { op: "Multiply", .. })
        ));
        let ow = Adjustment::overwrite(0, 0, 0, 0, Scalar::Int(4)).unwrap();
        assert!(ow.check_dtype(DType::Int64).is_ok());
        assert!(ow.check_dtype(DType::Float64).is_err());
    }

    #[test]
    fn test_apply_multiply_region() {
        let mut data = ArrayData::Float64(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        Adjustment::multiply(0, 1, 1, 1, 0.5).unwrap().apply(&mut data);
        let a = data.as_float().unwrap();
        assert_relative_eq!(a[[0, 1]], 1.0);
        assert_relative_eq!(a[[1, 1]], 2.0);
        assert_relative_eq!(a[[2, 1]], 6.0);
        assert_relative_eq!(a[[0, 0]], 1.0);
    }

    #[test]
    fn test_int_adjustments_stay_integral() {
        let mut adjustments = crate::Adjustments::new();
        adjustments.insert(
            1,
            vec![
                Adjustment::add(0, 0, 0, 0, 1.0).unwrap(),
                Adjustment::multiply(0, 1, 1, 1, 3.0).unwrap(),
            ],
        );
        let array = crate::AdjustedArray::new(
            ArrayData::Int64(array![[1, 2], [4, 5]]),
            adjustments,
            Scalar::Int(-1),
        )
        .unwrap();
        assert_eq!(array.adjusted_data(), ArrayData::Int64(array![[2, 6], [4, 15]]));

        let mut saturating = ArrayData::Int64(array![[i64::MAX]]);
        Adjustment::multiply(0, 0, 0, 0, 2.0).unwrap().apply(&mut saturating);
        assert_eq!(saturating, ArrayData::Int64(array![[i64::MAX]]));
    }

    #[test]
    fn test_apply_overwrite_rows() {
        let mut data = ArrayData::Int64(array![[0, 0], [0, 0]]);
        let op = AdjustmentOp::OverwriteRows(vec![Scalar::Int(7), Scalar::Int(9)]);
        Adjustment::new(0, 1, 0, 1, op).unwrap().apply(&mut data);
        assert_eq!(data, ArrayData::Int64(array![[7, 7], [9, 9]]));
    }

    #[test]
    fn test_label_overwrite_extends_dictionary() {
        let labels = LabelArray::new((2, 1), [Some("a"), Some("b")]).unwrap();
        let mut data = ArrayData::Categorical(labels);
        Adjustment::overwrite(0, 1, 0, 0, Scalar::Label(Some("c".into())))
            .unwrap()
            .apply(&mut data);
        let labels = data.as_labels().unwrap();
        assert_eq!(labels.get(0, 0), Some("c"));
        assert_eq!(labels.get(1, 0), Some("c"));
        assert_eq!(labels.code_of("c"), Some(3));
    }

    #[test]
    fn test_display() {
        let adj = Adjustment::multiply(0, 1, 2, 3, 0.5).unwrap();
        assert_eq!(adj.to_string(), "Multiply(rows=0..=1, cols=2..=3, value=0.5)");
    }
}
