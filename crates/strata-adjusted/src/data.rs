//! Dense 2-D buffers tagged by dtype.

use crate::dtype::{DType, NAT, Scalar};
use crate::error::{ArrayError, Result};
use crate::label::LabelArray;
use ndarray::{Array2, ArrayView2, Axis, s};

/// A dense (dates x assets) buffer of one dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    /// Float buffer
    Float64(Array2<f64>),
    /// Integer buffer
    Int64(Array2<i64>),
    /// Boolean buffer
    Bool(Array2<bool>),
    /// Timestamp buffer (nanoseconds, [`NAT`] when missing)
    Datetime(Array2<i64>),
    /// Categorical buffer
    Categorical(LabelArray),
}

impl ArrayData {
    /// Buffer dtype.
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Float64(_) => DType::Float64,
            Self::Int64(_) => DType::Int64,
            Self::Bool(_) => DType::Bool,
            Self::Datetime(_) => DType::Datetime,
            Self::Categorical(_) => DType::Categorical,
        }
    }

    /// (rows, columns).
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Float64(a) => a.dim(),
            Self::Int64(a) | Self::Datetime(a) => a.dim(),
            Self::Bool(a) => a.dim(),
            Self::Categorical(a) => a.shape(),
        }
    }

    /// Number of rows (dates).
    pub fn nrows(&self) -> usize {
        self.shape().0
    }

    /// Number of columns (assets).
    pub fn ncols(&self) -> usize {
        self.shape().1
    }

    /// Buffer of `shape` filled with `value`; the dtype follows the scalar.
    pub fn full(value: &Scalar, shape: (usize, usize)) -> Self {
        match value {
            Scalar::Float(v) => Self::Float64(Array2::from_elem(shape, *v)),
            Scalar::Int(v) => Self::Int64(Array2::from_elem(shape, *v)),
            Scalar::Bool(v) => Self::Bool(Array2::from_elem(shape, *v)),
            Scalar::Datetime(v) => Self::Datetime(Array2::from_elem(shape, *v)),
            Scalar::Label(label) => {
                let mut labels = LabelArray::missing(shape);
                if label.is_some() && shape.0 > 0 && shape.1 > 0 {
                    labels.fill_region((0, shape.0 - 1), (0, shape.1 - 1), label.as_deref());
                }
                Self::Categorical(labels)
            }
        }
    }

    /// Owned copy of rows `start..end`.
    pub fn slice_rows(&self, start: usize, end: usize) -> Self {
        match self {
            Self::Float64(a) => Self::Float64(a.slice(s![start..end, ..]).to_owned()),
            Self::Int64(a) => Self::Int64(a.slice(s![start..end, ..]).to_owned()),
            Self::Bool(a) => Self::Bool(a.slice(s![start..end, ..]).to_owned()),
            Self::Datetime(a) => Self::Datetime(a.slice(s![start..end, ..]).to_owned()),
            Self::Categorical(a) => Self::Categorical(a.slice_rows(start, end)),
        }
    }

    /// Owned copy of the selected columns, in the given order.
    pub fn select_columns(&self, cols: &[usize]) -> Self {
        match self {
            Self::Float64(a) => Self::Float64(a.select(Axis(1), cols)),
            Self::Int64(a) => Self::Int64(a.select(Axis(1), cols)),
            Self::Bool(a) => Self::Bool(a.select(Axis(1), cols)),
            Self::Datetime(a) => Self::Datetime(a.select(Axis(1), cols)),
            Self::Categorical(a) => Self::Categorical(a.select_columns(cols)),
        }
    }

    /// Owned copy of the selected rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        match self {
            Self::Float64(a) => Self::Float64(a.select(Axis(0), rows)),
            Self::Int64(a) => Self::Int64(a.select(Axis(0), rows)),
            Self::Bool(a) => Self::Bool(a.select(Axis(0), rows)),
            Self::Datetime(a) => Self::Datetime(a.select(Axis(0), rows)),
            Self::Categorical(a) => Self::Categorical(a.select_rows(rows)),
        }
    }

    /// Stack buffers of one dtype vertically.
    pub fn concat_rows(parts: &[&Self]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(ArrayError::ShapeMismatch {
                expected: (0, 0),
                actual: (0, 0),
            });
        };
        let dtype = first.dtype();
        if let Some(other) = parts.iter().find(|p| p.dtype() != dtype) {
            return Err(ArrayError::DTypeMismatch {
                expected: dtype,
                actual: other.dtype().to_string(),
            });
        }
        let ncols = first.ncols();
        if let Some(other) = parts.iter().find(|p| p.ncols() != ncols) {
            return Err(ArrayError::ShapeMismatch {
                expected: (other.nrows(), ncols),
                actual: other.shape(),
            });
        }
        Ok(match first {
            Self::Float64(_) => Self::Float64(stack(parts, Self::as_float)?),
            Self::Int64(_) => Self::Int64(stack(parts, Self::as_int)?),
            Self::Bool(_) => Self::Bool(stack(parts, Self::as_bool)?),
            Self::Datetime(_) => Self::Datetime(stack(parts, Self::as_datetime)?),
            Self::Categorical(_) => {
                let labels: Vec<&LabelArray> = parts.iter().filter_map(|p| p.as_labels()).collect();
                Self::Categorical(LabelArray::concat_rows(&labels)?)
            }
        })
    }

    /// Copy with every cell where `mask` is false replaced by `missing`.
    pub fn where_mask(&self, mask: &Array2<bool>, missing: &Scalar) -> Result<Self> {
        if mask.dim() != self.shape() {
            return Err(ArrayError::ShapeMismatch {
                expected: self.shape(),
                actual: mask.dim(),
            });
        }
        missing.expect_dtype(self.dtype())?;
        let mut out = self.clone();
        match (&mut out, missing) {
            (Self::Float64(a), Scalar::Float(v)) => mask_in_place(a, mask, *v),
            (Self::Int64(a), Scalar::Int(v)) | (Self::Datetime(a), Scalar::Datetime(v)) => {
                mask_in_place(a, mask, *v)
            }
            (Self::Bool(a), Scalar::Bool(v)) => mask_in_place(a, mask, *v),
            (Self::Categorical(a), Scalar::Label(label)) => {
                let code = a.intern(label.as_deref());
                mask_in_place(a.codes_mut(), mask, code);
            }
            (data, _) => {
                return Err(ArrayError::DTypeMismatch {
                    expected: data.dtype(),
                    actual: missing.dtype().to_string(),
                });
            }
        }
        Ok(out)
    }

    /// True where a cell holds `missing` (or NaN / NaT / a missing label).
    pub fn is_missing(&self, missing: &Scalar) -> Array2<bool> {
        match self {
            Self::Float64(a) => {
                let sentinel = missing.as_f64();
                a.map(|v| v.is_nan() || sentinel.is_some_and(|m| m == *v))
            }
            Self::Int64(a) => {
                let sentinel = missing.as_i64();
                a.map(|v| sentinel == Some(*v))
            }
            Self::Datetime(a) => {
                let sentinel = missing.as_i64();
                a.map(|v| *v == NAT || sentinel == Some(*v))
            }
            Self::Bool(a) => {
                let sentinel = missing.as_bool();
                a.map(|v| sentinel == Some(*v))
            }
            Self::Categorical(a) => match missing.as_label() {
                Some(label) => {
                    let mut out = a.is_missing();
                    out.zip_mut_with(&a.eq_label(label), |m, e| *m |= *e);
                    out
                }
                None => a.is_missing(),
            },
        }
    }

    /// Value at a cell.
    pub fn get(&self, row: usize, col: usize) -> Option<Scalar> {
        match self {
            Self::Float64(a) => a.get([row, col]).map(|v| Scalar::Float(*v)),
            Self::Int64(a) => a.get([row, col]).map(|v| Scalar::Int(*v)),
            Self::Bool(a) => a.get([row, col]).map(|v| Scalar::Bool(*v)),
            Self::Datetime(a) => a.get([row, col]).map(|v| Scalar::Datetime(*v)),
            Self::Categorical(a) => {
                let (nrows, ncols) = a.shape();
                (row < nrows && col < ncols)
                    .then(|| Scalar::Label(a.get(row, col).map(str::to_string)))
            }
        }
    }

    /// Float buffer, if this is one.
    pub const fn as_float(&self) -> Option<&Array2<f64>> {
        match self {
            Self::Float64(a) => Some(a),
            _ => None,
        }
    }

    /// Integer buffer, if this is one.
    pub const fn as_int(&self) -> Option<&Array2<i64>> {
        match self {
            Self::Int64(a) => Some(a),
            _ => None,
        }
    }

    /// Boolean buffer, if this is one.
    pub const fn as_bool(&self) -> Option<&Array2<bool>> {
        match self {
            Self::Bool(a) => Some(a),
            _ => None,
        }
    }

    /// Timestamp buffer, if this is one.
    pub const fn as_datetime(&self) -> Option<&Array2<i64>> {
        match self {
            Self::Datetime(a) => Some(a),
            _ => None,
        }
    }

    /// Label buffer, if this is one.
    pub const fn as_labels(&self) -> Option<&LabelArray> {
        match self {
            Self::Categorical(a) => Some(a),
            _ => None,
        }
    }

    /// Consume into a boolean buffer.
    pub fn into_bool(self) -> Result<Array2<bool>> {
        match self {
            Self::Bool(a) => Ok(a),
            other => Err(ArrayError::DTypeMismatch {
                expected: DType::Bool,
                actual: other.dtype().to_string(),
            }),
        }
    }
}

fn stack<T, F>(parts: &[&ArrayData], get: F) -> Result<Array2<T>>
where
    T: Clone,
    F: Fn(&ArrayData) -> Option<&Array2<T>>,
{
    let views: Vec<ArrayView2<'_, T>> = parts.iter().filter_map(|p| get(p)).map(Array2::view).collect();
    ndarray::concatenate(Axis(0), &views).map_err(|_| ArrayError::ShapeMismatch {
        expected: (0, parts.first().map_or(0, |p| p.ncols())),
        actual: (0, 0),
    })
}

fn mask_in_place<T: Clone>(a: &mut Array2<T>, mask: &Array2<bool>, missing: T) {
    a.zip_mut_with(mask, |v, keep| {
        if !*keep {
            *v = missing.clone();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_full_follows_scalar_dtype() {
        let data = ArrayData::full(&Scalar::Int(-1), (2, 3));
        assert_eq!(data.dtype(), DType::Int64);
        assert_eq!(data.shape(), (2, 3));
        assert_eq!(data.get(1, 2), Some(Scalar::Int(-1)));
        assert_eq!(data.get(2, 0), None);

        let labels = ArrayData::full(&Scalar::Label(Some("x".into())), (1, 2));
        assert_eq!(labels.get(0, 1), Some(Scalar::Label(Some("x".into()))));
    }

    #[test]
    fn test_slice_select_concat() {
        let data = ArrayData::Float64(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let tail = data.slice_rows(1, 3);
        assert_eq!(tail, ArrayData::Float64(array![[3.0, 4.0], [5.0, 6.0]]));
        let swapped = data.select_columns(&[1, 0]);
        assert_eq!(swapped.get(0, 0), Some(Scalar::Float(2.0)));
        let head = data.slice_rows(0, 1);
        assert_eq!(ArrayData::concat_rows(&[&head, &tail]).unwrap(), data);
    }

    #[test]
    fn test_concat_rejects_mixed_dtypes() {
        let a = ArrayData::Float64(array![[1.0]]);
        let b = ArrayData::Int64(array![[1]]);
        assert!(matches!(
            ArrayData::concat_rows(&[&a, &b]),
            Err(ArrayError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_where_mask() {
        let data = ArrayData::Int64(array![[1, 2], [3, 4]]);
        let mask = array![[true, false], [false, true]];
        let masked = data.where_mask(&mask, &Scalar::Int(0)).unwrap();
        assert_eq!(masked, ArrayData::Int64(array![[1, 0], [0, 4]]));
        assert!(data.where_mask(&mask, &Scalar::Float(0.0)).is_err());
    }

    #[test]
    fn test_is_missing() {
        let floats = ArrayData::Float64(array![[f64::NAN, 1.0, -1.0]]);
        assert_eq!(floats.is_missing(&Scalar::Float(f64::NAN)), array![[true, false, false]]);
        assert_eq!(floats.is_missing(&Scalar::Float(-1.0)), array![[true, false, true]]);

        let dates = ArrayData::Datetime(array![[NAT, 5]]);
        assert_eq!(dates.is_missing(&Scalar::Datetime(NAT)), array![[true, false]]);
    }
}
