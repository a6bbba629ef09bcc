//! Buffers paired with the adjustments that become known while walking them.
//!
//! An [`AdjustedArray`] is built once per term per chunk. The raw buffer holds
//! values as they were known on each row's own date. Adjustments keyed at row
//! `R` describe restatements learned on row `R` (splits, dividends, mergers)
//! and are applied to every window whose trailing edge has reached `R`.

use crate::adjustment::Adjustment;
use crate::data::ArrayData;
use crate::dtype::{DType, Scalar};
use crate::error::{ArrayError, Result};
use crate::window::AdjustedArrayWindow;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Adjustments keyed by the row at which they take effect.
pub type Adjustments = BTreeMap<usize, Vec<Adjustment>>;

/// How [`AdjustedArray::update_adjustments`] orders new adjustments that share
/// a key with existing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// New adjustments run after existing ones
    Append,
    /// New adjustments run before existing ones
    Prepend,
}

/// A dense buffer plus the adjustments to apply while traversing it.
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustedArray {
    data: ArrayData,
    adjustments: Adjustments,
    missing_value: Scalar,
}

impl AdjustedArray {
    /// Create an adjusted array, validating every adjustment against the buffer.
    pub fn new(data: ArrayData, adjustments: Adjustments, missing_value: Scalar) -> Result<Self> {
        missing_value.expect_dtype(data.dtype())?;
        validate(&data, &adjustments)?;
        Ok(Self {
            data,
            adjustments,
            missing_value,
        })
    }

    /// Array with no adjustments.
    pub fn unadjusted(data: ArrayData, missing_value: Scalar) -> Result<Self> {
        Self::new(data, Adjustments::new(), missing_value)
    }

    /// All-missing array of `shape`.
    pub fn missing(missing_value: Scalar, shape: (usize, usize)) -> Self {
        Self {
            data: ArrayData::full(&missing_value, shape),
            adjustments: Adjustments::new(),
            missing_value,
        }
    }

    /// Raw, unadjusted buffer.
    pub const fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Consume into the raw buffer.
    pub fn into_data(self) -> ArrayData {
        self.data
    }

    /// Adjustments keyed by row.
    pub const fn adjustments(&self) -> &Adjustments {
        &self.adjustments
    }

    /// Missing value.
    pub const fn missing_value(&self) -> &Scalar {
        &self.missing_value
    }

    /// Buffer dtype.
    pub const fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// (rows, columns).
    pub fn shape(&self) -> (usize, usize) {
        self.data.shape()
    }

    /// Traverse windows of `window_length` rows from the top of the buffer.
    pub fn traverse(&self, window_length: usize) -> Result<AdjustedArrayWindow> {
        self.traverse_with(window_length, 0, 0)
    }

    /// Traverse windows of `window_length` rows, skipping the first `offset`
    /// rows. Adjustments keyed up to `perspective_offset` rows past each
    /// window's end are visible to it.
    pub fn traverse_with(
        &self,
        window_length: usize,
        offset: usize,
        perspective_offset: usize,
    ) -> Result<AdjustedArrayWindow> {
        if window_length == 0 {
            return Err(ArrayError::WindowLengthNotPositive);
        }
        let nrows = self.data.nrows();
        if offset + window_length > nrows {
            return Err(ArrayError::WindowLengthTooLong {
                window_length,
                offset,
                nrows,
            });
        }
        Ok(AdjustedArrayWindow::new(
            self.data.clone(),
            self.flat_adjustments(),
            window_length,
            offset,
            perspective_offset,
        ))
    }

    /// Rows `start..end`, each as known on its own row: adjustments keyed at
    /// or before a row are applied to it, later ones are not.
    pub fn rows_as_of(&self, start: usize, end: usize) -> Result<ArrayData> {
        if self.adjustments.is_empty() || start >= end {
            return Ok(self.data.slice_rows(start, end));
        }
        let rows: Vec<ArrayData> = self.traverse_with(1, start, 0)?.take(end - start).collect();
        ArrayData::concat_rows(&rows.iter().collect::<Vec<_>>())
    }

    /// Merge more adjustments into this array.
    pub fn update_adjustments(&mut self, other: Adjustments, mode: MergeMode) -> Result<()> {
        validate(&self.data, &other)?;
        for (key, mut incoming) in other {
            let existing = self.adjustments.entry(key).or_default();
            match mode {
                MergeMode::Append => existing.append(&mut incoming),
                MergeMode::Prepend => {
                    incoming.append(existing);
                    *existing = incoming;
                }
            }
        }
        Ok(())
    }

    /// Buffer with every adjustment applied, as seen from the last row.
    pub fn adjusted_data(&self) -> ArrayData {
        let mut data = self.data.clone();
        for (_, adjustment) in self.flat_adjustments() {
            adjustment.apply(&mut data);
        }
        data
    }

    /// Human-readable description of the buffer and its adjustments.
    pub fn inspect(&self) -> String {
        let (nrows, ncols) = self.shape();
        let mut out = format!(
            "Adjusted Array ({}, {nrows}x{ncols}, missing={}):\n\nData:\n",
            self.dtype(),
            self.missing_value
        );
        let _ = writeln!(out, "{}", render(&self.data));
        out.push_str("\nAdjustments:\n");
        if self.adjustments.is_empty() {
            out.push_str("  (none)\n");
        }
        for (key, adjustments) in &self.adjustments {
            for adjustment in adjustments {
                let _ = writeln!(out, "  {key}: {adjustment}");
            }
        }
        out
    }

    fn flat_adjustments(&self) -> Vec<(usize, Adjustment)> {
        self.adjustments
            .iter()
            .flat_map(|(key, adjustments)| adjustments.iter().map(|a| (*key, a.clone())))
            .collect()
    }
}

fn validate(data: &ArrayData, adjustments: &Adjustments) -> Result<()> {
    let (nrows, ncols) = data.shape();
    for (&key, list) in adjustments {
        for adjustment in list {
            if key >= nrows || !adjustment.fits((nrows, ncols)) {
                return Err(ArrayError::AdjustmentOutOfBounds { key, nrows, ncols });
            }
            adjustment.check_dtype(data.dtype())?;
        }
    }
    Ok(())
}

fn render(data: &ArrayData) -> String {
    match data {
        ArrayData::Float64(a) => format!("{a}"),
        ArrayData::Int64(a) | ArrayData::Datetime(a) => format!("{a}"),
        ArrayData::Bool(a) => format!("{a}"),
        ArrayData::Categorical(a) => format!("{:?}", a.to_labels()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjustment::AdjustmentOp;
    use crate::label::LabelArray;
    use approx::assert_relative_eq;
    use ndarray::{Array2, array};
    use proptest::prelude::*;

    fn column(values: &[f64]) -> ArrayData {
        ArrayData::Float64(Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap())
    }

    fn windows(array: &AdjustedArray, window_length: usize) -> Vec<Vec<f64>> {
        array
            .traverse(window_length)
            .unwrap()
            .map(|w| w.as_float().unwrap().iter().copied().collect())
            .collect()
    }

    fn nan() -> Scalar {
        Scalar::Float(f64::NAN)
    }

    #[test]
    fn test_split_applies_once_trailing_edge_reaches_key() {
        let mut adjustments = Adjustments::new();
        adjustments.insert(1, vec![Adjustment::multiply(0, 1, 0, 0, 0.5).unwrap()]);
        let array = AdjustedArray::new(column(&[1.0, 2.0, 3.0, 4.0]), adjustments, nan()).unwrap();

        let seen = windows(&array, 2);
        assert_eq!(seen, vec![vec![0.5, 1.0], vec![1.0, 3.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_adjustment_after_window_is_invisible() {
        let mut adjustments = Adjustments::new();
        adjustments.insert(3, vec![Adjustment::multiply(0, 2, 0, 0, 10.0).unwrap()]);
        let array = AdjustedArray::new(column(&[1.0, 2.0, 3.0, 4.0]), adjustments, nan()).unwrap();

        let seen = windows(&array, 3);
        assert_eq!(seen, vec![vec![1.0, 2.0, 3.0], vec![20.0, 30.0, 4.0]]);
    }

    #[test]
    fn test_traversals_are_independent() {
        let mut adjustments = Adjustments::new();
        adjustments.insert(0, vec![Adjustment::add(0, 0, 0, 0, 1.0).unwrap()]);
        let array = AdjustedArray::new(column(&[1.0, 2.0]), adjustments, nan()).unwrap();

        assert_eq!(windows(&array, 1), windows(&array, 1));
        assert_eq!(array.data(), &column(&[1.0, 2.0]));
    }

    #[test]
    fn test_offset_and_perspective() {
        let mut adjustments = Adjustments::new();
        adjustments.insert(2, vec![Adjustment::multiply(0, 1, 0, 0, 2.0).unwrap()]);
        let array = AdjustedArray::new(column(&[1.0, 2.0, 3.0]), adjustments, nan()).unwrap();

        let plain: Vec<ArrayData> = array.traverse_with(1, 1, 0).unwrap().collect();
        assert_eq!(plain, vec![column(&[2.0]), column(&[3.0])]);

        let ahead: Vec<ArrayData> = array.traverse_with(1, 1, 1).unwrap().collect();
        assert_eq!(ahead, vec![column(&[4.0]), column(&[3.0])]);
    }

    #[test]
    fn test_rows_as_of_match_single_row_windows() {
        let mut adjustments = Adjustments::new();
        adjustments.insert(1, vec![Adjustment::multiply(0, 1, 0, 0, 0.5).unwrap()]);
        adjustments.insert(2, vec![Adjustment::overwrite(2, 2, 0, 0, Scalar::Float(9.0)).unwrap()]);
        let array = AdjustedArray::new(column(&[1.0, 2.0, 3.0, 4.0]), adjustments, nan()).unwrap();

        assert_eq!(array.rows_as_of(0, 4).unwrap(), column(&[1.0, 1.0, 9.0, 4.0]));
        assert_eq!(array.rows_as_of(2, 4).unwrap(), column(&[9.0, 4.0]));
        let single: Vec<ArrayData> = array.traverse(1).unwrap().collect();
        assert_eq!(single[1], column(&[1.0]));
        assert_eq!(array.rows_as_of(1, 1).unwrap().shape(), (0, 1));
    }

    #[test]
    fn test_window_bounds() {
        let array = AdjustedArray::unadjusted(column(&[1.0, 2.0]), nan()).unwrap();
        assert_eq!(array.traverse(0).unwrap_err(), ArrayError::WindowLengthNotPositive);
        assert_eq!(
            array.traverse(3).unwrap_err(),
            ArrayError::WindowLengthTooLong {
                window_length: 3,
                offset: 0,
                nrows: 2
            }
        );
        assert_eq!(array.traverse(2).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_columns_yield_empty_windows() {
        let array =
            AdjustedArray::unadjusted(ArrayData::Float64(Array2::zeros((3, 0))), nan()).unwrap();
        let seen: Vec<ArrayData> = array.traverse(2).unwrap().collect();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|w| w.shape() == (2, 0)));
    }

    #[test]
    fn test_validation() {
        let mut out_of_bounds = Adjustments::new();
        out_of_bounds.insert(5, vec![Adjustment::multiply(0, 0, 0, 0, 1.0).unwrap()]);
        assert!(matches!(
            AdjustedArray::new(column(&[1.0]), out_of_bounds, nan()),
            Err(ArrayError::AdjustmentOutOfBounds { key: 5, .. })
        ));

        let mut wrong_dtype = Adjustments::new();
        wrong_dtype.insert(0, vec![Adjustment::multiply(0, 0, 0, 0, 2.0).unwrap()]);
        let bools = ArrayData::Bool(array![[true]]);
        assert!(matches!(
            AdjustedArray::new(bools, wrong_dtype, Scalar::Bool(false)),
            Err(ArrayError::IncompatibleAdjustment { .. })
        ));
        let ints = ArrayData::Int64(array![[1]]);
        assert!(AdjustedArray::unadjusted(ints, nan()).is_err());
    }

    #[test]
    fn test_seek_and_remaining() {
        let array = AdjustedArray::unadjusted(column(&[1.0, 2.0, 3.0, 4.0, 5.0]), nan()).unwrap();
        let mut cursor = array.traverse(2).unwrap();
        assert_eq!(cursor.remaining(), 4);
        cursor.seek(4).unwrap();
        assert_eq!(cursor.remaining(), 2);
        let window = cursor.next_window().unwrap();
        assert_eq!(window.as_float().unwrap().column(0).to_vec(), vec![3.0, 4.0]);
        assert!(matches!(cursor.seek(1), Err(ArrayError::SeekBackwards { .. })));
    }

    #[test]
    fn test_update_adjustments_ordering() {
        let mut array = AdjustedArray::unadjusted(column(&[10.0]), nan()).unwrap();
        let add = |v| {
            let mut m = Adjustments::new();
            m.insert(0, vec![Adjustment::add(0, 0, 0, 0, v).unwrap()]);
            m
        };
        let mul = || {
            let mut m = Adjustments::new();
            m.insert(0, vec![Adjustment::multiply(0, 0, 0, 0, 2.0).unwrap()]);
            m
        };
        array.update_adjustments(add(1.0), MergeMode::Append).unwrap();
        array.update_adjustments(mul(), MergeMode::Append).unwrap();
        assert_relative_eq!(array.adjusted_data().as_float().unwrap()[[0, 0]], 22.0);

        array.update_adjustments(add(5.0), MergeMode::Prepend).unwrap();
        assert_relative_eq!(array.adjusted_data().as_float().unwrap()[[0, 0]], 32.0);
    }

    #[test]
    fn test_label_traversal_with_overwrite() {
        let labels = LabelArray::new((3, 1), [Some("AAA"), Some("AAA"), Some("BBB")]).unwrap();
        let mut adjustments = Adjustments::new();
        adjustments.insert(
            2,
            vec![Adjustment::overwrite(0, 1, 0, 0, Scalar::Label(Some("CCC".into()))).unwrap()],
        );
        let array =
            AdjustedArray::new(ArrayData::Categorical(labels), adjustments, Scalar::Label(None))
                .unwrap();

        let seen: Vec<ArrayData> = array.traverse(2).unwrap().collect();
        let first = seen[0].as_labels().unwrap();
        let second = seen[1].as_labels().unwrap();
        assert_eq!(first.get(0, 0), Some("AAA"));
        assert_eq!(second.get(0, 0), Some("CCC"));
        assert_eq!(second.get(1, 0), Some("BBB"));
    }

    #[test]
    fn test_overwrite_rows_and_inspect() {
        let op = AdjustmentOp::OverwriteRows(vec![Scalar::Float(7.0), Scalar::Float(8.0)]);
        let mut adjustments = Adjustments::new();
        adjustments.insert(1, vec![Adjustment::new(0, 1, 0, 0, op).unwrap()]);
        let array = AdjustedArray::new(column(&[1.0, 2.0]), adjustments, nan()).unwrap();
        assert_eq!(array.adjusted_data(), column(&[7.0, 8.0]));

        let text = array.inspect();
        assert!(text.contains("float64"));
        assert!(text.contains("1: OverwriteRows"));
    }

    fn reference_window(
        base: &[f64],
        adjustments: &[(usize, usize, f64)],
        anchor: usize,
        window_length: usize,
    ) -> Vec<f64> {
        let mut data = base.to_vec();
        for &(key, first_row, factor) in adjustments {
            if key < anchor {
                for value in &mut data[first_row..=key] {
                    *value *= factor;
                }
            }
        }
        data[anchor - window_length..anchor].to_vec()
    }

    proptest! {
        #[test]
        fn prop_windows_match_reference(
            base in proptest::collection::vec(1.0f64..100.0, 1..24),
            raw in proptest::collection::vec((0usize..24, 0usize..24, 0.5f64..2.0), 0..6),
            window_length in 1usize..6,
        ) {
            let nrows = base.len();
            prop_assume!(window_length <= nrows);

            let mut specs: Vec<(usize, usize, f64)> = raw
                .into_iter()
                .map(|(key, first, factor)| {
                    let key = key % nrows;
                    (key, first % (key + 1), factor)
                })
                .collect();
            specs.sort_by_key(|spec| spec.0);

            let mut adjustments = Adjustments::new();
            for &(key, first_row, factor) in &specs {
                adjustments
                    .entry(key)
                    .or_default()
                    .push(Adjustment::multiply(first_row, key, 0, 0, factor).unwrap());
            }
            let array =
                AdjustedArray::new(column(&base), adjustments, Scalar::Float(f64::NAN)).unwrap();

            let mut cursor = array.traverse(window_length).unwrap();
            let mut anchor = window_length;
            while let Some(window) = cursor.next_window() {
                let got: Vec<f64> = window.as_float().unwrap().iter().copied().collect();
                let expected = reference_window(&base, &specs, anchor, window_length);
                for (g, e) in got.iter().zip(&expected) {
                    prop_assert!((g - e).abs() <= 1e-9 * e.abs().max(1.0));
                }
                anchor += 1;
            }
            prop_assert_eq!(anchor, nrows + 1);
        }

        #[test]
        fn prop_traversal_is_repeatable(
            base in proptest::collection::vec(-10.0f64..10.0, 2..12),
            delta in -5.0f64..5.0,
        ) {
            let mut adjustments = Adjustments::new();
            adjustments.insert(1, vec![Adjustment::add(0, 1, 0, 0, delta).unwrap()]);
            let array =
                AdjustedArray::new(column(&base), adjustments, Scalar::Float(f64::NAN)).unwrap();
            let first: Vec<ArrayData> = array.traverse(2).unwrap().collect();
            let second: Vec<ArrayData> = array.traverse(2).unwrap().collect();
            prop_assert_eq!(first, second);
        }
    }
}
