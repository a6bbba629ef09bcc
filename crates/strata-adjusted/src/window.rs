//! Forward-only rolling windows over an adjusted buffer.

use crate::adjustment::Adjustment;
use crate::data::ArrayData;
use crate::dtype::DType;
use crate::label::LabelView;
use ndarray::{ArrayView2, s};

/// Borrowed view of one window.
#[derive(Debug, Clone, Copy)]
pub enum WindowView<'a> {
    /// Float window
    Float64(ArrayView2<'a, f64>),
    /// Integer window
    Int64(ArrayView2<'a, i64>),
    /// Boolean window
    Bool(ArrayView2<'a, bool>),
    /// Timestamp window
    Datetime(ArrayView2<'a, i64>),
    /// Categorical window
    Categorical(LabelView<'a>),
}

impl<'a> WindowView<'a> {
    fn rows(data: &'a ArrayData, start: usize, end: usize) -> Self {
        match data {
            ArrayData::Float64(a) => Self::Float64(a.slice(s![start..end, ..])),
            ArrayData::Int64(a) => Self::Int64(a.slice(s![start..end, ..])),
            ArrayData::Bool(a) => Self::Bool(a.slice(s![start..end, ..])),
            ArrayData::Datetime(a) => Self::Datetime(a.slice(s![start..end, ..])),
            ArrayData::Categorical(a) => Self::Categorical(a.view().slice_rows(start, end)),
        }
    }

    /// View dtype.
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

    /// Float view, if this is one.
    pub const fn as_float(&self) -> Option<&ArrayView2<'a, f64>> {
        match self {
            Self::Float64(a) => Some(a),
            _ => None,
        }
    }

    /// Owned copy.
    pub fn to_data(&self) -> ArrayData {
        match self {
            Self::Float64(a) => ArrayData::Float64(a.to_owned()),
            Self::Int64(a) => ArrayData::Int64(a.to_owned()),
            Self::Bool(a) => ArrayData::Bool(a.to_owned()),
            Self::Datetime(a) => ArrayData::Datetime(a.to_owned()),
            Self::Categorical(a) => ArrayData::Categorical(a.to_array()),
        }
    }

    /// Owned copy restricted to `cols`.
    pub fn select_columns(&self, cols: &[usize]) -> ArrayData {
        use ndarray::Axis;
        match self {
            Self::Float64(a) => ArrayData::Float64(a.select(Axis(1), cols)),
            Self::Int64(a) => ArrayData::Int64(a.select(Axis(1), cols)),
            Self::Bool(a) => ArrayData::Bool(a.select(Axis(1), cols)),
            Self::Datetime(a) => ArrayData::Datetime(a.select(Axis(1), cols)),
            Self::Categorical(a) => ArrayData::Categorical(a.select_columns(cols)),
        }
    }
}

/// Single-pass cursor over trailing windows of an adjusted buffer.
///
/// The cursor owns a private copy of the buffer, so traversals of the same
/// [`crate::AdjustedArray`] never see each other's adjustments.
#[derive(Debug, Clone)]
pub struct AdjustedArrayWindow {
    data: ArrayData,
    adjustments: Vec<(usize, Adjustment)>,
    next_adjustment: usize,
    window_length: usize,
    anchor: usize,
    perspective_offset: usize,
}

impl AdjustedArrayWindow {
    pub(crate) fn new(
        data: ArrayData,
        adjustments: Vec<(usize, Adjustment)>,
        window_length: usize,
        offset: usize,
        perspective_offset: usize,
    ) -> Self {
        Self {
            data,
            adjustments,
            next_adjustment: 0,
            window_length,
            anchor: offset + window_length,
            perspective_offset,
        }
    }

    /// Rows per window.
    pub const fn window_length(&self) -> usize {
        self.window_length
    }

    /// Exclusive end row of the next window.
    pub const fn anchor(&self) -> usize {
        self.anchor
    }

    /// Dtype of the underlying buffer.
    pub const fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Columns per window.
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    /// Windows left to yield.
    pub fn remaining(&self) -> usize {
        (self.data.nrows() + 1).saturating_sub(self.anchor)
    }

    /// Move the anchor forward to `anchor` without yielding the skipped windows.
    pub fn seek(&mut self, anchor: usize) -> crate::Result<()> {
        if anchor < self.anchor {
            return Err(crate::ArrayError::SeekBackwards {
                current: self.anchor,
                target: anchor,
            });
        }
        self.anchor = anchor;
        Ok(())
    }

    /// Next window, borrowed from the cursor's buffer.
    pub fn next_window(&mut self) -> Option<WindowView<'_>> {
        if self.anchor > self.data.nrows() {
            return None;
        }
        let horizon = self.anchor + self.perspective_offset;
        while let Some((key, adjustment)) = self.adjustments.get(self.next_adjustment) {
            if *key >= horizon {
                break;
            }
            adjustment.apply(&mut self.data);
            self.next_adjustment += 1;
        }
        let start = self.anchor - self.window_length;
        let end = self.anchor;
        self.anchor += 1;
        Some(WindowView::rows(&self.data, start, end))
    }
}

impl Iterator for AdjustedArrayWindow {
    type Item = ArrayData;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_window().map(|window| window.to_data())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for AdjustedArrayWindow {}
