//! Error types for adjusted array operations.

use crate::dtype::DType;
use thiserror::Error;

/// Result type for adjusted array operations.
pub type Result<T> = std::result::Result<T, ArrayError>;

/// Errors raised while building, adjusting or windowing arrays.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArrayError {
    /// Adjustment bounds are inverted
    #[error(
        "Invalid adjustment bounds: rows {first_row}..={last_row}, columns {first_col}..={last_col}"
    )]
    InvalidAdjustmentBounds {
        /// First adjusted row
        first_row: usize,
        /// Last adjusted row
        last_row: usize,
        /// First adjusted column
        first_col: usize,
        /// Last adjusted column
        last_col: usize,
    },

    /// Adjustment reaches outside the buffer
    #[error("Adjustment keyed at row {key} is out of bounds for a {nrows}x{ncols} buffer")]
    AdjustmentOutOfBounds {
        /// Row key the adjustment was registered under
        key: usize,
        /// Buffer rows
        nrows: usize,
        /// Buffer columns
        ncols: usize,
    },

    /// Per-row overwrite values do not match the adjusted row count
    #[error("Row overwrite carries {actual} values for {expected} rows")]
    RowValueCount {
        /// Rows covered by the adjustment
        expected: usize,
        /// Values supplied
        actual: usize,
    },

    /// Adjustment operation is not defined for the buffer dtype
    #[error("{op} adjustment cannot be applied to {dtype} data")]
    IncompatibleAdjustment {
        /// Operation name
        op: &'static str,
        /// Buffer dtype
        dtype: DType,
    },

    /// Integer buffers only take whole-number arithmetic
    #[error("{op} adjustment by {value} cannot be applied to int64 data")]
    NonIntegralAdjustment {
        /// Operation name
        op: &'static str,
        /// Offending operand
        value: f64,
    },

    /// Scalar does not match the expected dtype
    #[error("Expected a {expected} value, got {actual}")]
    DTypeMismatch {
        /// Expected dtype
        expected: DType,
        /// Actual dtype (or description)
        actual: String,
    },

    /// Window length of zero
    #[error("Window length must be positive")]
    WindowLengthNotPositive,

    /// Window does not fit in the buffer
    #[error(
        "Window length {window_length} with offset {offset} exceeds the {nrows} available rows"
    )]
    WindowLengthTooLong {
        /// Requested window length
        window_length: usize,
        /// Requested offset
        offset: usize,
        /// Rows in the buffer
        nrows: usize,
    },

    /// Cannot seek backwards on a forward-only window
    #[error("Cannot seek window from anchor {current} back to {target}")]
    SeekBackwards {
        /// Current anchor
        current: usize,
        /// Requested anchor
        target: usize,
    },

    /// Shapes disagree
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected (rows, columns)
        expected: (usize, usize),
        /// Actual (rows, columns)
        actual: (usize, usize),
    },

    /// Categorical code has no dictionary entry
    #[error("Category code {code} is out of range for a dictionary of {len} entries")]
    InvalidCategoryCode {
        /// Offending code
        code: u32,
        /// Dictionary size (including the missing slot)
        len: usize,
    },

    /// Dtype has no default missing value and none was supplied
    #[error("No default missing value for {0}; one must be supplied")]
    NoDefaultMissingValue(DType),
}
