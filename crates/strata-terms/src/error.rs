//! Error types for term construction and computation.

use crate::term::Role;
use strata_adjusted::{ArrayError, DType};
use thiserror::Error;

/// Result type for term construction.
pub type Result<T> = std::result::Result<T, TermError>;

/// Errors raised while building terms, schemas or domains.
///
/// All of these are configuration errors: they surface before any data is
/// loaded.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TermError {
    /// Role does not accept the dtype
    #[error("{role} terms cannot have dtype {dtype}")]
    InvalidDType {
        /// Term role
        role: Role,
        /// Offending dtype
        dtype: DType,
    },

    /// Missing value does not match the term dtype
    #[error("Missing value {value} is not a valid {dtype} for {term}")]
    MissingValueDType {
        /// Term display form
        term: String,
        /// Term dtype
        dtype: DType,
        /// Offending missing value
        value: String,
    },

    /// Dtype has no default missing value and none was supplied
    #[error("{term} has dtype {dtype}, which requires an explicit missing value")]
    NoDefaultMissingValue {
        /// Term display form
        term: String,
        /// Term dtype
        dtype: DType,
    },

    /// Window length below the minimum for the term
    #[error("{term} requires window_length >= {minimum}, got {window_length}")]
    InvalidWindowLength {
        /// Term display form
        term: String,
        /// Requested window length
        window_length: usize,
        /// Minimum accepted window length
        minimum: usize,
    },

    /// A windowed term consumes an input whose values change under adjustment
    #[error("{parent} cannot use {child} as a windowed input because it is not window-safe")]
    NonWindowSafeInput {
        /// Consuming term
        parent: String,
        /// Offending input
        child: String,
    },

    /// Mask is not a boolean filter
    #[error("Mask of {term} must be a Filter, got {mask}")]
    MaskNotFilter {
        /// Term display form
        term: String,
        /// Offending mask
        mask: String,
    },

    /// More than one specialised domain among a term's inputs
    #[error("Cannot unify domains {codes:?}")]
    AmbiguousDomain {
        /// Codes of the conflicting domains
        codes: Vec<String>,
    },

    /// Term has a different role than required
    #[error("Expected a {expected}, got {actual} {term}")]
    RoleMismatch {
        /// Required role
        expected: Role,
        /// Actual role
        actual: Role,
        /// Term display form
        term: String,
    },

    /// Operation is not defined for the term dtype
    #[error("{op} is not supported for {dtype} terms")]
    UnsupportedOperation {
        /// Operation name
        op: &'static str,
        /// Term dtype
        dtype: DType,
    },

    /// Parameter outside its valid range
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// Dataset has no such column
    #[error("Dataset {dataset} has no column {column}")]
    UnknownColumn {
        /// Dataset name
        dataset: String,
        /// Column name
        column: String,
    },

    /// No dataset registered under a name
    #[error("Unknown dataset: {0}")]
    UnknownDataSet(String),

    /// Column declared twice in one dataset
    #[error("Dataset {dataset} declares column {column} twice")]
    DuplicateColumn {
        /// Dataset name
        dataset: String,
        /// Column name
        column: String,
    },

    /// Dataset registered twice
    #[error("Dataset {0} is already registered")]
    DuplicateDataSet(String),

    /// Array-level error
    #[error(transparent)]
    Array(#[from] ArrayError),
}

/// Errors raised while computing a term over a chunk of data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ComputeError {
    /// Term is loaded, not computed
    #[error("{term} is loadable and cannot be computed")]
    NotComputable {
        /// Term display form
        term: String,
    },

    /// Wrong number of inputs supplied
    #[error("{term} expects {expected} inputs, got {actual}")]
    InputCount {
        /// Term display form
        term: String,
        /// Declared inputs
        expected: usize,
        /// Supplied inputs
        actual: usize,
    },

    /// Input supplied in the wrong form or dtype
    #[error("Input {index} of {term} must be {expected}")]
    InputKind {
        /// Term display form
        term: String,
        /// Input position
        index: usize,
        /// What was expected
        expected: &'static str,
    },

    /// A window traversal ended before the last output row
    #[error("Window for input {index} of {term} ended at output row {row}")]
    WindowExhausted {
        /// Term display form
        term: String,
        /// Input position
        index: usize,
        /// Output row being computed
        row: usize,
    },

    /// Output shape does not match the requested rows and assets
    #[error("{term} produced shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        /// Term display form
        term: String,
        /// Expected (rows, assets)
        expected: (usize, usize),
        /// Actual (rows, assets)
        actual: (usize, usize),
    },

    /// A kernel rejected its input
    #[error("{term} failed: {message}")]
    Kernel {
        /// Term display form
        term: String,
        /// Kernel message
        message: String,
    },

    /// Array-level error
    #[error(transparent)]
    Array(#[from] ArrayError),
}

/// Failure reported by a custom kernel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct KernelError(pub String);

impl KernelError {
    /// Error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
