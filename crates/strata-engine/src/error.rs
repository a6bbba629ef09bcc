//! Error types for planning and running pipelines.

use chrono::NaiveDate;
use strata_adjusted::ArrayError;
use strata_output::ExportError;
use strata_terms::{ComputeError, TermError};
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures reported by a [`PipelineLoader`](crate::PipelineLoader).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// The source holds no data for a column
    #[error("No data available for {column}")]
    NoData {
        /// Qualified column name
        column: String,
    },

    /// The source could not be read
    #[error("Failed to load {columns:?}: {message}")]
    Source {
        /// Qualified names of the requested columns
        columns: Vec<String>,
        /// Underlying failure
        message: String,
    },

    /// The loader returned a buffer of the wrong shape
    #[error("Loader returned shape {actual:?} for {column}, expected {expected:?}")]
    Shape {
        /// Qualified column name
        column: String,
        /// Requested (dates, assets)
        expected: (usize, usize),
        /// Returned (rows, columns)
        actual: (usize, usize),
    },

    /// The loader filled gaps with a different missing value than the column declares
    #[error("Loader used missing value {actual} for {column}, expected {expected}")]
    MissingValue {
        /// Qualified column name
        column: String,
        /// Declared missing value
        expected: String,
        /// Returned missing value
        actual: String,
    },

    /// Array-level error while building a buffer
    #[error(transparent)]
    Array(#[from] ArrayError),
}

/// Errors raised while planning or running a pipeline.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No loader is registered for a column's dataset
    #[error("No loader registered for {column}")]
    UnregisteredColumn {
        /// Qualified column name
        column: String,
    },

    /// Start date after end date
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Requested start
        start: NaiveDate,
        /// Requested end
        end: NaiveDate,
    },

    /// Date not covered by the domain's calendar
    #[error("{date} is outside calendar {calendar}")]
    DateOutsideCalendar {
        /// Offending date
        date: NaiveDate,
        /// Calendar name
        calendar: String,
    },

    /// The pipeline domain has no trading calendar
    #[error("Domain {0} has no trading calendar")]
    NoCalendar(String),

    /// Not enough sessions before the start date
    #[error("{term} needs {extra_rows} sessions of history before the start date, only {available} exist")]
    InsufficientHistory {
        /// Term display form
        term: String,
        /// Sessions required
        extra_rows: usize,
        /// Sessions available
        available: usize,
    },

    /// The dependency graph contains a cycle
    #[error("Cyclic dependency: {}", chain.join(" -> "))]
    CyclicDependency {
        /// Nodes along the cycle, starting and ending with the same node
        chain: Vec<String>,
    },

    /// A term was scheduled before one of its dependencies was available
    #[error("{term} was evaluated before its dependency {dependency}")]
    MissingDependency {
        /// Term being computed
        term: String,
        /// Dependency not in the workspace
        dependency: String,
    },

    /// Output name used twice
    #[error("Pipeline already has a column named {0}")]
    DuplicateColumn(String),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Loader failure
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Term construction error
    #[error(transparent)]
    Term(#[from] TermError),

    /// Term computation error
    #[error(transparent)]
    Compute(#[from] ComputeError),

    /// Array-level error
    #[error(transparent)]
    Array(#[from] ArrayError),

    /// Result assembly error
    #[error(transparent)]
    Output(#[from] ExportError),

    /// The run was cancelled
    #[error("Pipeline cancelled after {completed_chunks} chunks")]
    Cancelled {
        /// Chunks completed before cancellation
        completed_chunks: usize,
    },
}
