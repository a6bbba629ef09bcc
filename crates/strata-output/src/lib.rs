#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/strata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod export;
pub mod result;
pub mod summary;

// Re-export main types
pub use export::{ExportError, ExportFormat, Exporter};
pub use result::{ColumnValues, PipelineResult};
pub use summary::{ColumnSummary, summarize, to_ascii_table};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
