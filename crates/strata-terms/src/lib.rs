#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/strata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builtins;
pub mod calendar;
pub mod classifier;
pub mod compute;
pub mod custom;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod expr;
pub mod factor;
pub mod filter;
pub mod sid;
pub mod stats;
pub mod term;

// Re-export main types
pub use builtins::WindowKernel;
pub use calendar::TradingCalendar;
pub use classifier::Classifier;
pub use compute::{ComputeContext, TermInput, evaluate};
pub use custom::{CustomKernel, RowContext, RowValues, custom_term};
pub use dataset::{BoundColumn, ColumnSpec, DataSet, SchemaRegistry, equity_pricing};
pub use domain::Domain;
pub use error::{ComputeError, KernelError, Result, TermError};
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use factor::{Factor, GroupOptions, Operand, RankOptions};
pub use filter::Filter;
pub use sid::Sid;
pub use stats::RankMethod;
pub use term::{AnyTerm, ClassifierOp, Role, Term, TermKind, Transform};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
