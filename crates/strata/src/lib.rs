#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/strata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod prelude;
pub mod telemetry;

// Re-export main types from sub-crates
pub use strata_adjusted as adjusted;
pub use strata_engine as engine;
pub use strata_output as output;
pub use strata_terms as terms;

pub use telemetry::{TelemetryError, init_logging};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
