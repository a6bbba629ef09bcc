#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/strata/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod adjustment;
pub mod array;
pub mod data;
pub mod dtype;
pub mod error;
pub mod label;
pub mod window;

// Re-export main types
pub use adjustment::{Adjustment, AdjustmentOp};
pub use array::{AdjustedArray, Adjustments, MergeMode};
pub use data::ArrayData;
pub use dtype::{DType, FloatKey, NAT, Scalar};
pub use error::{ArrayError, Result};
pub use label::{LabelArray, LabelView, MISSING_CODE};
pub use window::{AdjustedArrayWindow, WindowView};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
