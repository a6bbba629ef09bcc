//! User-defined trailing-window kernels.
//!
//! A [`CustomKernel`] sees, for every output row, one window per input
//! restricted to the assets that pass the term's mask, and returns one value
//! per such asset. Two kernels of the same Rust type with the same name,
//! parameters and dtype are treated as the same computation when terms are
//! deduplicated.

use crate::error::{KernelError, Result, TermError};
use crate::filter::Filter;
use crate::sid::Sid;
use crate::term::{AnyTerm, Role, Term, TermBuilder, TermKind};
use chrono::NaiveDate;
use std::any::{Any, TypeId};
use std::fmt::Debug;
use std::sync::Arc;
use strata_adjusted::{ArrayData, DType, Scalar};

/// Where a kernel invocation sits.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    /// Output session
    pub date: NaiveDate,
    /// Assets passing the mask on `date`, in column order of the windows
    pub sids: &'a [Sid],
}

/// One output row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Float outputs
    Float64(Vec<f64>),
    /// Integer outputs
    Int64(Vec<i64>),
    /// Boolean outputs
    Bool(Vec<bool>),
}

impl RowValues {
    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    /// True if there are no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dtype of the values.
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Float64(_) => DType::Float64,
            Self::Int64(_) => DType::Int64,
            Self::Bool(_) => DType::Bool,
        }
    }
}

/// A computation over trailing windows of its inputs.
///
/// Identity is the concrete kernel type plus [`name`](Self::name),
/// [`params`](Self::params) and [`dtype`](Self::dtype). Kernels whose state
/// changes the result must expose that state through `params`.
pub trait CustomKernel: Any + Debug + Send + Sync {
    /// Kernel name, used for display and identity.
    fn name(&self) -> &str;

    /// Parameters distinguishing otherwise identical kernels.
    fn params(&self) -> Vec<Scalar> {
        Vec::new()
    }

    /// Output dtype.
    fn dtype(&self) -> DType {
        DType::Float64
    }

    /// Output missing value; `None` uses the dtype default.
    fn missing_value(&self) -> Option<Scalar> {
        None
    }

    /// True if the output does not change when input history is restated.
    fn window_safe(&self) -> bool {
        false
    }

    /// Compute one row. `windows[i]` is `window_length x ctx.sids.len()`.
    fn compute(
        &self,
        ctx: &RowContext<'_>,
        windows: &[ArrayData],
    ) -> std::result::Result<RowValues, KernelError>;
}

/// Concrete type of a kernel behind a trait object.
pub(crate) fn kernel_type(kernel: &Arc<dyn CustomKernel>) -> TypeId {
    let any: &dyn Any = kernel.as_ref();
    Any::type_id(any)
}

/// Term running `kernel` over `inputs` with a trailing window.
///
/// Boolean kernels produce filters, numeric kernels factors. Terms built from
/// kernels of one type with equal name, params and dtype are deduplicated.
pub fn custom_term(
    kernel: Arc<dyn CustomKernel>,
    inputs: Vec<Term>,
    window_length: usize,
    mask: Option<&Filter>,
) -> Result<AnyTerm> {
    let dtype = kernel.dtype();
    let role = match dtype {
        DType::Categorical => {
            return Err(TermError::UnsupportedOperation {
                op: "custom kernel",
                dtype,
            });
        }
        other => Role::for_dtype(other),
    };
    let missing = kernel.missing_value();
    let window_safe = kernel.window_safe();
    let mut builder = TermBuilder::new(TermKind::Custom(kernel), role, dtype)
        .window(window_length)
        .inputs(inputs)
        .mask(mask)
        .window_safe(window_safe);
    if let Some(missing) = missing {
        builder = builder.missing(missing);
    }
    builder.build().map(AnyTerm::from_term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::equity_pricing;

    #[derive(Debug)]
    struct MeanOfAll(f64);

    impl CustomKernel for MeanOfAll {
        fn name(&self) -> &str {
            "MeanOfAll"
        }

        fn params(&self) -> Vec<Scalar> {
            vec![Scalar::Float(self.0)]
        }

        fn compute(
            &self,
            ctx: &RowContext<'_>,
            _windows: &[ArrayData],
        ) -> std::result::Result<RowValues, KernelError> {
            Ok(RowValues::Float64(vec![self.0; ctx.sids.len()]))
        }
    }

    /// Same name and params as [`MeanOfAll`], different computation.
    #[derive(Debug)]
    struct Impostor(f64);

    impl CustomKernel for Impostor {
        fn name(&self) -> &str {
            "MeanOfAll"
        }

        fn params(&self) -> Vec<Scalar> {
            vec![Scalar::Float(self.0)]
        }

        fn compute(
            &self,
            ctx: &RowContext<'_>,
            _windows: &[ArrayData],
        ) -> std::result::Result<RowValues, KernelError> {
            Ok(RowValues::Float64(vec![-self.0; ctx.sids.len()]))
        }
    }

    #[derive(Debug)]
    struct Sector;

    impl CustomKernel for Sector {
        fn name(&self) -> &str {
            "Sector"
        }

        fn dtype(&self) -> DType {
            DType::Categorical
        }

        fn compute(
            &self,
            _ctx: &RowContext<'_>,
            _windows: &[ArrayData],
        ) -> std::result::Result<RowValues, KernelError> {
            Err(KernelError::new("unused"))
        }
    }

    fn close() -> Term {
        equity_pricing().column("close").unwrap().term()
    }

    #[test]
    fn test_kernels_of_different_types_stay_distinct() {
        let mean = custom_term(Arc::new(MeanOfAll(1.0)), vec![close()], 3, None).unwrap();
        let impostor = custom_term(Arc::new(Impostor(1.0)), vec![close()], 3, None).unwrap();
        assert_ne!(mean, impostor);
        assert_ne!(mean.term().fingerprint(), impostor.term().fingerprint());
    }

    #[test]
    fn test_custom_identity_by_name_and_params() {
        let a = custom_term(Arc::new(MeanOfAll(1.0)), vec![close()], 3, None).unwrap();
        let b = custom_term(Arc::new(MeanOfAll(1.0)), vec![close()], 3, None).unwrap();
        let c = custom_term(Arc::new(MeanOfAll(2.0)), vec![close()], 3, None).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.role(), Role::Factor);
        assert!(!a.term().window_safe());
        assert_eq!(a.term().to_string(), "MeanOfAll(EquityPricing.close, window_length=3)");
    }

    #[test]
    fn test_custom_needs_window() {
        let err = custom_term(Arc::new(MeanOfAll(1.0)), vec![close()], 0, None).unwrap_err();
        assert!(matches!(err, TermError::InvalidWindowLength { minimum: 1, .. }));
    }

    #[test]
    fn test_categorical_kernels_rejected() {
        let err = custom_term(Arc::new(Sector), vec![close()], 1, None).unwrap_err();
        assert!(matches!(err, TermError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_row_values() {
        let row = RowValues::Bool(vec![true, false]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.dtype(), DType::Bool);
        assert!(RowValues::Int64(Vec::new()).is_empty());
    }
}
