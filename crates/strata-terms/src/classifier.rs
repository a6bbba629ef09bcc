//! Categorical terms.

use crate::error::{Result, TermError};
use crate::filter::Filter;
use crate::term::{ClassifierOp, Role, Term, TermBuilder, TermKind, expect_role};
use strata_adjusted::{DType, Scalar};

/// A term assigning each asset a label or an integer group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Classifier(Term);

impl Classifier {
    pub(crate) const fn wrap(term: Term) -> Self {
        Self(term)
    }

    /// Wrap a term, checking its role.
    pub fn try_from_term(term: Term) -> Result<Self> {
        expect_role(&term, Role::Classifier)?;
        Ok(Self(term))
    }

    /// Underlying term.
    pub const fn term(&self) -> &Term {
        &self.0
    }

    /// Consume into the underlying term.
    pub fn into_term(self) -> Term {
        self.0
    }

    /// Output dtype.
    pub fn dtype(&self) -> DType {
        self.0.dtype()
    }

    fn require(&self, op: &'static str, dtype: DType) -> Result<()> {
        if self.dtype() == dtype {
            Ok(())
        } else {
            Err(TermError::UnsupportedOperation {
                op,
                dtype: self.dtype(),
            })
        }
    }

    fn predicate(&self, op: ClassifierOp) -> Result<Filter> {
        TermBuilder::new(TermKind::LabelPredicate(op), Role::Filter, DType::Bool)
            .inputs(vec![self.0.clone()])
            .window_safe(true)
            .build()
            .map(Filter::wrap)
    }

    /// True where the label equals `label`.
    pub fn eq_label(&self, label: &str) -> Result<Filter> {
        self.require("eq_label", DType::Categorical)?;
        self.predicate(ClassifierOp::Eq(Scalar::Label(Some(label.to_string()))))
    }

    /// True where the label is present and differs from `label`.
    pub fn ne_label(&self, label: &str) -> Result<Filter> {
        self.require("ne_label", DType::Categorical)?;
        self.predicate(ClassifierOp::Ne(Scalar::Label(Some(label.to_string()))))
    }

    /// True where the group equals `value`.
    pub fn eq_int(&self, value: i64) -> Result<Filter> {
        self.require("eq_int", DType::Int64)?;
        self.predicate(ClassifierOp::Eq(Scalar::Int(value)))
    }

    /// True where the group is present and differs from `value`.
    pub fn ne_int(&self, value: i64) -> Result<Filter> {
        self.require("ne_int", DType::Int64)?;
        self.predicate(ClassifierOp::Ne(Scalar::Int(value)))
    }

    /// True where the label is one of `labels`.
    pub fn is_in<S: AsRef<str>>(&self, labels: &[S]) -> Result<Filter> {
        self.require("is_in", DType::Categorical)?;
        let values = labels
            .iter()
            .map(|l| Scalar::Label(Some(l.as_ref().to_string())))
            .collect();
        self.predicate(ClassifierOp::IsIn(values))
    }

    /// True where the group is one of `values`.
    pub fn is_in_ints(&self, values: &[i64]) -> Result<Filter> {
        self.require("is_in_ints", DType::Int64)?;
        self.predicate(ClassifierOp::IsIn(values.iter().copied().map(Scalar::Int).collect()))
    }

    /// True where the label starts with `prefix`.
    pub fn starts_with(&self, prefix: &str) -> Result<Filter> {
        self.require("starts_with", DType::Categorical)?;
        self.predicate(ClassifierOp::StartsWith(prefix.to_string()))
    }

    /// True where the label ends with `suffix`.
    pub fn ends_with(&self, suffix: &str) -> Result<Filter> {
        self.require("ends_with", DType::Categorical)?;
        self.predicate(ClassifierOp::EndsWith(suffix.to_string()))
    }

    /// True where the label contains `needle`.
    pub fn contains(&self, needle: &str) -> Result<Filter> {
        self.require("contains", DType::Categorical)?;
        self.predicate(ClassifierOp::Contains(needle.to_string()))
    }

    fn null_check(&self, negate: bool) -> Result<Filter> {
        TermBuilder::new(TermKind::NullCheck { negate }, Role::Filter, DType::Bool)
            .inputs(vec![self.0.clone()])
            .window_safe(true)
            .build()
            .map(Filter::wrap)
    }

    /// True where the value is missing.
    pub fn isnull(&self) -> Result<Filter> {
        self.null_check(false)
    }

    /// True where the value is present.
    pub fn notnull(&self) -> Result<Filter> {
        self.null_check(true)
    }
}

impl From<Classifier> for Term {
    fn from(value: Classifier) -> Self {
        value.0
    }
}
