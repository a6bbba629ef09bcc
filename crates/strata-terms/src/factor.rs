//! Numeric terms.

use crate::classifier::Classifier;
use crate::error::{Result, TermError};
use crate::expr::{BinaryOp, UnaryOp};
use crate::filter::Filter;
use crate::stats::RankMethod;
use crate::term::{
    Role, Side, Term, TermBuilder, TermKind, Transform, binary_expression, expect_role,
    unary_expression,
};
use strata_adjusted::{DType, FloatKey, Scalar};

/// Right-hand side of a factor operator: another factor or a constant.
#[derive(Debug, Clone)]
pub enum Operand {
    /// Another factor
    Factor(Factor),
    /// A literal
    Const(f64),
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Self::Const(value)
    }
}

impl From<Factor> for Operand {
    fn from(value: Factor) -> Self {
        Self::Factor(value)
    }
}

impl From<&Factor> for Operand {
    fn from(value: &Factor) -> Self {
        Self::Factor(value.clone())
    }
}

/// Options for [`Factor::rank`].
#[derive(Debug, Clone)]
pub struct RankOptions {
    /// Tie handling (default ordinal)
    pub method: RankMethod,
    /// Smallest value ranks first (default true)
    pub ascending: bool,
    /// Only rank where this filter passes
    pub mask: Option<Filter>,
    /// Rank separately within each group
    pub groupby: Option<Classifier>,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            method: RankMethod::Ordinal,
            ascending: true,
            mask: None,
            groupby: None,
        }
    }
}

impl RankOptions {
    /// Largest value ranks first.
    pub const fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    /// Set the tie method.
    pub const fn method(mut self, method: RankMethod) -> Self {
        self.method = method;
        self
    }

    /// Restrict to a mask.
    pub fn mask(mut self, mask: &Filter) -> Self {
        self.mask = Some(mask.clone());
        self
    }

    /// Rank within groups.
    pub fn groupby(mut self, groupby: &Classifier) -> Self {
        self.groupby = Some(groupby.clone());
        self
    }
}

/// Mask and grouping for [`Factor::zscore`] and [`Factor::demean`].
#[derive(Debug, Clone, Default)]
pub struct GroupOptions {
    /// Only consider cells where this filter passes
    pub mask: Option<Filter>,
    /// Normalise separately within each group
    pub groupby: Option<Classifier>,
}

impl GroupOptions {
    /// Restrict to a mask.
    pub fn mask(mut self, mask: &Filter) -> Self {
        self.mask = Some(mask.clone());
        self
    }

    /// Normalise within groups.
    pub fn groupby(mut self, groupby: &Classifier) -> Self {
        self.groupby = Some(groupby.clone());
        self
    }
}

/// A term producing numbers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Factor(Term);

impl Factor {
    pub(crate) const fn wrap(term: Term) -> Self {
        Self(term)
    }

    /// Wrap a term, checking its role.
    pub fn try_from_term(term: Term) -> Result<Self> {
        expect_role(&term, Role::Factor)?;
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

    /// Same factor computed under a different mask.
    pub fn with_mask(&self, mask: &Filter) -> Result<Self> {
        self.0.with_mask(mask).map(Self)
    }

    fn arith(&self, op: BinaryOp, rhs: impl Into<Operand>) -> Result<Self> {
        let rhs = rhs.into();
        let side = match &rhs {
            Operand::Factor(f) => Side::Term(f.term()),
            Operand::Const(c) => Side::Const(*c),
        };
        binary_expression(op, Side::Term(&self.0), side).map(Self)
    }

    fn compare(&self, op: BinaryOp, rhs: impl Into<Operand>) -> Result<Filter> {
        let rhs = rhs.into();
        let side = match &rhs {
            Operand::Factor(f) => Side::Term(f.term()),
            Operand::Const(c) => Side::Const(*c),
        };
        binary_expression(op, Side::Term(&self.0), side).map(Filter::wrap)
    }

    fn unary(&self, op: UnaryOp) -> Result<Self> {
        unary_expression(op, &self.0).map(Self)
    }

    fn predicate(&self, op: UnaryOp) -> Result<Filter> {
        unary_expression(op, &self.0).map(Filter::wrap)
    }

    /// `self + rhs`
    pub fn add(&self, rhs: impl Into<Operand>) -> Result<Self> {
        self.arith(BinaryOp::Add, rhs)
    }

    /// `self - rhs`
    pub fn sub(&self, rhs: impl Into<Operand>) -> Result<Self> {
        self.arith(BinaryOp::Sub, rhs)
    }

    /// `self * rhs`
    pub fn mul(&self, rhs: impl Into<Operand>) -> Result<Self> {
        self.arith(BinaryOp::Mul, rhs)
    }

    /// `self / rhs`
    pub fn div(&self, rhs: impl Into<Operand>) -> Result<Self> {
        self.arith(BinaryOp::Div, rhs)
    }

    /// `self ^ rhs`
    pub fn pow(&self, rhs: impl Into<Operand>) -> Result<Self> {
        self.arith(BinaryOp::Pow, rhs)
    }

    /// `-self`
    pub fn neg(&self) -> Result<Self> {
        self.unary(UnaryOp::Neg)
    }

    /// `|self|`
    pub fn abs(&self) -> Result<Self> {
        self.unary(UnaryOp::Abs)
    }

    /// Natural log.
    pub fn log(&self) -> Result<Self> {
        self.unary(UnaryOp::Log)
    }

    /// `ln(1 + self)`
    pub fn log1p(&self) -> Result<Self> {
        self.unary(UnaryOp::Log1p)
    }

    /// `e^self`
    pub fn exp(&self) -> Result<Self> {
        self.unary(UnaryOp::Exp)
    }

    /// Square root.
    pub fn sqrt(&self) -> Result<Self> {
        self.unary(UnaryOp::Sqrt)
    }

    /// `self < rhs`
    pub fn lt(&self, rhs: impl Into<Operand>) -> Result<Filter> {
        self.compare(BinaryOp::Lt, rhs)
    }

    /// `self <= rhs`
    pub fn le(&self, rhs: impl Into<Operand>) -> Result<Filter> {
        self.compare(BinaryOp::Le, rhs)
    }

    /// `self > rhs`
    pub fn gt(&self, rhs: impl Into<Operand>) -> Result<Filter> {
        self.compare(BinaryOp::Gt, rhs)
    }

    /// `self >= rhs`
    pub fn ge(&self, rhs: impl Into<Operand>) -> Result<Filter> {
        self.compare(BinaryOp::Ge, rhs)
    }

    /// `self == rhs`
    pub fn equals(&self, rhs: impl Into<Operand>) -> Result<Filter> {
        self.compare(BinaryOp::Eq, rhs)
    }

    /// `self != rhs`
    pub fn not_equals(&self, rhs: impl Into<Operand>) -> Result<Filter> {
        self.compare(BinaryOp::Ne, rhs)
    }

    /// True where the value is NaN.
    pub fn isnan(&self) -> Result<Filter> {
        self.predicate(UnaryOp::IsNan)
    }

    /// True where the value is not NaN.
    pub fn notnan(&self) -> Result<Filter> {
        self.predicate(UnaryOp::NotNan)
    }

    /// True where the value is finite.
    pub fn isfinite(&self) -> Result<Filter> {
        self.predicate(UnaryOp::IsFinite)
    }

    fn null_check(&self, negate: bool) -> Result<Filter> {
        TermBuilder::new(TermKind::NullCheck { negate }, Role::Filter, DType::Bool)
            .inputs(vec![self.0.clone()])
            .window_safe(true)
            .build()
            .map(Filter::wrap)
    }

    /// True where the value equals the missing value.
    pub fn isnull(&self) -> Result<Filter> {
        self.null_check(false)
    }

    /// True where the value is present.
    pub fn notnull(&self) -> Result<Filter> {
        self.null_check(true)
    }

    /// Replace missing values with `value`.
    pub fn fillna(&self, value: Scalar) -> Result<Self> {
        value.expect_dtype(self.dtype())?;
        TermBuilder::new(TermKind::FillNa(value), Role::Factor, self.dtype())
            .missing(self.0.missing_value().clone())
            .inputs(vec![self.0.clone()])
            .inherit_window_safety()
            .build()
            .map(Self)
    }

    /// Most recent value (a window of one row).
    pub fn latest(&self) -> Result<Self> {
        TermBuilder::new(TermKind::Latest, Role::Factor, self.dtype())
            .missing(self.0.missing_value().clone())
            .window(1)
            .inputs(vec![self.0.clone()])
            .inherit_window_safety()
            .build()
            .map(Self)
    }

    /// Cross-sectional rank; masked-out and missing cells are NaN.
    pub fn rank(&self, options: RankOptions) -> Result<Self> {
        let mut inputs = vec![self.0.clone()];
        inputs.extend(options.groupby.as_ref().map(|g| g.term().clone()));
        let kind = TermKind::Rank {
            method: options.method,
            ascending: options.ascending,
            grouped: options.groupby.is_some(),
        };
        TermBuilder::new(kind, Role::Factor, DType::Float64)
            .inputs(inputs)
            .mask(options.mask.as_ref())
            .window_safe(true)
            .build()
            .map(Self)
    }

    fn transform(&self, kind: Transform, options: GroupOptions) -> Result<Self> {
        let mut inputs = vec![self.0.clone()];
        inputs.extend(options.groupby.as_ref().map(|g| g.term().clone()));
        let kind = TermKind::Transform {
            kind,
            grouped: options.groupby.is_some(),
        };
        TermBuilder::new(kind, Role::Factor, DType::Float64)
            .inputs(inputs)
            .mask(options.mask.as_ref())
            .window_safe(true)
            .build()
            .map(Self)
    }

    /// Cross-sectional z-score (population standard deviation).
    pub fn zscore(&self, options: GroupOptions) -> Result<Self> {
        self.transform(Transform::ZScore, options)
    }

    /// Subtract the cross-sectional mean.
    pub fn demean(&self, options: GroupOptions) -> Result<Self> {
        self.transform(Transform::Demean, options)
    }

    /// The `n` largest values per row.
    pub fn top(&self, n: usize, mask: Option<&Filter>) -> Result<Filter> {
        let mut options = RankOptions::default().descending();
        options.mask = mask.cloned();
        self.rank(options)?.le(n as f64)
    }

    /// The `n` smallest values per row.
    pub fn bottom(&self, n: usize, mask: Option<&Filter>) -> Result<Filter> {
        let options = RankOptions {
            mask: mask.cloned(),
            ..RankOptions::default()
        };
        self.rank(options)?.le(n as f64)
    }

    /// Values between the `min` and `max` row percentiles, inclusive.
    pub fn percentile_between(&self, min: f64, max: f64, mask: Option<&Filter>) -> Result<Filter> {
        if !(0.0..=100.0).contains(&min) || !(0.0..=100.0).contains(&max) || min > max {
            return Err(TermError::InvalidParameter {
                name: "percentile",
                reason: format!("expected 0 <= min <= max <= 100, got min={min}, max={max}"),
            });
        }
        let kind = TermKind::PercentileBetween {
            min: FloatKey::from(min),
            max: FloatKey::from(max),
        };
        TermBuilder::new(kind, Role::Filter, DType::Bool)
            .inputs(vec![self.0.clone()])
            .mask(mask)
            .window_safe(true)
            .build()
            .map(Filter::wrap)
    }

    /// Equal-count buckets labelled `0..bins`; `-1` where missing.
    pub fn quantiles(&self, bins: usize, mask: Option<&Filter>) -> Result<Classifier> {
        if bins == 0 {
            return Err(TermError::InvalidParameter {
                name: "bins",
                reason: "must be positive".to_string(),
            });
        }
        TermBuilder::new(TermKind::Quantiles { bins }, Role::Classifier, DType::Int64)
            .missing(Scalar::Int(-1))
            .inputs(vec![self.0.clone()])
            .mask(mask)
            .window_safe(true)
            .build()
            .map(Classifier::wrap)
    }

    /// Four buckets.
    pub fn quartiles(&self, mask: Option<&Filter>) -> Result<Classifier> {
        self.quantiles(4, mask)
    }

    /// Five buckets.
    pub fn quintiles(&self, mask: Option<&Filter>) -> Result<Classifier> {
        self.quantiles(5, mask)
    }

    /// Ten buckets.
    pub fn deciles(&self, mask: Option<&Filter>) -> Result<Classifier> {
        self.quantiles(10, mask)
    }
}

impl From<Factor> for Term {
    fn from(value: Factor) -> Self {
        value.0
    }
}
