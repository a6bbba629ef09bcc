//! Term nodes.
//!
//! A [`Term`] is a cheap, cloneable handle to an immutable node. Two terms
//! are equal when they are structurally identical, which is what lets the
//! graph builder hash-cons them into a single node. Each node carries a
//! precomputed fingerprint so equality and hashing do not walk the whole
//! subtree on every lookup.

use crate::builtins::WindowKernel;
use crate::classifier::Classifier;
use crate::custom::{CustomKernel, kernel_type};
use crate::dataset::BoundColumn;
use crate::domain::Domain;
use crate::error::{Result, TermError};
use crate::expr::{BinaryOp, Expr, MAX_EXPRESSION_INPUTS, UnaryOp, merge_inputs};
use crate::factor::Factor;
use crate::filter::Filter;
use crate::sid::Sid;
use crate::stats::RankMethod;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use strata_adjusted::{DType, FloatKey, Scalar};

/// The capability set a term belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Numeric values
    Factor,
    /// Boolean values
    Filter,
    /// Categorical values
    Classifier,
}

impl Role {
    /// True if terms of this role may hold `dtype`.
    pub const fn accepts(self, dtype: DType) -> bool {
        match self {
            Self::Factor => matches!(dtype, DType::Float64 | DType::Int64 | DType::Datetime),
            Self::Filter => matches!(dtype, DType::Bool),
            Self::Classifier => matches!(dtype, DType::Int64 | DType::Categorical),
        }
    }

    /// Natural role for a dataset column of `dtype`.
    pub const fn for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::Bool => Self::Filter,
            DType::Categorical => Self::Classifier,
            DType::Float64 | DType::Int64 | DType::Datetime => Self::Factor,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Factor => "Factor",
            Self::Filter => "Filter",
            Self::Classifier => "Classifier",
        })
    }
}

/// Row-wise normalisations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    /// Subtract the row mean
    Demean,
    /// Subtract the row mean and divide by the row standard deviation
    ZScore,
}

/// Predicates a classifier can be tested with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClassifierOp {
    /// Equal to a label or integer
    Eq(Scalar),
    /// Present and different from a label or integer
    Ne(Scalar),
    /// One of several labels or integers
    IsIn(Vec<Scalar>),
    /// Label starts with a prefix
    StartsWith(String),
    /// Label ends with a suffix
    EndsWith(String),
    /// Label contains a substring
    Contains(String),
}

/// What a term computes.
#[derive(Debug, Clone)]
pub enum TermKind {
    /// Whether each asset is alive on each date; the root mask
    AssetExists,
    /// A loadable dataset column
    Column(BoundColumn),
    /// The same value everywhere
    Constant(Scalar),
    /// Most recent value of the single input
    Latest,
    /// Elementwise expression over the inputs
    Expression(Expr),
    /// Built-in trailing-window kernel
    Window(WindowKernel),
    /// User-defined trailing-window kernel
    Custom(Arc<dyn CustomKernel>),
    /// Cross-sectional rank; a second input is the grouping classifier
    Rank {
        /// Tie handling
        method: RankMethod,
        /// Smallest value gets rank 1
        ascending: bool,
        /// Ranked within groups
        grouped: bool,
    },
    /// Cross-sectional normalisation; a second input is the grouping classifier
    Transform {
        /// Which normalisation
        kind: Transform,
        /// Normalised within groups
        grouped: bool,
    },
    /// Equal-count buckets, `-1` where missing
    Quantiles {
        /// Bucket count
        bins: usize,
    },
    /// Values between two row percentiles (inclusive)
    PercentileBetween {
        /// Lower percentile, 0..=100
        min: FloatKey,
        /// Upper percentile, 0..=100
        max: FloatKey,
    },
    /// Whether the input holds its missing value
    NullCheck {
        /// `notnull` rather than `isnull`
        negate: bool,
    },
    /// Input with missing values replaced
    FillNa(Scalar),
    /// Fixed set of assets
    StaticAssets(BTreeSet<Sid>),
    /// Classifier predicate
    LabelPredicate(ClassifierOp),
}

impl TermKind {
    /// Short name used in display forms.
    pub fn name(&self) -> &str {
        match self {
            Self::AssetExists => "AssetExists",
            Self::Column(_) => "Column",
            Self::Constant(_) => "Constant",
            Self::Latest => "Latest",
            Self::Expression(_) => "Expression",
            Self::Window(kernel) => kernel.name(),
            Self::Custom(kernel) => kernel.name(),
            Self::Rank { .. } => "Rank",
            Self::Transform {
                kind: Transform::Demean,
                ..
            } => "Demean",
            Self::Transform {
                kind: Transform::ZScore,
                ..
            } => "ZScore",
            Self::Quantiles { .. } => "Quantiles",
            Self::PercentileBetween { .. } => "PercentileBetween",
            Self::NullCheck { negate: false } => "IsNull",
            Self::NullCheck { negate: true } => "NotNull",
            Self::FillNa(_) => "FillNa",
            Self::StaticAssets(_) => "StaticAssets",
            Self::LabelPredicate(_) => "LabelPredicate",
        }
    }

    /// True for terms supplied by a loader rather than computed.
    pub const fn is_loadable(&self) -> bool {
        matches!(self, Self::Column(_) | Self::AssetExists)
    }

    /// True for terms whose output for one asset depends on the other assets
    /// in the row (or, for custom kernels, may depend on them).
    pub const fn is_cross_sectional(&self) -> bool {
        matches!(
            self,
            Self::Rank { .. }
                | Self::Transform { .. }
                | Self::Quantiles { .. }
                | Self::PercentileBetween { .. }
                | Self::Custom(_)
        )
    }

    fn minimum_window(&self) -> Option<usize> {
        match self {
            Self::Window(kernel) => Some(kernel.minimum_window()),
            Self::Custom(_) | Self::Latest => Some(1),
            _ => None,
        }
    }
}

impl PartialEq for TermKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::AssetExists, Self::AssetExists) | (Self::Latest, Self::Latest) => true,
            (Self::Column(a), Self::Column(b)) => a == b,
            (Self::Constant(a), Self::Constant(b)) | (Self::FillNa(a), Self::FillNa(b)) => a == b,
            (Self::Expression(a), Self::Expression(b)) => a == b,
            (Self::Window(a), Self::Window(b)) => a == b,
            (Self::Custom(a), Self::Custom(b)) => {
                Arc::ptr_eq(a, b)
                    || (kernel_type(a) == kernel_type(b)
                        && a.name() == b.name()
                        && a.params() == b.params()
                        && a.dtype() == b.dtype())
            }
            (
                Self::Rank {
                    method: m1,
                    ascending: a1,
                    grouped: g1,
                },
                Self::Rank {
                    method: m2,
                    ascending: a2,
                    grouped: g2,
                },
            ) => m1 == m2 && a1 == a2 && g1 == g2,
            (
                Self::Transform {
                    kind: k1,
                    grouped: g1,
                },
                Self::Transform {
                    kind: k2,
                    grouped: g2,
                },
            ) => k1 == k2 && g1 == g2,
            (Self::Quantiles { bins: a }, Self::Quantiles { bins: b }) => a == b,
            (
                Self::PercentileBetween { min: a1, max: b1 },
                Self::PercentileBetween { min: a2, max: b2 },
            ) => a1 == a2 && b1 == b2,
            (Self::NullCheck { negate: a }, Self::NullCheck { negate: b }) => a == b,
            (Self::StaticAssets(a), Self::StaticAssets(b)) => a == b,
            (Self::LabelPredicate(a), Self::LabelPredicate(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TermKind {}

impl Hash for TermKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::AssetExists | Self::Latest => {}
            Self::Column(c) => c.hash(state),
            Self::Constant(v) | Self::FillNa(v) => v.hash(state),
            Self::Expression(e) => e.hash(state),
            Self::Window(k) => k.hash(state),
            Self::Custom(k) => {
                kernel_type(k).hash(state);
                k.name().hash(state);
                k.params().hash(state);
                k.dtype().hash(state);
            }
            Self::Rank {
                method,
                ascending,
                grouped,
            } => (method, ascending, grouped).hash(state),
            Self::Transform { kind, grouped } => (kind, grouped).hash(state),
            Self::Quantiles { bins } => bins.hash(state),
            Self::PercentileBetween { min, max } => (min, max).hash(state),
            Self::NullCheck { negate } => negate.hash(state),
            Self::StaticAssets(s) => s.hash(state),
            Self::LabelPredicate(op) => op.hash(state),
        }
    }
}

/// Immutable term node. Use [`Term`] to hold one.
#[derive(Debug)]
pub struct TermNode {
    kind: TermKind,
    role: Role,
    dtype: DType,
    missing_value: Scalar,
    window_length: usize,
    inputs: Vec<Term>,
    mask: Option<Term>,
    domain: Domain,
    window_safe: bool,
    fingerprint: u64,
}

impl TermNode {
    fn same_structure(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.role == other.role
            && self.dtype == other.dtype
            && self.missing_value == other.missing_value
            && self.window_length == other.window_length
            && self.window_safe == other.window_safe
            && self.domain == other.domain
            && self.inputs == other.inputs
            && self.mask == other.mask
    }
}

/// Handle to a term node, compared and hashed by structure.
#[derive(Clone)]
pub struct Term(Arc<TermNode>);

impl Term {
    /// What the term computes.
    pub fn kind(&self) -> &TermKind {
        &self.0.kind
    }

    /// Capability set.
    pub fn role(&self) -> Role {
        self.0.role
    }

    /// Output dtype.
    pub fn dtype(&self) -> DType {
        self.0.dtype
    }

    /// Value used where the term has no data.
    pub fn missing_value(&self) -> &Scalar {
        &self.0.missing_value
    }

    /// Trailing rows of each input consumed per output row; 0 for
    /// elementwise terms.
    pub fn window_length(&self) -> usize {
        self.0.window_length
    }

    /// Inputs, in the order `compute` receives them.
    pub fn inputs(&self) -> &[Term] {
        &self.0.inputs
    }

    /// Mask; `None` means the root [`TermKind::AssetExists`] mask.
    pub fn mask(&self) -> Option<&Term> {
        self.0.mask.as_ref()
    }

    /// Domain after unifying inputs and mask.
    pub fn domain(&self) -> &Domain {
        &self.0.domain
    }

    /// True if the values do not change when history is restated.
    pub fn window_safe(&self) -> bool {
        self.0.window_safe
    }

    /// Structural fingerprint.
    pub fn fingerprint(&self) -> u64 {
        self.0.fingerprint
    }

    /// True for loader-supplied terms.
    pub fn is_loadable(&self) -> bool {
        self.0.kind.is_loadable()
    }

    /// Dataset column, for column terms.
    pub fn column(&self) -> Option<&BoundColumn> {
        match &self.0.kind {
            TermKind::Column(column) => Some(column),
            _ => None,
        }
    }

    /// The root mask: whether each asset exists on each date.
    pub fn asset_exists() -> Self {
        Self::leaf(TermKind::AssetExists, Role::Filter, DType::Bool, Scalar::Bool(false))
    }

    /// A constant term.
    pub fn constant(value: Scalar) -> Result<AnyTerm> {
        let dtype = value.dtype();
        let role = Role::for_dtype(dtype);
        TermBuilder::new(TermKind::Constant(value.clone()), role, dtype)
            .missing(value)
            .window_safe(true)
            .build()
            .map(AnyTerm::from_term)
    }

    /// A dataset column term.
    pub fn from_column(column: &BoundColumn) -> Self {
        // Column specs validate dtype and missing value on creation, and a
        // leaf has no inputs or mask to conflict with.
        TermBuilder::new(
            TermKind::Column(column.clone()),
            Role::for_dtype(column.dtype()),
            column.dtype(),
        )
        .missing(column.missing_value().clone())
        .window_safe(true)
        .finish(column.domain().clone())
    }

    /// Most recent value of a dataset column.
    pub(crate) fn latest_of_column(column: &BoundColumn) -> Self {
        let input = Self::from_column(column);
        TermBuilder::new(TermKind::Latest, input.role(), input.dtype())
            .missing(input.missing_value().clone())
            .window(1)
            .window_safe(true)
            .inputs(vec![input])
            .finish(column.domain().clone())
    }

    /// Same term with a different mask.
    pub fn with_mask(&self, mask: &Filter) -> Result<Self> {
        let node = &self.0;
        TermBuilder {
            kind: node.kind.clone(),
            role: node.role,
            dtype: node.dtype,
            missing_value: Some(node.missing_value.clone()),
            window_length: node.window_length,
            inputs: node.inputs.clone(),
            mask: Some(mask.term().clone()),
            window_safe: node.window_safe,
            domain: (!node.domain.is_generic()).then(|| node.domain.clone()),
        }
        .build()
    }

    /// Terms this one reads: inputs, then the mask if any.
    pub fn dependencies(&self) -> impl Iterator<Item = &Self> {
        self.0.inputs.iter().chain(self.0.mask.as_ref())
    }

    fn leaf(kind: TermKind, role: Role, dtype: DType, missing_value: Scalar) -> Self {
        TermBuilder::new(kind, role, dtype)
            .missing(missing_value)
            .window_safe(true)
            .finish(Domain::Generic)
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.0.fingerprint == other.0.fingerprint && self.0.same_structure(&other.0))
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.fingerprint.hash(state);
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Term")
            .field("term", &self.to_string())
            .field("dtype", &self.0.dtype)
            .field("window_length", &self.0.window_length)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(f, &self.0.kind, &self.0.inputs, self.0.window_length)
    }
}

fn render(
    f: &mut fmt::Formatter<'_>,
    kind: &TermKind,
    inputs: &[Term],
    window_length: usize,
) -> fmt::Result {
    let first = inputs.first();
    match kind {
        TermKind::AssetExists => f.write_str("AssetExists()"),
        TermKind::Column(column) => f.write_str(&column.qualname()),
        TermKind::Constant(value) => write!(f, "Constant({value})"),
        TermKind::Latest => match first {
            Some(input) => write!(f, "{input}.latest"),
            None => f.write_str("Latest()"),
        },
        TermKind::Expression(expr) => render_expr(f, expr, inputs),
        TermKind::Window(_) | TermKind::Custom(_) => {
            write!(f, "{}(", kind.name())?;
            for input in inputs {
                write!(f, "{input}, ")?;
            }
            write!(f, "window_length={window_length})")
        }
        TermKind::Rank {
            method, ascending, ..
        } => match first {
            Some(input) => write!(f, "Rank({input}, method={method:?}, ascending={ascending})"),
            None => f.write_str("Rank()"),
        },
        TermKind::Quantiles { bins } => match first {
            Some(input) => write!(f, "Quantiles({input}, bins={bins})"),
            None => f.write_str("Quantiles()"),
        },
        TermKind::PercentileBetween { min, max } => match first {
            Some(input) => write!(f, "PercentileBetween({input}, {min}, {max})"),
            None => f.write_str("PercentileBetween()"),
        },
        TermKind::FillNa(value) => match first {
            Some(input) => write!(f, "FillNa({input}, {value})"),
            None => f.write_str("FillNa()"),
        },
        TermKind::StaticAssets(sids) => {
            f.write_str("StaticAssets([")?;
            for (i, sid) in sids.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{sid}")?;
            }
            f.write_str("])")
        }
        TermKind::LabelPredicate(op) => {
            let input = first.map(ToString::to_string).unwrap_or_default();
            match op {
                ClassifierOp::Eq(v) => write!(f, "({input} == {v})"),
                ClassifierOp::Ne(v) => write!(f, "({input} != {v})"),
                ClassifierOp::IsIn(values) => write!(f, "{input}.is_in({values:?})"),
                ClassifierOp::StartsWith(s) => write!(f, "{input}.starts_with({s:?})"),
                ClassifierOp::EndsWith(s) => write!(f, "{input}.ends_with({s:?})"),
                ClassifierOp::Contains(s) => write!(f, "{input}.contains({s:?})"),
            }
        }
        TermKind::Transform { .. } | TermKind::NullCheck { .. } => match first {
            Some(input) => write!(f, "{}({input})", kind.name()),
            None => write!(f, "{}()", kind.name()),
        },
    }
}

fn render_expr(f: &mut fmt::Formatter<'_>, expr: &Expr, inputs: &[Term]) -> fmt::Result {
    match expr {
        Expr::Input(i) => match inputs.get(*i) {
            Some(input) => write!(f, "{input}"),
            None => write!(f, "x_{i}"),
        },
        Expr::Const(c) => write!(f, "{c}"),
        Expr::Unary(op, e) => {
            write!(f, "{op:?}(")?;
            render_expr(f, e, inputs)?;
            f.write_str(")")
        }
        Expr::Binary(op, a, b) => {
            f.write_str("(")?;
            render_expr(f, a, inputs)?;
            write!(f, " {op:?} ")?;
            render_expr(f, b, inputs)?;
            f.write_str(")")
        }
    }
}

/// Display form of a term that has not been built yet.
fn describe(kind: &TermKind, inputs: &[Term], window_length: usize) -> String {
    struct Pending<'a>(&'a TermKind, &'a [Term], usize);
    impl fmt::Display for Pending<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            render(f, self.0, self.1, self.2)
        }
    }
    Pending(kind, inputs, window_length).to_string()
}

/// Validating constructor for term nodes.
#[derive(Debug)]
pub(crate) struct TermBuilder {
    kind: TermKind,
    role: Role,
    dtype: DType,
    missing_value: Option<Scalar>,
    window_length: usize,
    inputs: Vec<Term>,
    mask: Option<Term>,
    window_safe: bool,
    domain: Option<Domain>,
}

impl TermBuilder {
    pub(crate) const fn new(kind: TermKind, role: Role, dtype: DType) -> Self {
        Self {
            kind,
            role,
            dtype,
            missing_value: None,
            window_length: 0,
            inputs: Vec::new(),
            mask: None,
            window_safe: false,
            domain: None,
        }
    }

    pub(crate) fn missing(mut self, value: Scalar) -> Self {
        self.missing_value = Some(value);
        self
    }

    pub(crate) const fn window(mut self, window_length: usize) -> Self {
        self.window_length = window_length;
        self
    }

    pub(crate) fn inputs(mut self, inputs: Vec<Term>) -> Self {
        self.inputs = inputs;
        self
    }

    pub(crate) fn mask(mut self, mask: Option<&Filter>) -> Self {
        self.mask = mask.map(|m| m.term().clone());
        self
    }

    pub(crate) const fn window_safe(mut self, window_safe: bool) -> Self {
        self.window_safe = window_safe;
        self
    }

    /// Window safety inherited from the inputs.
    pub(crate) fn inherit_window_safety(mut self) -> Self {
        self.window_safe = self.inputs.iter().all(Term::window_safe);
        self
    }

    pub(crate) fn build(self) -> Result<Term> {
        let name = || describe(&self.kind, &self.inputs, self.window_length);

        if !self.role.accepts(self.dtype) {
            return Err(TermError::InvalidDType {
                role: self.role,
                dtype: self.dtype,
            });
        }

        match &self.missing_value {
            Some(value) if value.dtype() != self.dtype => {
                return Err(TermError::MissingValueDType {
                    term: name(),
                    dtype: self.dtype,
                    value: value.to_string(),
                });
            }
            None if self.dtype.default_missing_value().is_none() => {
                return Err(TermError::NoDefaultMissingValue {
                    term: name(),
                    dtype: self.dtype,
                });
            }
            _ => {}
        }

        if let Some(minimum) = self.kind.minimum_window() {
            if self.window_length < minimum {
                return Err(TermError::InvalidWindowLength {
                    term: name(),
                    window_length: self.window_length,
                    minimum,
                });
            }
        }

        if self.window_length > 1 {
            if let Some(child) = self.inputs.iter().find(|input| !input.window_safe()) {
                return Err(TermError::NonWindowSafeInput {
                    parent: name(),
                    child: child.to_string(),
                });
            }
        }

        if let Some(mask) = &self.mask {
            if mask.role() != Role::Filter {
                return Err(TermError::MaskNotFilter {
                    term: name(),
                    mask: mask.to_string(),
                });
            }
        }

        let domain = Domain::unify(
            self.domain
                .iter()
                .chain(self.inputs.iter().map(Term::domain))
                .chain(self.mask.iter().map(Term::domain)),
        )?;
        Ok(self.finish(domain))
    }

    fn finish(self, domain: Domain) -> Term {
        let missing_value = self
            .missing_value
            .or_else(|| self.dtype.default_missing_value())
            .unwrap_or(Scalar::Int(0));
        let mut hasher = DefaultHasher::new();
        self.kind.hash(&mut hasher);
        self.role.hash(&mut hasher);
        self.dtype.hash(&mut hasher);
        missing_value.hash(&mut hasher);
        self.window_length.hash(&mut hasher);
        for input in &self.inputs {
            input.fingerprint().hash(&mut hasher);
        }
        self.mask.as_ref().map(Term::fingerprint).hash(&mut hasher);
        domain.hash(&mut hasher);
        self.window_safe.hash(&mut hasher);

        Term(Arc::new(TermNode {
            kind: self.kind,
            role: self.role,
            dtype: self.dtype,
            missing_value,
            window_length: self.window_length,
            inputs: self.inputs,
            mask: self.mask,
            domain,
            window_safe: self.window_safe,
            fingerprint: hasher.finish(),
        }))
    }
}

/// One side of an operator-built expression.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Side<'a> {
    Term(&'a Term),
    Const(f64),
}

impl Side<'_> {
    fn flattened(self) -> (Expr, Vec<Term>) {
        match self {
            Self::Const(value) => (Expr::constant(value), Vec::new()),
            Self::Term(term) => match term.kind() {
                TermKind::Expression(expr) => (expr.clone(), term.inputs().to_vec()),
                _ => (Expr::Input(0), vec![term.clone()]),
            },
        }
    }

    fn opaque(self) -> (Expr, Vec<Term>) {
        match self {
            Self::Const(value) => (Expr::constant(value), Vec::new()),
            Self::Term(term) => (Expr::Input(0), vec![term.clone()]),
        }
    }
}

/// Fold `lhs op rhs` into one expression node.
pub(crate) fn binary_expression(op: BinaryOp, lhs: Side<'_>, rhs: Side<'_>) -> Result<Term> {
    let (left, left_inputs) = lhs.flattened();
    let (right, right_inputs) = rhs.flattened();
    let (inputs, positions) = merge_inputs(&left_inputs, &right_inputs);
    if inputs.len() <= MAX_EXPRESSION_INPUTS {
        return expression(Expr::binary(op, left, right.remap(&positions)), inputs);
    }
    let (left, left_inputs) = lhs.opaque();
    let (right, right_inputs) = rhs.opaque();
    let (inputs, positions) = merge_inputs(&left_inputs, &right_inputs);
    expression(Expr::binary(op, left, right.remap(&positions)), inputs)
}

/// Apply `op` to a term, folding into its expression when it has one.
pub(crate) fn unary_expression(op: UnaryOp, operand: &Term) -> Result<Term> {
    let (expr, inputs) = Side::Term(operand).flattened();
    expression(Expr::unary(op, expr), inputs)
}

fn expression(expr: Expr, inputs: Vec<Term>) -> Result<Term> {
    let builder = if expr.is_boolean() {
        TermBuilder::new(TermKind::Expression(expr), Role::Filter, DType::Bool)
            .inputs(inputs)
            .window_safe(true)
    } else {
        TermBuilder::new(TermKind::Expression(expr), Role::Factor, DType::Float64)
            .inputs(inputs)
            .inherit_window_safety()
    };
    builder.build()
}

/// A term of any role.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnyTerm {
    /// Numeric term
    Factor(Factor),
    /// Boolean term
    Filter(Filter),
    /// Categorical term
    Classifier(Classifier),
}

impl AnyTerm {
    /// Wrap a term in the handle matching its role.
    pub fn from_term(term: Term) -> Self {
        match term.role() {
            Role::Factor => Self::Factor(Factor::wrap(term)),
            Role::Filter => Self::Filter(Filter::wrap(term)),
            Role::Classifier => Self::Classifier(Classifier::wrap(term)),
        }
    }

    /// Underlying term.
    pub const fn term(&self) -> &Term {
        match self {
            Self::Factor(f) => f.term(),
            Self::Filter(f) => f.term(),
            Self::Classifier(c) => c.term(),
        }
    }

    /// Consume into the underlying term.
    pub fn into_term(self) -> Term {
        match self {
            Self::Factor(f) => f.into_term(),
            Self::Filter(f) => f.into_term(),
            Self::Classifier(c) => c.into_term(),
        }
    }

    /// Role of the wrapped term.
    pub fn role(&self) -> Role {
        self.term().role()
    }

    /// The factor, or a role error.
    pub fn into_factor(self) -> Result<Factor> {
        Factor::try_from_term(self.into_term())
    }

    /// The filter, or a role error.
    pub fn into_filter(self) -> Result<Filter> {
        Filter::try_from_term(self.into_term())
    }

    /// The classifier, or a role error.
    pub fn into_classifier(self) -> Result<Classifier> {
        Classifier::try_from_term(self.into_term())
    }
}

impl From<AnyTerm> for Term {
    fn from(value: AnyTerm) -> Self {
        value.into_term()
    }
}

/// Ensure `term` has `expected` role.
pub(crate) fn expect_role(term: &Term, expected: Role) -> Result<()> {
    if term.role() == expected {
        Ok(())
    } else {
        Err(TermError::RoleMismatch {
            expected,
            actual: term.role(),
            term: term.to_string(),
        })
    }
}
