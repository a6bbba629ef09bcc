//! Expression AST for operator-built terms.
//!
//! Arithmetic and comparisons between terms fold into a single
//! [`Expr`] over a deduplicated list of leaf inputs, so `(a + b) * 2` is one
//! node with two dependencies. Evaluation promotes every input to `f64`;
//! booleans are `1.0` / `0.0`.

use ndarray::{Array2, Zip};
use std::fmt;
use strata_adjusted::FloatKey;

/// Maximum number of leaf inputs in one expression.
pub const MAX_EXPRESSION_INPUTS: usize = 32;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `|x|`
    Abs,
    /// Natural log
    Log,
    /// `ln(1 + x)`
    Log1p,
    /// `e^x`
    Exp,
    /// Square root
    Sqrt,
    /// Logical not
    Not,
    /// `x` is NaN
    IsNan,
    /// `x` is not NaN
    NotNan,
    /// `x` is finite
    IsFinite,
}

impl UnaryOp {
    /// True if the result is boolean.
    pub const fn is_boolean(self) -> bool {
        matches!(self, Self::Not | Self::IsNan | Self::NotNan | Self::IsFinite)
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Abs => "abs",
            Self::Log => "log",
            Self::Log1p => "log1p",
            Self::Exp => "exp",
            Self::Sqrt => "sqrt",
            Self::Not => "~",
            Self::IsNan => "isnan",
            Self::NotNan => "notnan",
            Self::IsFinite => "isfinite",
        }
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            Self::Neg => -x,
            Self::Abs => x.abs(),
            Self::Log => x.ln(),
            Self::Log1p => x.ln_1p(),
            Self::Exp => x.exp(),
            Self::Sqrt => x.sqrt(),
            Self::Not => truth(!is_true(x)),
            Self::IsNan => truth(x.is_nan()),
            Self::NotNan => truth(!x.is_nan()),
            Self::IsFinite => truth(x.is_finite()),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// `a ^ b`
    Pow,
    /// `a < b`
    Lt,
    /// `a <= b`
    Le,
    /// `a > b`
    Gt,
    /// `a >= b`
    Ge,
    /// `a == b`
    Eq,
    /// `a != b`
    Ne,
    /// Logical and
    And,
    /// Logical or
    Or,
}

impl BinaryOp {
    /// True if the result is boolean.
    pub const fn is_boolean(self) -> bool {
        !matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Pow)
    }

    /// True if both operands must be boolean.
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&",
            Self::Or => "|",
        }
    }

    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Pow => a.powf(b),
            Self::Lt => truth(a < b),
            Self::Le => truth(a <= b),
            Self::Gt => truth(a > b),
            Self::Ge => truth(a >= b),
            Self::Eq => truth(a == b),
            Self::Ne => truth(a != b),
            Self::And => truth(is_true(a) && is_true(b)),
            Self::Or => truth(is_true(a) || is_true(b)),
        }
    }
}

const fn truth(value: bool) -> f64 {
    if value { 1.0 } else { 0.0 }
}

/// True for a nonzero, non-NaN value.
pub fn is_true(value: f64) -> bool {
    value != 0.0 && !value.is_nan()
}

/// Expression tree over numbered inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Leaf input by position
    Input(usize),
    /// Literal
    Const(FloatKey),
    /// Unary operation
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Literal expression.
    pub fn constant(value: f64) -> Self {
        Self::Const(FloatKey::from(value))
    }

    /// Apply a unary operator.
    pub fn unary(op: UnaryOp, operand: Self) -> Self {
        Self::Unary(op, Box::new(operand))
    }

    /// Apply a binary operator.
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// True if the expression evaluates to a boolean.
    pub fn is_boolean(&self) -> bool {
        match self {
            Self::Input(_) | Self::Const(_) => false,
            Self::Unary(op, _) => op.is_boolean(),
            Self::Binary(op, _, _) => op.is_boolean(),
        }
    }

    /// Number of inputs referenced, i.e. the highest input index plus one.
    pub fn arity(&self) -> usize {
        match self {
            Self::Input(i) => i + 1,
            Self::Const(_) => 0,
            Self::Unary(_, e) => e.arity(),
            Self::Binary(_, a, b) => a.arity().max(b.arity()),
        }
    }

    /// Rewrite input indices through `map`.
    pub fn remap(&self, map: &[usize]) -> Self {
        match self {
            Self::Input(i) => Self::Input(map.get(*i).copied().unwrap_or(*i)),
            Self::Const(c) => Self::Const(*c),
            Self::Unary(op, e) => Self::unary(*op, e.remap(map)),
            Self::Binary(op, a, b) => Self::binary(*op, a.remap(map), b.remap(map)),
        }
    }

    /// Evaluate elementwise over `inputs`, all of `shape`.
    pub fn eval(&self, inputs: &[Array2<f64>], shape: (usize, usize)) -> Array2<f64> {
        match self {
            Self::Input(i) => inputs
                .get(*i)
                .cloned()
                .unwrap_or_else(|| Array2::from_elem(shape, f64::NAN)),
            Self::Const(c) => Array2::from_elem(shape, c.get()),
            Self::Unary(op, e) => {
                let mut out = e.eval(inputs, shape);
                out.mapv_inplace(|x| op.apply(x));
                out
            }
            Self::Binary(op, a, b) => {
                let lhs = a.eval(inputs, shape);
                let rhs = b.eval(inputs, shape);
                Zip::from(&lhs).and(&rhs).map_collect(|&x, &y| op.apply(x, y))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(i) => write!(f, "x_{i}"),
            Self::Const(c) => write!(f, "{c}"),
            Self::Unary(UnaryOp::Neg, e) => write!(f, "-({e})"),
            Self::Unary(UnaryOp::Not, e) => write!(f, "~({e})"),
            Self::Unary(op, e) => write!(f, "{}({e})", op.name()),
            Self::Binary(op, a, b) => write!(f, "({a} {} {b})", op.symbol()),
        }
    }
}

/// Merge two input lists, returning the merged list and where each entry of
/// `right` landed.
pub(crate) fn merge_inputs<T: PartialEq + Clone>(left: &[T], right: &[T]) -> (Vec<T>, Vec<usize>) {
    let mut merged = left.to_vec();
    let mut positions = Vec::with_capacity(right.len());
    for item in right {
        match merged.iter().position(|m| m == item) {
            Some(idx) => positions.push(idx),
            None => {
                merged.push(item.clone());
                positions.push(merged.len() - 1);
            }
        }
    }
    (merged, positions)
}
