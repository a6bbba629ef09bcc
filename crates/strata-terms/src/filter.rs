//! Boolean terms.

use crate::error::Result;
use crate::expr::{BinaryOp, UnaryOp};
use crate::term::{Role, Side, Term, binary_expression, expect_role, unary_expression};

/// A term producing booleans, used for screens and masks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter(Term);

impl Filter {
    pub(crate) const fn wrap(term: Term) -> Self {
        Self(term)
    }

    /// Wrap a term, checking its role.
    pub fn try_from_term(term: Term) -> Result<Self> {
        expect_role(&term, Role::Filter)?;
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

    /// True where both filters are.
    pub fn and(&self, other: &Self) -> Result<Self> {
        binary_expression(BinaryOp::And, Side::Term(&self.0), Side::Term(&other.0)).map(Self)
    }

    /// True where either filter is.
    pub fn or(&self, other: &Self) -> Result<Self> {
        binary_expression(BinaryOp::Or, Side::Term(&self.0), Side::Term(&other.0)).map(Self)
    }

    /// Logical negation.
    pub fn not(&self) -> Result<Self> {
        unary_expression(UnaryOp::Not, &self.0).map(Self)
    }

    /// Same filter computed under a different mask.
    pub fn with_mask(&self, mask: &Self) -> Result<Self> {
        self.0.with_mask(mask).map(Self)
    }
}

impl From<Filter> for Term {
    fn from(value: Filter) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::static_assets;
    use crate::dataset::equity_pricing;
    use crate::expr::Expr;
    use crate::sid::Sid;
    use crate::term::TermKind;

    #[test]
    fn test_combinators_flatten() {
        let close = equity_pricing().column("close").unwrap().latest().into_factor().unwrap();
        let cheap = close.lt(10.0).unwrap();
        let liquid = static_assets([Sid(1), Sid(2)]).unwrap();
        let both = cheap.and(&liquid).unwrap().not().unwrap();
        assert_eq!(both.term().role(), Role::Filter);
        assert!(both.term().window_safe());
        let TermKind::Expression(expr) = both.term().kind() else {
            panic!("expected an expression");
        };
        assert!(matches!(expr, Expr::Unary(UnaryOp::Not, _)));
        assert_eq!(both.term().inputs().len(), 2);
    }

    #[test]
    fn test_try_from_term_checks_role() {
        let close = equity_pricing().column("close").unwrap().term();
        assert!(Filter::try_from_term(close).is_err());
        assert!(Filter::try_from_term(Term::asset_exists()).is_ok());
    }
}
