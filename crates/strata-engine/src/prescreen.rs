//! Narrowing the asset set before anything is loaded.
//!
//! A screen built from [`StaticAssets`](strata_terms::TermKind::StaticAssets)
//! filters can only pass a known set of assets. When that holds, the engine
//! loads and computes those assets alone. Cross-sectional terms see the other
//! assets in their row, so narrowing is only allowed when each of them is
//! masked to a subset of the same set; otherwise the screen is applied after
//! computation as usual.

use crate::graph::TermGraph;
use std::collections::BTreeSet;
use strata_terms::{BinaryOp, Expr, Sid, Term, TermKind};
use tracing::{debug, warn};

/// Assets outside of which `term` is never true, if that set can be known
/// without loading data.
pub fn reduce(term: &Term) -> Option<BTreeSet<Sid>> {
    let own = match term.kind() {
        TermKind::StaticAssets(sids) => Some(sids.clone()),
        TermKind::Expression(expr) => reduce_expr(expr, term.inputs()),
        _ => None,
    };
    let mask = term.mask().and_then(reduce);
    intersect(own, mask)
}

fn reduce_expr(expr: &Expr, inputs: &[Term]) -> Option<BTreeSet<Sid>> {
    match expr {
        Expr::Input(i) => inputs.get(*i).and_then(reduce),
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            intersect(reduce_expr(lhs, inputs), reduce_expr(rhs, inputs))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            let lhs = reduce_expr(lhs, inputs)?;
            let rhs = reduce_expr(rhs, inputs)?;
            Some(lhs.union(&rhs).copied().collect())
        }
        _ => None,
    }
}

fn intersect(a: Option<BTreeSet<Sid>>, b: Option<BTreeSet<Sid>>) -> Option<BTreeSet<Sid>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.intersection(&b).copied().collect()),
        (a, b) => a.or(b),
    }
}

fn mentions_static_assets(term: &Term) -> bool {
    matches!(term.kind(), TermKind::StaticAssets(_))
        || term.inputs().iter().any(mentions_static_assets)
        || term.mask().is_some_and(mentions_static_assets)
}

/// Assets the whole graph can be narrowed to, or `None` when the screen
/// must be applied after computation.
pub fn prescreen_assets(graph: &TermGraph) -> Option<BTreeSet<Sid>> {
    let screen = graph.term(graph.screen()?);
    let Some(sids) = reduce(screen) else {
        if mentions_static_assets(screen) {
            warn!(screen = %screen, "screen names fixed assets but cannot be reduced to them; filtering after computation");
        }
        return None;
    };

    let blocking = graph.terms().iter().find(|term| {
        term.kind().is_cross_sectional()
            && !term
                .mask()
                .and_then(reduce)
                .is_some_and(|mask| mask.is_subset(&sids))
    });
    if let Some(term) = blocking {
        warn!(
            term = %term,
            "cross-sectional term is not masked to the screened assets; filtering after computation"
        );
        return None;
    }

    debug!(assets = sids.len(), "narrowing pipeline to screened assets");
    Some(sids)
}
