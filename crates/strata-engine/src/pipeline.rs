//! Pipeline definitions.

use crate::error::{EngineError, Result};
use crate::graph::TermGraph;
use std::collections::BTreeMap;
use strata_terms::{Domain, Filter, Term};

/// Named output terms plus an optional screen.
///
/// ```
/// use strata_engine::Pipeline;
/// use strata_terms::{Factor, builtins, equity_pricing};
///
/// let close = Factor::try_from_term(equity_pricing().column("close").unwrap().term()).unwrap();
/// let mut pipeline = Pipeline::new();
/// pipeline.add("sma_10", builtins::simple_moving_average(&close, 10).unwrap()).unwrap();
/// pipeline.set_screen(close.gt(5.0).unwrap());
/// assert_eq!(pipeline.columns().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    columns: BTreeMap<String, Term>,
    screen: Option<Filter>,
    domain: Option<Domain>,
}

impl Pipeline {
    /// Empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline pinned to `domain`.
    pub fn with_domain(domain: Domain) -> Self {
        Self {
            domain: Some(domain),
            ..Self::default()
        }
    }

    /// Add an output column. Names must be unique.
    pub fn add(&mut self, name: impl Into<String>, term: impl Into<Term>) -> Result<()> {
        let name = name.into();
        if self.columns.contains_key(&name) {
            return Err(EngineError::DuplicateColumn(name));
        }
        self.columns.insert(name, term.into());
        Ok(())
    }

    /// Remove an output column, returning its term.
    pub fn remove(&mut self, name: &str) -> Option<Term> {
        self.columns.remove(name)
    }

    /// Set the screen, returning the previous one.
    pub fn set_screen(&mut self, screen: Filter) -> Option<Filter> {
        self.screen.replace(screen)
    }

    /// Output columns by name.
    pub const fn columns(&self) -> &BTreeMap<String, Term> {
        &self.columns
    }

    /// Screen, if any.
    pub const fn screen(&self) -> Option<&Filter> {
        self.screen.as_ref()
    }

    /// Domain the pipeline runs on: the explicit domain if one was given,
    /// otherwise the single specialised domain of its terms, otherwise
    /// `default`. Terms specialised to a different domain are an error.
    pub fn domain(&self, default: &Domain) -> Result<Domain> {
        let term_domains = self
            .columns
            .values()
            .chain(self.screen.as_ref().map(Filter::term))
            .map(Term::domain);
        let unified = Domain::unify(self.domain.iter().chain(term_domains))?;
        Ok(if unified.is_generic() {
            default.clone()
        } else {
            unified
        })
    }

    /// Compile the term graph.
    pub fn to_graph(&self) -> Result<TermGraph> {
        TermGraph::new(&self.columns, self.screen.as_ref().map(Filter::term))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use strata_terms::{Factor, TermError, TradingCalendar, equity_pricing};

    fn calendar_domain(code: &str) -> Domain {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        Domain::calendar(code, TradingCalendar::weekdays(code, start, end))
    }

    fn close() -> Factor {
        Factor::try_from_term(equity_pricing().column("close").unwrap().term()).unwrap()
    }

    #[test]
    fn test_add_and_remove() {
        let mut pipeline = Pipeline::new();
        pipeline.add("close", close()).unwrap();
        let err = pipeline.add("close", close()).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateColumn(name) if name == "close"));
        assert!(pipeline.remove("close").is_some());
        assert!(pipeline.columns().is_empty());
    }

    #[test]
    fn test_set_screen_replaces() {
        let mut pipeline = Pipeline::new();
        assert!(pipeline.set_screen(close().gt(1.0).unwrap()).is_none());
        assert!(pipeline.set_screen(close().gt(2.0).unwrap()).is_some());
    }

    #[test]
    fn test_domain_resolution() {
        let default = calendar_domain("US");
        let pipeline = Pipeline::new();
        assert_eq!(pipeline.domain(&default).unwrap().code(), "US");

        let pinned = Pipeline::with_domain(calendar_domain("CA"));
        assert_eq!(pinned.domain(&default).unwrap().code(), "CA");
    }

    #[test]
    fn test_domain_conflict() {
        let ca = equity_pricing().specialize(calendar_domain("CA")).unwrap();
        let ca_close = Factor::try_from_term(ca.column("close").unwrap().term()).unwrap();
        let mut pipeline = Pipeline::with_domain(calendar_domain("US"));
        pipeline.add("close", ca_close).unwrap();
        let err = pipeline.domain(&calendar_domain("US")).unwrap_err();
        assert!(matches!(err, EngineError::Term(TermError::AmbiguousDomain { .. })));
    }
}
