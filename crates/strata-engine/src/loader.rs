//! Loader contract and the column router.

use crate::error::{EngineError, LoadError, Result};
use chrono::NaiveDate;
use ndarray::Array2;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use strata_adjusted::AdjustedArray;
use strata_terms::{BoundColumn, Domain, Sid};

/// What the engine asks a loader for.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    /// Domain of the pipeline
    pub domain: &'a Domain,
    /// Columns to load; all served by the same loader
    pub columns: &'a [BoundColumn],
    /// Sessions, one output row each
    pub dates: &'a [NaiveDate],
    /// Assets, one output column each, ascending
    pub sids: &'a [Sid],
    /// Whether each asset exists on each date
    pub mask: &'a Array2<bool>,
}

impl LoadRequest<'_> {
    /// Shape every returned array must have.
    pub fn shape(&self) -> (usize, usize) {
        (self.dates.len(), self.sids.len())
    }
}

/// Source of dataset columns.
///
/// A loader returns one [`AdjustedArray`] per requested column, shaped
/// `(dates, sids)`, with unavailable cells set to the column's missing value
/// and restatements expressed as adjustments keyed by the row on which they
/// became known. [`LoadError::NoData`] means the source has nothing for a
/// column at all; the engine then retries column by column and substitutes
/// an all-missing array for the columns that still have no data. Any other
/// error fails the run.
pub trait PipelineLoader: fmt::Debug + Send + Sync {
    /// Load `request.columns`.
    fn load_adjusted_array(
        &self,
        request: &LoadRequest<'_>,
    ) -> std::result::Result<BTreeMap<BoundColumn, AdjustedArray>, LoadError>;
}

/// Routes dataset columns to loaders.
///
/// Registering the same loader under several datasets lets the engine fetch
/// their columns in one call.
#[derive(Debug, Clone, Default)]
pub struct LoaderRegistry {
    loaders: Vec<Arc<dyn PipelineLoader>>,
    by_dataset: HashMap<String, usize>,
}

impl LoaderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve every column of `dataset` from `loader`, replacing any previous
    /// registration for that dataset.
    pub fn register(&mut self, dataset: impl Into<String>, loader: Arc<dyn PipelineLoader>) {
        let id = match self.loaders.iter().position(|l| Arc::ptr_eq(l, &loader)) {
            Some(id) => id,
            None => {
                self.loaders.push(loader);
                self.loaders.len() - 1
            }
        };
        self.by_dataset.insert(dataset.into(), id);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, dataset: impl Into<String>, loader: Arc<dyn PipelineLoader>) -> Self {
        self.register(dataset, loader);
        self
    }

    /// Identifier and loader serving `column`.
    pub fn loader_for(&self, column: &BoundColumn) -> Result<(usize, &Arc<dyn PipelineLoader>)> {
        self.by_dataset
            .get(column.dataset())
            .and_then(|&id| self.loaders.get(id).map(|loader| (id, loader)))
            .ok_or_else(|| EngineError::UnregisteredColumn {
                column: column.qualname(),
            })
    }

    /// Loader by identifier.
    pub fn loader(&self, id: usize) -> Option<&Arc<dyn PipelineLoader>> {
        self.loaders.get(id)
    }

    /// Number of distinct loaders.
    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_terms::equity_pricing;

    #[derive(Debug)]
    struct NoopLoader;

    impl PipelineLoader for NoopLoader {
        fn load_adjusted_array(
            &self,
            _request: &LoadRequest<'_>,
        ) -> std::result::Result<BTreeMap<BoundColumn, AdjustedArray>, LoadError> {
            Ok(BTreeMap::new())
        }
    }

    #[test]
    fn test_routes_by_dataset() {
        let loader: Arc<dyn PipelineLoader> = Arc::new(NoopLoader);
        let registry = LoaderRegistry::new()
            .with("EquityPricing", Arc::clone(&loader))
            .with("Fundamentals", loader);
        assert_eq!(registry.len(), 1);

        let close = equity_pricing().column("close").unwrap();
        let (id, _) = registry.loader_for(&close).unwrap();
        assert_eq!(id, 0);
    }

    #[test]
    fn test_unregistered_column() {
        let registry = LoaderRegistry::new();
        let close = equity_pricing().column("close").unwrap();
        let err = registry.loader_for(&close).unwrap_err();
        assert!(matches!(err, EngineError::UnregisteredColumn { column } if column == "EquityPricing.close"));
    }
}
