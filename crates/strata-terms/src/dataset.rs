//! Dataset schemas.
//!
//! Datasets are plain data: a name, a list of typed columns and a domain.
//! Binding a column yields a [`BoundColumn`], which is what loaders are keyed
//! by and what the `Column` term wraps.

use crate::domain::Domain;
use crate::error::{Result, TermError};
use crate::term::{AnyTerm, Term};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use strata_adjusted::{DType, Scalar};

/// Declared column of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    name: String,
    dtype: DType,
    missing_value: Scalar,
}

impl ColumnSpec {
    /// Column using the dtype's default missing value.
    pub fn new(name: impl Into<String>, dtype: DType) -> Result<Self> {
        let name = name.into();
        let missing_value =
            dtype
                .default_missing_value()
                .ok_or_else(|| TermError::NoDefaultMissingValue {
                    term: name.clone(),
                    dtype,
                })?;
        Ok(Self {
            name,
            dtype,
            missing_value,
        })
    }

    /// Column with an explicit missing value.
    pub fn with_missing(
        name: impl Into<String>,
        dtype: DType,
        missing_value: Scalar,
    ) -> Result<Self> {
        let name = name.into();
        if missing_value.dtype() != dtype {
            return Err(TermError::MissingValueDType {
                term: name,
                dtype,
                value: missing_value.to_string(),
            });
        }
        Ok(Self {
            name,
            dtype,
            missing_value,
        })
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column dtype.
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    /// Missing value.
    pub const fn missing_value(&self) -> &Scalar {
        &self.missing_value
    }
}

/// A named collection of columns on one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSet {
    name: Arc<str>,
    columns: Vec<ColumnSpec>,
    domain: Domain,
}

impl DataSet {
    /// Generic dataset; rejects duplicate column names.
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Result<Self> {
        let name: String = name.into();
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(TermError::DuplicateColumn {
                    dataset: name,
                    column: column.name.clone(),
                });
            }
        }
        Ok(Self {
            name: name.into(),
            columns,
            domain: Domain::Generic,
        })
    }

    /// Dataset name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Domain.
    pub const fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Column declarations.
    pub fn specs(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Copy bound to `domain`; only generic datasets can be specialised.
    pub fn specialize(&self, domain: Domain) -> Result<Self> {
        if !self.domain.is_generic() && self.domain != domain {
            return Err(TermError::AmbiguousDomain {
                codes: vec![self.domain.code().to_string(), domain.code().to_string()],
            });
        }
        Ok(Self {
            name: Arc::clone(&self.name),
            columns: self.columns.clone(),
            domain,
        })
    }

    /// Bind one column.
    pub fn column(&self, name: &str) -> Result<BoundColumn> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|spec| self.bind(spec))
            .ok_or_else(|| TermError::UnknownColumn {
                dataset: self.name.to_string(),
                column: name.to_string(),
            })
    }

    /// Bind every column, in declaration order.
    pub fn columns(&self) -> Vec<BoundColumn> {
        self.columns.iter().map(|spec| self.bind(spec)).collect()
    }

    fn bind(&self, spec: &ColumnSpec) -> BoundColumn {
        BoundColumn {
            dataset: Arc::clone(&self.name),
            name: spec.name.as_str().into(),
            dtype: spec.dtype,
            missing_value: spec.missing_value.clone(),
            domain: self.domain.clone(),
        }
    }
}

/// A dataset column bound to a domain.
///
/// Identity is the dataset name, the column name and the domain code.
#[derive(Debug, Clone)]
pub struct BoundColumn {
    dataset: Arc<str>,
    name: Arc<str>,
    dtype: DType,
    missing_value: Scalar,
    domain: Domain,
}

impl BoundColumn {
    /// Dataset name.
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column dtype.
    pub const fn dtype(&self) -> DType {
        self.dtype
    }

    /// Missing value.
    pub const fn missing_value(&self) -> &Scalar {
        &self.missing_value
    }

    /// Domain.
    pub const fn domain(&self) -> &Domain {
        &self.domain
    }

    /// `Dataset.column`, or `Dataset<CODE>.column` when specialised.
    pub fn qualname(&self) -> String {
        if self.domain.is_generic() {
            format!("{}.{}", self.dataset, self.name)
        } else {
            format!("{}<{}>.{}", self.dataset, self.domain.code(), self.name)
        }
    }

    /// Loadable term for this column.
    pub fn term(&self) -> Term {
        Term::from_column(self)
    }

    /// Most recent value, as a term of the role matching the dtype.
    pub fn latest(&self) -> AnyTerm {
        AnyTerm::from_term(Term::latest_of_column(self))
    }

    fn key(&self) -> (&str, &str, &str) {
        (&*self.dataset, &*self.name, self.domain.code())
    }
}

impl PartialEq for BoundColumn {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for BoundColumn {}

impl Hash for BoundColumn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for BoundColumn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BoundColumn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for BoundColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualname())
    }
}

/// Datasets by name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    datasets: BTreeMap<String, DataSet>,
}

impl SchemaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dataset; names must be unique.
    pub fn register(&mut self, dataset: DataSet) -> Result<()> {
        if self.datasets.contains_key(dataset.name()) {
            return Err(TermError::DuplicateDataSet(dataset.name().to_string()));
        }
        self.datasets.insert(dataset.name().to_string(), dataset);
        Ok(())
    }

    /// Dataset by name.
    pub fn get(&self, name: &str) -> Option<&DataSet> {
        self.datasets.get(name)
    }

    /// Bind `dataset.column`.
    pub fn column(&self, dataset: &str, column: &str) -> Result<BoundColumn> {
        self.get(dataset)
            .ok_or_else(|| TermError::UnknownDataSet(dataset.to_string()))?
            .column(column)
    }

    /// Registered datasets, by name.
    pub fn datasets(&self) -> impl Iterator<Item = &DataSet> {
        self.datasets.values()
    }
}

/// Daily equity pricing: open, high, low, close and volume.
pub fn equity_pricing() -> DataSet {
    let columns = ["open", "high", "low", "close", "volume"]
        .into_iter()
        .map(|name| ColumnSpec {
            name: name.to_string(),
            dtype: DType::Float64,
            missing_value: Scalar::Float(f64::NAN),
        })
        .collect();
    DataSet {
        name: "EquityPricing".into(),
        columns,
        domain: Domain::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::TradingCalendar;
    use crate::term::Role;
    use chrono::NaiveDate;

    #[test]
    fn test_equity_pricing_columns() {
        let pricing = equity_pricing();
        let names: Vec<String> = pricing.columns().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, ["open", "high", "low", "close", "volume"]);
        assert_eq!(pricing.column("close").unwrap().qualname(), "EquityPricing.close");
        assert!(matches!(
            pricing.column("vwap"),
            Err(TermError::UnknownColumn { .. })
        ));
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let cols = vec![
            ColumnSpec::new("a", DType::Float64).unwrap(),
            ColumnSpec::new("a", DType::Bool).unwrap(),
        ];
        assert!(matches!(DataSet::new("X", cols), Err(TermError::DuplicateColumn { .. })));
    }

    #[test]
    fn test_int_columns_need_missing_value() {
        assert!(ColumnSpec::new("shares", DType::Int64).is_err());
        let spec = ColumnSpec::with_missing("shares", DType::Int64, Scalar::Int(-1)).unwrap();
        assert_eq!(spec.missing_value(), &Scalar::Int(-1));
        assert!(ColumnSpec::with_missing("shares", DType::Int64, Scalar::Float(0.0)).is_err());
    }

    #[test]
    fn test_specialize_changes_identity() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let domain = Domain::calendar("US_EQUITIES", TradingCalendar::weekdays("XNYS", day, day));
        let generic = equity_pricing().column("close").unwrap();
        let us = equity_pricing().specialize(domain).unwrap().column("close").unwrap();
        assert_ne!(generic, us);
        assert_eq!(us.qualname(), "EquityPricing<US_EQUITIES>.close");
        assert_eq!(us.latest().term().domain().code(), "US_EQUITIES");
    }

    #[test]
    fn test_latest_role_follows_dtype() {
        let cols = vec![
            ColumnSpec::new("flag", DType::Bool).unwrap(),
            ColumnSpec::new("sector", DType::Categorical).unwrap(),
        ];
        let ds = DataSet::new("Meta", cols).unwrap();
        assert_eq!(ds.column("flag").unwrap().latest().role(), Role::Filter);
        assert_eq!(ds.column("sector").unwrap().latest().role(), Role::Classifier);
    }

    #[test]
    fn test_registry() {
        let mut registry = SchemaRegistry::new();
        registry.register(equity_pricing()).unwrap();
        assert!(matches!(
            registry.register(equity_pricing()),
            Err(TermError::DuplicateDataSet(_))
        ));
        assert!(registry.column("EquityPricing", "volume").is_ok());
        assert!(matches!(registry.column("Fundamentals", "pe"), Err(TermError::UnknownDataSet(_))));
    }
}
