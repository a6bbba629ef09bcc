//! CSV and JSON export of pipeline results.
//!
//! Both formats are row-oriented: one record per (date, asset) with a
//! `date`, a `sid` and one field per output column. Missing values are
//! written as empty CSV fields and JSON nulls.

use crate::result::{ColumnValues, PipelineResult};
use polars::prelude::PolarsError;
use serde_json::{Map, Value};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use strata_adjusted::NAT;
use thiserror::Error;

/// Errors that can occur while building or exporting results.
#[derive(Debug, Error)]
pub enum ExportError {
    /// CSV serialization error.
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DataFrame conversion error.
    #[error("DataFrame error: {0}")]
    Polars(#[from] PolarsError),

    /// Invalid format error.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Column length differs from the row count.
    #[error("Column {column} has {actual} values, expected {expected}")]
    LengthMismatch {
        /// Column name
        column: String,
        /// Row count
        expected: usize,
        /// Values supplied
        actual: usize,
    },

    /// Results with different columns cannot be combined.
    #[error("Column mismatch: {0}")]
    ColumnMismatch(String),
}

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values format.
    Csv,

    /// Compact JSON format.
    Json,

    /// Pretty-printed JSON format.
    PrettyJson,
}

impl ExportFormat {
    /// Get the file extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn csv_field(values: &ColumnValues, row: usize) -> String {
    match values {
        ColumnValues::Float64(v) if v[row].is_nan() => String::new(),
        ColumnValues::Float64(v) => v[row].to_string(),
        ColumnValues::Int64(v) => v[row].to_string(),
        ColumnValues::Bool(v) => v[row].to_string(),
        ColumnValues::Datetime(v) if v[row] == NAT => String::new(),
        ColumnValues::Datetime(v) => v[row].to_string(),
        ColumnValues::Categorical(v) => v[row].clone().unwrap_or_default(),
    }
}

fn json_value(values: &ColumnValues, row: usize) -> Value {
    match values {
        // Non-finite floats become null.
        ColumnValues::Float64(v) => Value::from(v[row]),
        ColumnValues::Int64(v) => Value::from(v[row]),
        ColumnValues::Bool(v) => Value::from(v[row]),
        ColumnValues::Datetime(v) if v[row] == NAT => Value::Null,
        ColumnValues::Datetime(v) => Value::from(v[row]),
        ColumnValues::Categorical(v) => v[row].clone().map_or(Value::Null, Value::from),
    }
}

impl PipelineResult {
    fn to_records(&self) -> Vec<Value> {
        (0..self.len())
            .map(|row| {
                let mut record = Map::new();
                record.insert("date".to_string(), Value::from(self.dates()[row].to_string()));
                record.insert("sid".to_string(), Value::from(self.sids()[row].get()));
                for (name, values) in self.columns() {
                    record.insert(name.clone(), json_value(values, row));
                }
                Value::Object(record)
            })
            .collect()
    }
}

impl Exporter for PipelineResult {
    fn export_to_string(&self, format: ExportFormat) -> Result<String, ExportError> {
        match format {
            ExportFormat::Csv => {
                let mut wtr = csv::Writer::from_writer(vec![]);
                let mut header = vec!["date".to_string(), "sid".to_string()];
                header.extend(self.columns().keys().cloned());
                wtr.write_record(&header)?;
                for row in 0..self.len() {
                    let mut record = vec![self.dates()[row].to_string(), self.sids()[row].to_string()];
                    record.extend(self.columns().values().map(|v| csv_field(v, row)));
                    wtr.write_record(&record)?;
                }
                let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
                String::from_utf8(bytes).map_err(|e| ExportError::InvalidFormat(e.to_string()))
            }
            ExportFormat::Json => Ok(serde_json::to_string(&self.to_records())?),
            ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(&self.to_records())?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;
    use std::collections::BTreeMap;
    use strata_terms::Sid;

    fn sample() -> PipelineResult {
        let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut columns = BTreeMap::new();
        columns.insert("x".to_string(), ColumnValues::Float64(vec![1.5, f64::NAN]));
        columns.insert(
            "sector".to_string(),
            ColumnValues::Categorical(vec![Some("Tech".to_string()), None]),
        );
        PipelineResult::new(vec![day, day], vec![Sid(1), Sid(2)], columns).unwrap()
    }

    #[test]
    fn test_export_csv() {
        let csv = sample().export_to_string(ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "date,sid,sector,x");
        assert_eq!(lines[1], "2024-01-02,1,Tech,1.5");
        assert_eq!(lines[2], "2024-01-02,2,,");
    }

    #[test]
    fn test_export_json() {
        let json = sample().export_to_string(ExportFormat::Json).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["sector"], "Tech");
        assert_eq!(parsed[0]["x"], 1.5);
        assert!(parsed[1]["x"].is_null());
        assert_eq!(parsed[1]["sid"], 2);
    }

    #[test]
    fn test_export_pretty_json() {
        let json = sample().export_to_string(ExportFormat::PrettyJson).unwrap();
        assert!(json.contains("  ")); // Indentation indicates pretty format
    }

    #[rstest]
    #[case(ExportFormat::Csv, "csv")]
    #[case(ExportFormat::Json, "json")]
    #[case(ExportFormat::PrettyJson, "json")]
    fn test_extension(#[case] format: ExportFormat, #[case] expected: &str) {
        assert_eq!(format.extension(), expected);
    }

    #[test]
    fn test_export_to_file() {
        let path = std::env::temp_dir().join("strata_output_export_test.csv");
        sample().export_to_file(&path, ExportFormat::Csv).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("date,sid"));
        std::fs::remove_file(&path).ok();
    }
}
