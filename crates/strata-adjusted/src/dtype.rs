//! Element types and scalar values.

use crate::error::{ArrayError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Missing value sentinel for datetime buffers (nanoseconds since epoch).
pub const NAT: i64 = i64::MIN;

/// Element type of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DType {
    /// 64-bit float
    Float64,
    /// 64-bit signed integer
    Int64,
    /// Boolean
    Bool,
    /// Nanosecond timestamp stored as `i64`
    Datetime,
    /// Dictionary-encoded string
    Categorical,
}

impl DType {
    /// Returns the dtype name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Int64 => "int64",
            Self::Bool => "bool",
            Self::Datetime => "datetime64[ns]",
            Self::Categorical => "categorical",
        }
    }

    /// True for dtypes supporting arithmetic.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Float64 | Self::Int64)
    }

    /// Default missing value, if the dtype has one.
    ///
    /// `Int64` has no natural sentinel, so callers must choose one.
    pub const fn default_missing_value(&self) -> Option<Scalar> {
        match self {
            Self::Float64 => Some(Scalar::Float(f64::NAN)),
            Self::Int64 => None,
            Self::Bool => Some(Scalar::Bool(false)),
            Self::Datetime => Some(Scalar::Datetime(NAT)),
            Self::Categorical => Some(Scalar::Label(None)),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell value.
///
/// Equality and hashing compare floats by bit pattern, so `NaN` equals itself.
/// That is what term identity needs; it is not numeric equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Scalar {
    /// Float value
    Float(f64),
    /// Integer value
    Int(i64),
    /// Boolean value
    Bool(bool),
    /// Timestamp in nanoseconds
    Datetime(i64),
    /// Label, `None` when missing
    Label(Option<String>),
}

impl Scalar {
    /// Dtype this scalar belongs to.
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Float(_) => DType::Float64,
            Self::Int(_) => DType::Int64,
            Self::Bool(_) => DType::Bool,
            Self::Datetime(_) => DType::Datetime,
            Self::Label(_) => DType::Categorical,
        }
    }

    /// Ensure this scalar has the given dtype.
    pub fn expect_dtype(&self, dtype: DType) -> Result<()> {
        if self.dtype() == dtype {
            Ok(())
        } else {
            Err(ArrayError::DTypeMismatch {
                expected: dtype,
                actual: self.dtype().to_string(),
            })
        }
    }

    /// Float payload.
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer payload (also for datetimes).
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) | Self::Datetime(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Label payload; `None` both for missing labels and non-label scalars.
    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Label(v) => v.as_deref(),
            _ => None,
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Datetime(a), Self::Datetime(b)) => a == b,
            (Self::Label(a), Self::Label(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Scalar {}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Float(v) => v.to_bits().hash(state),
            Self::Int(v) | Self::Datetime(v) => v.hash(state),
            Self::Bool(v) => v.hash(state),
            Self::Label(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Datetime(NAT) => f.write_str("NaT"),
            Self::Datetime(v) => write!(f, "{v}ns"),
            Self::Label(Some(v)) => write!(f, "{v:?}"),
            Self::Label(None) => f.write_str("None"),
        }
    }
}

/// Hashable wrapper around an `f64` parameter, compared by bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloatKey(u64);

impl FloatKey {
    /// Returns the wrapped float.
    pub const fn get(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl From<f64> for FloatKey {
    fn from(value: f64) -> Self {
        // Fold -0.0 into 0.0 so equal parameters share one identity.
        let value = if value == 0.0 { 0.0 } else { value };
        Self(value.to_bits())
    }
}

impl fmt::Display for FloatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_missing_values() {
        assert!(DType::Float64.default_missing_value().unwrap().as_f64().unwrap().is_nan());
        assert_eq!(DType::Int64.default_missing_value(), None);
        assert_eq!(DType::Bool.default_missing_value(), Some(Scalar::Bool(false)));
        assert_eq!(DType::Datetime.default_missing_value(), Some(Scalar::Datetime(NAT)));
        assert_eq!(DType::Categorical.default_missing_value(), Some(Scalar::Label(None)));
    }

    #[test]
    fn test_nan_scalars_share_identity() {
        let mut set = HashSet::new();
        set.insert(Scalar::Float(f64::NAN));
        set.insert(Scalar::Float(f64::NAN));
        assert_eq!(set.len(), 1);
        assert_ne!(Scalar::Float(1.0), Scalar::Int(1));
    }

    #[test]
    fn test_expect_dtype() {
        assert!(Scalar::Int(3).expect_dtype(DType::Int64).is_ok());
        assert!(Scalar::Int(3).expect_dtype(DType::Float64).is_err());
    }

    #[test]
    fn test_float_key_folds_negative_zero() {
        assert_eq!(FloatKey::from(0.0), FloatKey::from(-0.0));
        assert_eq!(FloatKey::from(0.25).get(), 0.25);
    }
}
