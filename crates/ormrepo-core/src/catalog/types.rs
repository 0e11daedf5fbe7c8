//! Scalar column types.

use ormrepo_proto::Value;
use std::fmt;

/// Scalar data types a mapped field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
}

impl ScalarType {
    /// Check if this type is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32 | ScalarType::Int64 | ScalarType::Float64
        )
    }

    /// Whether a bound value can be compared against a field of this type.
    ///
    /// Null is accepted everywhere; integers widen and narrow when they fit.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (ScalarType::Bool, Value::Bool(_)) => true,
            (ScalarType::Int32, Value::Int32(_)) => true,
            (ScalarType::Int32, Value::Int64(i)) => i32::try_from(*i).is_ok(),
            (ScalarType::Int64, Value::Int32(_) | Value::Int64(_)) => true,
            (ScalarType::Float64, Value::Float64(_) | Value::Int32(_) | Value::Int64(_)) => true,
            (ScalarType::String, Value::String(_)) => true,
            (ScalarType::Timestamp, Value::Timestamp(_) | Value::Int64(_)) => true,
            _ => false,
        }
    }

    /// Convert an accepted value to this type's canonical variant.
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (ScalarType::Int32, Value::Int64(i)) => i32::try_from(i)
                .map(Value::Int32)
                .unwrap_or(Value::Int64(i)),
            (ScalarType::Int64, Value::Int32(i)) => Value::Int64(i as i64),
            (ScalarType::Float64, Value::Int32(i)) => Value::Float64(i as f64),
            (ScalarType::Float64, Value::Int64(i)) => Value::Float64(i as f64),
            (ScalarType::Timestamp, Value::Int64(i)) => Value::Timestamp(i),
            (_, other) => other,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Bool => "bool",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Float64 => "float64",
            ScalarType::String => "string",
            ScalarType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}
