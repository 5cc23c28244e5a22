//! Decoded SQL values.

use serde::{Deserialize, Serialize};

/// A decoded result-set cell.
///
/// Only the integer family is decoded into a typed value. Cells of any other
/// column type keep the wire type code so callers can tell "not decoded"
/// apart from SQL NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// Integer value (TINYINT through BIGINT)
    Integer(i64),

    /// A non-NULL cell whose column type is not decoded (wire type code)
    Unsupported(u8),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value was left undecoded.
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Value::Unsupported(_))
    }

    /// Get the type name of this value.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Unsupported(_) => "UNSUPPORTED",
        }
    }

    /// Try to convert this value to an i64.
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// The wire type code of an undecoded cell.
    pub const fn unsupported_type(&self) -> Option<u8> {
        match self {
            Value::Unsupported(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
