//! SQL value representation.

use bytes::Bytes;

/// A SQL value that can represent any MySQL column or literal.
///
/// This enum provides a type-safe way to handle SQL values that may be
/// of various types, including NULL.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
    /// NULL value.
    #[default]
    Null,
    /// Boolean value (`TINYINT(1)`).
    Bool(bool),
    /// Signed integer (`TINYINT` through `BIGINT`).
    Int(i64),
    /// Unsigned integer (`BIGINT UNSIGNED`, insert ids).
    UInt(u64),
    /// Floating point (`FLOAT`, `DOUBLE`).
    Double(f64),
    /// String value (`CHAR`, `VARCHAR`, `TEXT`).
    String(String),
    /// Binary value (`BINARY`, `VARBINARY`, `BLOB`).
    Binary(Bytes),
    /// Exact decimal (`DECIMAL`, `NUMERIC`).
    #[cfg(feature = "decimal")]
    Decimal(rust_decimal::Decimal),
    /// UUID, stored as `CHAR(36)`.
    #[cfg(feature = "uuid")]
    Uuid(uuid::Uuid),
    /// Date value (`DATE`).
    #[cfg(feature = "chrono")]
    Date(chrono::NaiveDate),
    /// Time value (`TIME`).
    #[cfg(feature = "chrono")]
    Time(chrono::NaiveTime),
    /// DateTime value (`DATETIME`, `TIMESTAMP`).
    #[cfg(feature = "chrono")]
    DateTime(chrono::NaiveDateTime),
    /// JSON document (`JSON`).
    #[cfg(feature = "json")]
    Json(serde_json::Value),
}

impl SqlValue {
    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an i64, if it is an integer that fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get the value as a u64, if it is a non-negative integer.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Get the value as an f64, if it is one.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as bytes, if it is binary.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(v) => Some(v),
            _ => None,
        }
    }

    /// Get the MySQL type name as a string.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "TINYINT(1)",
            Self::Int(_) => "BIGINT",
            Self::UInt(_) => "BIGINT UNSIGNED",
            Self::Double(_) => "DOUBLE",
            Self::String(_) => "VARCHAR",
            Self::Binary(_) => "BLOB",
            #[cfg(feature = "decimal")]
            Self::Decimal(_) => "DECIMAL",
            #[cfg(feature = "uuid")]
            Self::Uuid(_) => "CHAR(36)",
            #[cfg(feature = "chrono")]
            Self::Date(_) => "DATE",
            #[cfg(feature = "chrono")]
            Self::Time(_) => "TIME",
            #[cfg(feature = "chrono")]
            Self::DateTime(_) => "DATETIME",
            #[cfg(feature = "json")]
            Self::Json(_) => "JSON",
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(v))
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

#[cfg(feature = "uuid")]
impl From<uuid::Uuid> for SqlValue {
    fn from(v: uuid::Uuid) -> Self {
        Self::Uuid(v)
    }
}

#[cfg(feature = "decimal")]
impl From<rust_decimal::Decimal> for SqlValue {
    fn from(v: rust_decimal::Decimal) -> Self {
        Self::Decimal(v)
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::NaiveDate> for SqlValue {
    fn from(v: chrono::NaiveDate) -> Self {
        Self::Date(v)
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::NaiveTime> for SqlValue {
    fn from(v: chrono::NaiveTime) -> Self {
        Self::Time(v)
    }
}

#[cfg(feature = "chrono")]
impl From<chrono::NaiveDateTime> for SqlValue {
    fn from(v: chrono::NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

#[cfg(feature = "json")]
impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}
