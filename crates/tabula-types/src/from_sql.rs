//! Trait for converting from SQL values to Rust types.

use crate::error::TypeError;
use crate::value::SqlValue;

/// Trait for types that can be converted from SQL values.
///
/// Implementations accept the typed variant and, because MySQL's text
/// protocol returns every column as a string, also parse from
/// [`SqlValue::String`] where that is unambiguous.
pub trait FromSql: Sized {
    /// Convert from a SQL value to this type.
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError>;

    /// Convert from an optional SQL value.
    ///
    /// Returns `None` if the value is NULL.
    fn from_sql_nullable(value: &SqlValue) -> Result<Option<Self>, TypeError> {
        if value.is_null() {
            Ok(None)
        } else {
            Self::from_sql(value).map(Some)
        }
    }
}

fn mismatch(expected: &'static str, value: &SqlValue) -> TypeError {
    match value {
        SqlValue::Null => TypeError::UnexpectedNull,
        _ => TypeError::TypeMismatch {
            expected,
            actual: value.type_name().to_string(),
        },
    }
}

fn parse_text<T: std::str::FromStr>(target_type: &'static str, text: &str) -> Result<T, TypeError> {
    text.trim().parse().map_err(|_| TypeError::Unparsable {
        target_type,
        value: text.to_string(),
    })
}

impl FromSql for SqlValue {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        Ok(value.clone())
    }
}

impl FromSql for bool {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Bool(v) => Ok(*v),
            SqlValue::Int(v) => Ok(*v != 0),
            SqlValue::UInt(v) => Ok(*v != 0),
            SqlValue::String(s) => Ok(parse_text::<i64>("bool", s)? != 0),
            _ => Err(mismatch("bool", value)),
        }
    }
}

impl FromSql for i64 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Int(v) => Ok(*v),
            SqlValue::UInt(v) => {
                i64::try_from(*v).map_err(|_| TypeError::OutOfRange { target_type: "i64" })
            }
            SqlValue::Bool(v) => Ok(i64::from(*v)),
            SqlValue::String(s) => parse_text("i64", s),
            _ => Err(mismatch("i64", value)),
        }
    }
}

impl FromSql for i32 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        let wide = i64::from_sql(value).map_err(|e| match e {
            TypeError::TypeMismatch { actual, .. } => TypeError::TypeMismatch {
                expected: "i32",
                actual,
            },
            other => other,
        })?;
        i32::try_from(wide).map_err(|_| TypeError::OutOfRange { target_type: "i32" })
    }
}

impl FromSql for u64 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::UInt(v) => Ok(*v),
            SqlValue::Int(v) => {
                u64::try_from(*v).map_err(|_| TypeError::OutOfRange { target_type: "u64" })
            }
            SqlValue::String(s) => parse_text("u64", s),
            _ => Err(mismatch("u64", value)),
        }
    }
}

impl FromSql for f64 {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Double(v) => Ok(*v),
            SqlValue::Int(v) => Ok(*v as f64),
            SqlValue::UInt(v) => Ok(*v as f64),
            SqlValue::String(s) => parse_text("f64", s),
            _ => Err(mismatch("f64", value)),
        }
    }
}

impl FromSql for String {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::String(v) => Ok(v.clone()),
            SqlValue::Binary(v) => String::from_utf8(v.to_vec())
                .map_err(|e| TypeError::InvalidEncoding(e.to_string())),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromSql for Vec<u8> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Binary(v) => Ok(v.to_vec()),
            SqlValue::String(v) => Ok(v.as_bytes().to_vec()),
            _ => Err(mismatch("Vec<u8>", value)),
        }
    }
}

impl<T: FromSql> FromSql for Option<T> {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        T::from_sql_nullable(value)
    }
}

#[cfg(feature = "uuid")]
impl FromSql for uuid::Uuid {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Uuid(v) => Ok(*v),
            SqlValue::String(s) => {
                uuid::Uuid::parse_str(s).map_err(|e| TypeError::InvalidUuid(e.to_string()))
            }
            _ => Err(mismatch("Uuid", value)),
        }
    }
}

#[cfg(feature = "decimal")]
impl FromSql for rust_decimal::Decimal {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Decimal(v) => Ok(*v),
            SqlValue::Int(v) => Ok(rust_decimal::Decimal::from(*v)),
            SqlValue::String(s) => parse_text("Decimal", s),
            _ => Err(mismatch("Decimal", value)),
        }
    }
}

#[cfg(feature = "chrono")]
impl FromSql for chrono::NaiveDate {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Date(v) => Ok(*v),
            SqlValue::DateTime(v) => Ok(v.date()),
            SqlValue::String(s) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| TypeError::InvalidDateTime(e.to_string())),
            _ => Err(mismatch("NaiveDate", value)),
        }
    }
}

#[cfg(feature = "chrono")]
impl FromSql for chrono::NaiveTime {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Time(v) => Ok(*v),
            SqlValue::String(s) => chrono::NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .map_err(|e| TypeError::InvalidDateTime(e.to_string())),
            _ => Err(mismatch("NaiveTime", value)),
        }
    }
}

#[cfg(feature = "chrono")]
impl FromSql for chrono::NaiveDateTime {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::DateTime(v) => Ok(*v),
            SqlValue::Date(v) => Ok(v.and_time(chrono::NaiveTime::MIN)),
            SqlValue::String(s) => chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|e| TypeError::InvalidDateTime(e.to_string())),
            _ => Err(mismatch("NaiveDateTime", value)),
        }
    }
}

#[cfg(feature = "json")]
impl FromSql for serde_json::Value {
    fn from_sql(value: &SqlValue) -> Result<Self, TypeError> {
        match value {
            SqlValue::Json(v) => Ok(v.clone()),
            SqlValue::String(s) => serde_json::from_str(s).map_err(|e| TypeError::Unparsable {
                target_type: "JSON",
                value: e.to_string(),
            }),
            _ => Err(mismatch("JSON", value)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_text_protocol_parsing() {
        let text = SqlValue::String("42".into());
        assert_eq!(i64::from_sql(&text).unwrap(), 42);
        assert_eq!(i32::from_sql(&text).unwrap(), 42);
        assert_eq!(u64::from_sql(&text).unwrap(), 42);
        assert!(bool::from_sql(&SqlValue::String("1".into())).unwrap());
    }

    #[test]
    fn test_unparsable_text() {
        let err = i64::from_sql(&SqlValue::String("forty".into())).unwrap_err();
        assert!(matches!(err, TypeError::Unparsable { target_type: "i64", .. }));
    }

    #[test]
    fn test_i32_out_of_range() {
        let err = i32::from_sql(&SqlValue::Int(i64::MAX)).unwrap_err();
        assert!(matches!(err, TypeError::OutOfRange { target_type: "i32" }));
    }

    #[test]
    fn test_null_handling() {
        assert!(matches!(
            i64::from_sql(&SqlValue::Null),
            Err(TypeError::UnexpectedNull)
        ));
        assert_eq!(Option::<i64>::from_sql(&SqlValue::Null).unwrap(), None);
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn test_datetime_from_text() {
        let value = SqlValue::String("2011-02-03 04:05:06".into());
        let dt = chrono::NaiveDateTime::from_sql(&value).unwrap();
        assert_eq!(dt.to_string(), "2011-02-03 04:05:06");
    }
}
