//! Literal escaping and identifier quoting for the MySQL dialect.
//!
//! These functions are the injection-safety boundary of the workspace. Values
//! become SQL text only through [`escape()`]; table and column names only
//! through [`quote_identifier()`].

use std::fmt::Write;

use crate::value::SqlValue;

/// Format a datetime the way MySQL expects a `DATETIME` literal.
///
/// Sub-second precision is dropped, matching a `DATETIME` column without
/// fractional seconds.
#[cfg(feature = "chrono")]
#[must_use]
pub fn to_sql_date(value: &chrono::NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Quote an identifier with backticks.
///
/// Embedded backticks are doubled, so the result always names exactly the
/// identifier that was passed in.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('`');
    for c in name.chars() {
        if c == '`' {
            out.push('`');
        }
        out.push(c);
    }
    out.push('`');
    out
}

/// Escape a string and wrap it in single quotes.
#[must_use]
pub fn escape_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{1a}' => out.push_str("\\Z"),
            '\'' | '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Render a value as a MySQL literal.
///
/// Non-finite floats have no literal form in MySQL and render as `NULL`.
#[must_use]
pub fn escape(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(v) => if *v { "true" } else { "false" }.to_string(),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::UInt(v) => v.to_string(),
        SqlValue::Double(v) if v.is_finite() => v.to_string(),
        SqlValue::Double(_) => "NULL".to_string(),
        SqlValue::String(v) => escape_str(v),
        SqlValue::Binary(v) => {
            let mut out = String::with_capacity(v.len() * 2 + 3);
            out.push_str("X'");
            for byte in v.iter() {
                let _ = write!(out, "{byte:02X}");
            }
            out.push('\'');
            out
        }
        #[cfg(feature = "decimal")]
        SqlValue::Decimal(v) => v.to_string(),
        #[cfg(feature = "uuid")]
        SqlValue::Uuid(v) => escape_str(&v.hyphenated().to_string()),
        #[cfg(feature = "chrono")]
        SqlValue::Date(v) => escape_str(&v.format("%Y-%m-%d").to_string()),
        #[cfg(feature = "chrono")]
        SqlValue::Time(v) => escape_str(&v.format("%H:%M:%S").to_string()),
        #[cfg(feature = "chrono")]
        SqlValue::DateTime(v) => escape_str(&to_sql_date(v)),
        #[cfg(feature = "json")]
        SqlValue::Json(v) => escape_str(&v.to_string()),
    }
}
