//! # tabula-types
//!
//! MySQL value model and literal escaping.
//!
//! This crate owns the single place where Rust values become SQL text. Every
//! literal that reaches a statement goes through [`escape()`], and every
//! identifier goes through [`quote_identifier()`]. Nothing else in the
//! workspace is allowed to splice a value into SQL.
//!
//! ## Features
//!
//! - `chrono` (default): date/time values via chrono
//! - `uuid` (default): UUID values, written as quoted strings
//! - `decimal` (default): exact decimals via rust_decimal
//! - `json`: JSON documents via serde_json
//!
//! ## Type Mappings
//!
//! | MySQL Type | Rust Type |
//! |------------|-----------|
//! | `TINYINT(1)` | `bool` |
//! | `INT` / `BIGINT` | `i32` / `i64` |
//! | `BIGINT UNSIGNED` | `u64` |
//! | `DOUBLE` | `f64` |
//! | `DECIMAL` | `rust_decimal::Decimal` |
//! | `VARCHAR` / `TEXT` | `String` |
//! | `BLOB` | `Vec<u8>` |
//! | `DATE` | `chrono::NaiveDate` |
//! | `TIME` | `chrono::NaiveTime` |
//! | `DATETIME` | `chrono::NaiveDateTime` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod escape;
pub mod from_sql;
pub mod value;

/// Separator between a join-plan prefix and an attribute name in projected
/// column aliases, e.g. `` `u+name` ``.
pub const ALIAS_SEPARATOR: char = '+';

pub use error::TypeError;
pub use escape::{escape, escape_str, quote_identifier};
#[cfg(feature = "chrono")]
pub use escape::to_sql_date;
pub use from_sql::FromSql;
pub use value::SqlValue;
