//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur during type conversion.
#[derive(Debug, Error)]
pub enum TypeError {
    /// Value is null when non-null was expected.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// Type mismatch during conversion.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name.
        expected: &'static str,
        /// Actual type name.
        actual: String,
    },

    /// Value is out of range for target type.
    #[error("value out of range for {target_type}")]
    OutOfRange {
        /// Target type name.
        target_type: &'static str,
    },

    /// Text value could not be parsed as the requested type.
    ///
    /// MySQL's text protocol delivers every column as a string, so numeric
    /// and temporal accessors parse when they are handed text.
    #[error("cannot parse {value:?} as {target_type}")]
    Unparsable {
        /// Target type name.
        target_type: &'static str,
        /// Offending text.
        value: String,
    },

    /// Invalid date/time value.
    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    /// Invalid UUID value.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// Invalid string encoding in binary data.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),
}
