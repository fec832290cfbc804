//! Statement compilation errors.

use thiserror::Error;

/// Errors raised while compiling a statement.
///
/// Compilation happens before any connection is touched, so these never
/// affect pool state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A filter map had no entries.
    #[error("filter has no conditions")]
    EmptyFilter,

    /// An `IN` condition was given an empty list.
    #[error("empty IN list for column {0}")]
    EmptyInList(String),

    /// A format filter had a different number of `?` placeholders than
    /// arguments.
    #[error("format filter has {placeholders} placeholders but {arguments} arguments")]
    PlaceholderMismatch {
        /// Placeholders found in the template.
        placeholders: usize,
        /// Arguments supplied.
        arguments: usize,
    },

    /// An insert or update was given no values.
    #[error("{0} requires at least one value")]
    EmptyValues(&'static str),

    /// An upsert key is not among the inserted values.
    #[error("upsert key {0} is not an inserted column")]
    UnknownUpsertKey(String),

    /// Two nodes of a join plan share an alias prefix.
    #[error("join plan uses prefix {0} more than once")]
    DuplicatePrefix(String),
}
