//! Client error types.

use thiserror::Error;

/// Errors that can occur on a database connection.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection failed or broke while in use.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server rejected the statement.
    #[error("query error {code} ({state}): {message}")]
    Query {
        /// MySQL error number (e.g. 1064 for a syntax error).
        code: u16,
        /// SQLSTATE value.
        state: String,
        /// Server-provided message.
        message: String,
    },

    /// Type conversion error.
    #[error("type error: {0}")]
    Type(#[from] tabula_types::TypeError),

    /// Requested column does not exist in the row.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid identifier (database or column name).
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Connection timeout occurred.
    #[error("connection timed out")]
    ConnectionTimeout,
}

impl Error {
    /// Create a query error from its parts.
    pub fn query(code: u16, state: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            code,
            state: state.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the connection itself is no longer usable.
    ///
    /// A connection that produced one of these errors must not be handed to
    /// another borrower.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::ConnectionClosed | Self::ConnectionTimeout | Self::Io(_)
        )
    }

    /// Check if this is a server error with a specific number.
    #[must_use]
    pub fn is_query_error(&self, code: u16) -> bool {
        matches!(self, Self::Query { code: c, .. } if *c == code)
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// Deadlocks (1213) and lock wait timeouts (1205) are transient along
    /// with connection-level failures.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.is_connection_error() || self.is_query_error(1213) || self.is_query_error(1205)
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
