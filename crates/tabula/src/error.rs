//! Error types for query execution.

use std::fmt;

use tabula_client::Error as ClientError;
use tabula_pool::PoolError;
use tabula_sql::CompileError;
use tabula_types::TypeError;
use thiserror::Error;

/// Errors surfaced by the executor.
#[derive(Debug, Error)]
pub enum Error {
    /// A connection could not be acquired.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The connection or the server reported an error.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The statement could not be compiled.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A row value could not be converted while building a model.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// A model rejected a row or returned an unexpected result shape.
    #[error("model error: {0}")]
    Model(String),
}

impl Error {
    /// Check if the connection itself failed, as opposed to the statement.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Client(e) => e.is_connection_error(),
            Self::Pool(PoolError::ConnectionCreation(_)) => true,
            _ => false,
        }
    }

    /// Check if this is a server error with the given MySQL error code.
    #[must_use]
    pub fn is_query_error(&self, code: u16) -> bool {
        matches!(self, Self::Client(e) if e.is_query_error(code))
    }
}

/// Result type for executor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A failed query, carrying the instance it was run for.
///
/// Saving or destroying a model moves the model into the request; on failure
/// it comes back here so the caller keeps it.
pub struct Failure<M> {
    /// What went wrong.
    pub error: Error,
    /// The instance the query was run for, if any.
    pub subject: Option<M>,
}

impl<M> Failure<M> {
    /// A failure with no subject.
    pub fn new(error: impl Into<Error>) -> Self {
        Self {
            error: error.into(),
            subject: None,
        }
    }

    /// A failure for `subject`.
    pub fn with_subject(error: impl Into<Error>, subject: Option<M>) -> Self {
        Self {
            error: error.into(),
            subject,
        }
    }

    /// Discard the subject.
    pub fn into_error(self) -> Error {
        self.error
    }
}

impl<M> From<Error> for Failure<M> {
    fn from(error: Error) -> Self {
        Self::new(error)
    }
}

impl<M: fmt::Debug> fmt::Debug for Failure<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("error", &self.error)
            .field("subject", &self.subject)
            .finish()
    }
}

impl<M> fmt::Display for Failure<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<M: fmt::Debug> std::error::Error for Failure<M> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
