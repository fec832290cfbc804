//! Pool error types.

use thiserror::Error;

/// Errors that can occur during pool operations.
///
/// Running out of connections is not an error: excess demand waits in the
/// queue.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to acquire a connection within the timeout.
    #[error("connection acquisition timeout after {0:?}")]
    AcquisitionTimeout(std::time::Duration),

    /// Pool is closed.
    #[error("pool is closed")]
    PoolClosed,

    /// Connection creation failed.
    #[error("failed to create connection: {0}")]
    ConnectionCreation(#[source] tabula_client::Error),

    /// Pool configuration error.
    #[error("pool configuration error: {0}")]
    Configuration(String),
}

impl PoolError {
    /// Check if retrying the acquire could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::AcquisitionTimeout(_) => true,
            Self::ConnectionCreation(e) => e.is_transient(),
            Self::PoolClosed | Self::Configuration(_) => false,
        }
    }
}
