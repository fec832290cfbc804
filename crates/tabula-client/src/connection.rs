//! The driver seam: a live session and the factory that opens one.
//!
//! The pool and the executor only ever talk to a database through these two
//! traits. The `mysql` feature provides an implementation over `mysql_async`;
//! `tabula-testing` provides a scripted one.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::row::{Column, Row};

/// The result of submitting one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    /// Columns of the first result set (empty for statements without rows).
    pub columns: Arc<[Column]>,
    /// Rows of the first result set.
    pub rows: Vec<Row>,
    /// Rows changed by a DML statement.
    pub affected_rows: u64,
    /// Auto-increment id generated by an `INSERT`, if any.
    pub last_insert_id: Option<u64>,
}

impl QueryOutcome {
    /// Outcome of a statement that returned rows.
    #[must_use]
    pub fn with_rows(columns: impl Into<Arc<[Column]>>, rows: Vec<Row>) -> Self {
        Self {
            columns: columns.into(),
            rows,
            ..Self::default()
        }
    }

    /// Outcome of a DML statement.
    #[must_use]
    pub fn with_affected(affected_rows: u64, last_insert_id: Option<u64>) -> Self {
        Self {
            affected_rows,
            last_insert_id,
            ..Self::default()
        }
    }

    /// Check whether the statement produced any rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A live handle bound to one database session.
///
/// A connection is never used by two borrowers at once; every method takes
/// `&mut self`.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Submit a statement and collect its first result set.
    async fn query(&mut self, sql: &str) -> Result<QueryOutcome>;

    /// Discard any result sets still pending on the wire.
    ///
    /// A stored-procedure `CALL` leaves a trailing status packet behind that
    /// must be consumed before the session can run another statement.
    async fn drain_pending(&mut self) -> Result<()>;

    /// Check whether the session is still usable without a round trip.
    fn is_valid(&self) -> bool;

    /// Close the session.
    async fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Opens new connections for a pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type this connector produces.
    type Connection: Connection;

    /// Open and authenticate a new session.
    async fn connect(&self) -> Result<Self::Connection>;
}
