//! Scripted in-process connections for unit and integration tests.
//!
//! [`MockConnector`] implements [`Connector`] without any network I/O.
//! Responses are matched by exact SQL text; statements without a match get
//! the default response. One-shot responses queued with
//! [`MockConnector::push_response`] take priority over both, in order.
//!
//! ## Example
//!
//! ```rust
//! use tabula_client::{Connection, Connector, SqlValue};
//! use tabula_testing::mock::{MockConnector, MockResponse};
//!
//! # tokio_test::block_on(async {
//! let connector = MockConnector::builder()
//!     .with_response(
//!         "SELECT `id` FROM `users`;",
//!         MockResponse::rows(["id"], vec![vec![SqlValue::Int(1)]]),
//!     )
//!     .build();
//!
//! let mut conn = connector.connect().await.unwrap();
//! let outcome = conn.query("SELECT `id` FROM `users`;").await.unwrap();
//! assert_eq!(outcome.rows.len(), 1);
//! assert_eq!(connector.connects(), 1);
//! # });
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tabula_client::{Column, Connection, Connector, Error, QueryOutcome, Result, Row, SqlValue};

/// MySQL client error for a statement sent while results are still pending.
pub const COMMANDS_OUT_OF_SYNC: u16 = 2014;

/// Mock response configuration.
#[derive(Clone)]
pub enum MockResponse {
    /// Return rows.
    Rows {
        /// Column names.
        columns: Vec<String>,
        /// Row data.
        rows: Vec<Vec<SqlValue>>,
    },

    /// Return an affected-row count and optional insert id.
    Affected {
        /// Rows changed.
        rows: u64,
        /// Generated auto-increment id.
        last_insert_id: Option<u64>,
    },

    /// Fail the statement with a server error. The connection stays usable.
    Error {
        /// MySQL error number.
        code: u16,
        /// Error message.
        message: String,
    },

    /// Break the connection. The statement fails with a connection error and
    /// the connection reports itself invalid from then on.
    Fault(String),

    /// Answer with the inner response, then leave a trailing result set that
    /// must be drained before the next statement.
    Procedure(Box<MockResponse>),

    /// Compute the response from the SQL text.
    Custom(Arc<dyn Fn(&str) -> MockResponse + Send + Sync>),
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rows { columns, rows } => f
                .debug_struct("Rows")
                .field("columns", columns)
                .field("rows", &rows.len())
                .finish(),
            Self::Affected {
                rows,
                last_insert_id,
            } => f
                .debug_struct("Affected")
                .field("rows", rows)
                .field("last_insert_id", last_insert_id)
                .finish(),
            Self::Error { code, message } => f
                .debug_struct("Error")
                .field("code", code)
                .field("message", message)
                .finish(),
            Self::Fault(reason) => f.debug_tuple("Fault").field(reason).finish(),
            Self::Procedure(inner) => f.debug_tuple("Procedure").field(inner).finish(),
            Self::Custom(_) => f.debug_tuple("Custom").field(&"<fn>").finish(),
        }
    }
}

impl MockResponse {
    /// Create an empty result response.
    pub fn empty() -> Self {
        Self::affected(0)
    }

    /// Create a rows affected response.
    pub fn affected(count: u64) -> Self {
        Self::Affected {
            rows: count,
            last_insert_id: None,
        }
    }

    /// Create an insert response carrying a generated id.
    pub fn inserted(id: u64) -> Self {
        Self::Affected {
            rows: 1,
            last_insert_id: Some(id),
        }
    }

    /// Create a server error response.
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a connection fault.
    pub fn fault(reason: impl Into<String>) -> Self {
        Self::Fault(reason.into())
    }

    /// Create a multi-row response.
    pub fn rows<I, S>(columns: I, rows: Vec<Vec<SqlValue>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Rows {
            columns: columns.into_iter().map(Into::into).collect(),
            rows,
        }
    }

    /// Wrap a response so it behaves like a stored-procedure call.
    pub fn procedure(inner: MockResponse) -> Self {
        Self::Procedure(Box::new(inner))
    }

    /// Create a response computed from the SQL text.
    pub fn custom(f: impl Fn(&str) -> MockResponse + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }
}

#[derive(Default)]
struct MockState {
    responses: Mutex<HashMap<String, MockResponse>>,
    queued: Mutex<VecDeque<MockResponse>>,
    default_response: Mutex<Option<MockResponse>>,
    executed: Mutex<Vec<(usize, String)>>,
    invalidated: Mutex<HashSet<usize>>,
    failing_connects: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
    drains: AtomicUsize,
    query_delay: Mutex<Option<Duration>>,
    connect_delay: Option<Duration>,
    close_delay: Option<Duration>,
}

/// Builder for [`MockConnector`].
#[derive(Default)]
pub struct MockConnectorBuilder {
    responses: HashMap<String, MockResponse>,
    default_response: Option<MockResponse>,
    query_delay: Option<Duration>,
    connect_delay: Option<Duration>,
    close_delay: Option<Duration>,
}

impl MockConnectorBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a response for an exact SQL statement.
    #[must_use]
    pub fn with_response(mut self, sql: impl Into<String>, response: MockResponse) -> Self {
        self.responses.insert(sql.into(), response);
        self
    }

    /// Set the response for statements without a match.
    #[must_use]
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Delay every statement, keeping connections checked out longer.
    #[must_use]
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    /// Delay every connection attempt.
    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Delay every graceful close.
    #[must_use]
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = Some(delay);
        self
    }

    /// Build the connector.
    pub fn build(self) -> MockConnector {
        let state = MockState {
            responses: Mutex::new(self.responses),
            default_response: Mutex::new(self.default_response),
            query_delay: Mutex::new(self.query_delay),
            connect_delay: self.connect_delay,
            close_delay: self.close_delay,
            ..MockState::default()
        };
        MockConnector {
            state: Arc::new(state),
        }
    }
}

/// A [`Connector`] producing scripted [`MockConnection`]s.
///
/// Clones share state, so a test can keep one handle while the pool owns
/// another.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnector")
            .field("connects", &self.connects())
            .field("closes", &self.closes())
            .finish_non_exhaustive()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MockConnector {
    /// Create a builder.
    pub fn builder() -> MockConnectorBuilder {
        MockConnectorBuilder::new()
    }

    /// Add or replace a response for an exact SQL statement.
    pub fn set_response(&self, sql: impl Into<String>, response: MockResponse) {
        self.state.responses.lock().insert(sql.into(), response);
    }

    /// Queue a one-shot response for the next statement on any connection.
    pub fn push_response(&self, response: MockResponse) {
        self.state.queued.lock().push_back(response);
    }

    /// Make the next `count` connection attempts fail.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Mark a connection as no longer valid, as if the server dropped it.
    pub fn invalidate(&self, connection_id: usize) {
        self.state.invalidated.lock().insert(connection_id);
    }

    /// Number of connections successfully opened.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of connections closed.
    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Number of times pending results were drained.
    pub fn drains(&self) -> usize {
        self.state.drains.load(Ordering::SeqCst)
    }

    /// Every statement executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state
            .executed
            .lock()
            .iter()
            .map(|(_, sql)| sql.clone())
            .collect()
    }

    /// Statements executed on one connection.
    pub fn executed_on(&self, connection_id: usize) -> Vec<String> {
        self.state
            .executed
            .lock()
            .iter()
            .filter(|(id, _)| *id == connection_id)
            .map(|(_, sql)| sql.clone())
            .collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection> {
        match self.state.connect_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let failing = self.state.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.state
                .failing_connects
                .store(failing - 1, Ordering::SeqCst);
            return Err(Error::Connection("connection refused".into()));
        }

        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(connection_id = id, "mock connection opened");

        Ok(MockConnection {
            id,
            state: Arc::clone(&self.state),
            broken: false,
            pending: false,
        })
    }
}

/// A scripted connection.
pub struct MockConnection {
    id: usize,
    state: Arc<MockState>,
    broken: bool,
    pending: bool,
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("broken", &self.broken)
            .field("pending", &self.pending)
            .finish()
    }
}

impl MockConnection {
    /// Connection id, starting at 1 in open order.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Check whether a trailing result set is waiting to be drained.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    fn next_response(&self, sql: &str) -> Option<MockResponse> {
        if let Some(response) = self.state.queued.lock().pop_front() {
            return Some(response);
        }
        if let Some(response) = self.state.responses.lock().get(sql) {
            return Some(response.clone());
        }
        self.state.default_response.lock().clone()
    }

    fn answer(&mut self, response: MockResponse, sql: &str) -> Result<QueryOutcome> {
        match response {
            MockResponse::Rows { columns, rows } => {
                let columns: Arc<[Column]> = columns
                    .into_iter()
                    .enumerate()
                    .map(|(i, name)| Column::new(name, i, "VARCHAR"))
                    .collect();
                let rows = rows
                    .into_iter()
                    .map(|values| Row::from_values(Arc::clone(&columns), values))
                    .collect();
                Ok(QueryOutcome::with_rows(columns, rows))
            }
            MockResponse::Affected {
                rows,
                last_insert_id,
            } => Ok(QueryOutcome::with_affected(rows, last_insert_id)),
            MockResponse::Error { code, message } => Err(Error::query(code, "HY000", message)),
            MockResponse::Fault(reason) => {
                self.broken = true;
                Err(Error::Connection(reason))
            }
            MockResponse::Procedure(inner) => {
                let outcome = self.answer(*inner, sql);
                self.pending = true;
                outcome
            }
            MockResponse::Custom(f) => self.answer(f(sql), sql),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&mut self, sql: &str) -> Result<QueryOutcome> {
        let delay = *self.state.query_delay.lock();
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        self.state.executed.lock().push((self.id, sql.to_string()));

        if self.broken {
            return Err(Error::ConnectionClosed);
        }
        if self.pending {
            return Err(Error::query(
                COMMANDS_OUT_OF_SYNC,
                "HY000",
                "Commands out of sync; you can't run this command now",
            ));
        }

        match self.next_response(sql) {
            Some(response) => self.answer(response, sql),
            None => Err(Error::query(
                1064,
                "42000",
                format!("no mock response for: {sql}"),
            )),
        }
    }

    async fn drain_pending(&mut self) -> Result<()> {
        if self.pending {
            self.pending = false;
            self.state.drains.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.broken && !self.state.invalidated.lock().contains(&self.id)
    }

    async fn close(self) -> Result<()> {
        if let Some(delay) = self.state.close_delay {
            tokio::time::sleep(delay).await;
        }
        tracing::trace!(connection_id = self.id, "mock connection closed");
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exact_match_then_default() {
        let connector = MockConnector::builder()
            .with_response("SELECT 1", MockResponse::rows(["one"], vec![vec![SqlValue::Int(1)]]))
            .with_default_response(MockResponse::affected(3))
            .build();

        let mut conn = connector.connect().await.unwrap();
        assert_eq!(conn.query("SELECT 1").await.unwrap().rows.len(), 1);
        assert_eq!(conn.query("DELETE FROM t").await.unwrap().affected_rows, 3);
        assert_eq!(connector.executed(), vec!["SELECT 1", "DELETE FROM t"]);
    }

    #[tokio::test]
    async fn test_unmatched_statement_is_query_error() {
        let connector = MockConnector::default();
        let mut conn = connector.connect().await.unwrap();
        let err = conn.query("SELECT 2").await.unwrap_err();
        assert!(err.is_query_error(1064));
        assert!(conn.is_valid());
    }

    #[tokio::test]
    async fn test_queued_responses_take_priority() {
        let connector = MockConnector::builder()
            .with_default_response(MockResponse::empty())
            .build();
        connector.push_response(MockResponse::inserted(41));

        let mut conn = connector.connect().await.unwrap();
        let first = conn.query("INSERT INTO t VALUES (1)").await.unwrap();
        assert_eq!(first.last_insert_id, Some(41));
        let second = conn.query("INSERT INTO t VALUES (2)").await.unwrap();
        assert_eq!(second.last_insert_id, None);
    }

    #[tokio::test]
    async fn test_fault_breaks_connection() {
        let connector = MockConnector::default();
        connector.push_response(MockResponse::fault("server has gone away"));

        let mut conn = connector.connect().await.unwrap();
        let err = conn.query("SELECT 1").await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(!conn.is_valid());
        assert!(matches!(
            conn.query("SELECT 1").await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_procedure_requires_drain() {
        let connector = MockConnector::builder()
            .with_default_response(MockResponse::empty())
            .build();
        connector.push_response(MockResponse::procedure(MockResponse::empty()));

        let mut conn = connector.connect().await.unwrap();
        conn.query("CALL refresh()").await.unwrap();
        assert!(conn.has_pending());

        let err = conn.query("SELECT 1").await.unwrap_err();
        assert!(err.is_query_error(COMMANDS_OUT_OF_SYNC));

        conn.drain_pending().await.unwrap();
        assert!(conn.query("SELECT 1").await.is_ok());
        assert_eq!(connector.drains(), 1);
    }

    #[tokio::test]
    async fn test_failing_connects_and_invalidate() {
        let connector = MockConnector::default();
        connector.fail_next_connects(1);
        assert!(connector.connect().await.is_err());

        let conn = connector.connect().await.unwrap();
        assert_eq!(conn.id(), 1);
        connector.invalidate(conn.id());
        assert!(!conn.is_valid());

        conn.close().await.unwrap();
        assert_eq!(connector.closes(), 1);
    }
}
