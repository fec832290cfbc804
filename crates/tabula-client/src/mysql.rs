//! MySQL driver built on `mysql_async`.
//!
//! Statements run over the text protocol, so almost every value arrives as
//! bytes and is parsed on demand by [`FromSql`](tabula_types::FromSql).

use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use tracing::Instrument;
use tabula_types::SqlValue;

use crate::config::Config;
use crate::connection::{Connection, Connector, QueryOutcome};
use crate::error::{Error, Result};
use crate::instrumentation::{DB_SYSTEM, SanitizationConfig, extract_operation, span_names};
use crate::row::{Column, Row};

/// Opens `mysql_async` sessions from a [`Config`].
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    config: Config,
}

impl MySqlConnector {
    /// Create a connector, validating the configuration up front.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create a connector from a `mysql://` URL.
    pub fn from_url(url: &str) -> Result<Self> {
        Self::new(Config::from_url(url)?)
    }

    /// The configuration this connector uses.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn opts(&self) -> mysql_async::OptsBuilder {
        mysql_async::OptsBuilder::default()
            .ip_or_hostname(self.config.host.clone())
            .tcp_port(self.config.port)
            .user(Some(self.config.user.clone()))
            .pass(self.config.password.clone())
            .db_name(self.config.database.clone())
            .client_found_rows(true)
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Connection = MySqlConnection;

    async fn connect(&self) -> Result<MySqlConnection> {
        tracing::debug!(
            host = %self.config.host,
            port = self.config.port,
            database = ?self.config.database,
            "opening mysql connection"
        );

        let span = tracing::debug_span!(
            span_names::CONNECT,
            db.system = DB_SYSTEM,
            server.address = %self.config.host,
            server.port = self.config.port,
        );
        let conn = tokio::time::timeout(
            self.config.connect_timeout,
            mysql_async::Conn::new(self.opts()),
        )
        .instrument(span)
        .await
        .map_err(|_| Error::ConnectionTimeout)?
        .map_err(map_error)?;

        Ok(MySqlConnection {
            conn,
            broken: false,
            trailing_sets: 0,
        })
    }
}

/// A single `mysql_async` session.
#[derive(Debug)]
pub struct MySqlConnection {
    conn: mysql_async::Conn,
    broken: bool,
    trailing_sets: usize,
}

impl MySqlConnection {
    /// Number of extra result sets consumed since the last drain.
    #[must_use]
    pub fn trailing_sets(&self) -> usize {
        self.trailing_sets
    }

    async fn run(&mut self, sql: &str) -> Result<QueryOutcome> {
        let mut result = self.conn.query_iter(sql).await.map_err(map_error)?;

        let columns: Arc<[Column]> = result
            .columns()
            .map(|cols| {
                cols.iter()
                    .enumerate()
                    .map(|(i, c)| {
                        Column::new(c.name_str(), i, format!("{:?}", c.column_type()))
                    })
                    .collect()
            })
            .unwrap_or_else(|| Arc::from(Vec::new()));

        let raw: Vec<mysql_async::Row> = result.collect().await.map_err(map_error)?;
        let affected_rows = result.affected_rows();
        let last_insert_id = result.last_insert_id().filter(|id| *id != 0);

        // Procedure calls end with an extra status result set; it has to be
        // consumed while the result borrows the session.
        while !result.is_empty() {
            result.drop_result().await.map_err(map_error)?;
            self.trailing_sets += 1;
        }

        let rows = raw
            .iter()
            .map(|row| {
                let values = (0..row.len())
                    .map(|i| row.as_ref(i).map_or(SqlValue::Null, convert_value))
                    .collect();
                Row::from_values(Arc::clone(&columns), values)
            })
            .collect();

        Ok(QueryOutcome {
            columns,
            rows,
            affected_rows,
            last_insert_id,
        })
    }
}

#[async_trait]
impl Connection for MySqlConnection {
    async fn query(&mut self, sql: &str) -> Result<QueryOutcome> {
        tracing::trace!(
            operation = extract_operation(sql),
            statement = %SanitizationConfig::default().sanitize(sql),
            "mysql query"
        );

        let outcome = self.run(sql).await;
        if let Err(e) = &outcome {
            if e.is_connection_error() {
                tracing::warn!(error = %e, "mysql connection faulted");
                self.broken = true;
            }
        }
        outcome
    }

    async fn drain_pending(&mut self) -> Result<()> {
        if self.trailing_sets > 0 {
            tracing::trace!(sets = self.trailing_sets, "drained trailing result sets");
            self.trailing_sets = 0;
        }
        Ok(())
    }

    fn is_valid(&self) -> bool {
        !self.broken
    }

    async fn close(self) -> Result<()> {
        self.conn.disconnect().await.map_err(map_error)
    }
}

fn convert_value(value: &mysql_async::Value) -> SqlValue {
    use mysql_async::Value;

    match value {
        Value::NULL => SqlValue::Null,
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => SqlValue::String(s.to_string()),
            Err(_) => SqlValue::Binary(bytes.clone().into()),
        },
        Value::Int(v) => SqlValue::Int(*v),
        Value::UInt(v) => SqlValue::UInt(*v),
        Value::Float(v) => SqlValue::Double(f64::from(*v)),
        Value::Double(v) => SqlValue::Double(*v),
        Value::Date(year, month, day, hour, minute, second, micros) => SqlValue::String(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
        )),
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u32::from(*hours) + days * 24;
            SqlValue::String(format!(
                "{sign}{hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}

fn map_error(err: mysql_async::Error) -> Error {
    match err {
        mysql_async::Error::Server(e) => Error::query(e.code, e.state, e.message),
        mysql_async::Error::Io(e) => Error::Connection(e.to_string()),
        mysql_async::Error::Driver(e) => Error::Connection(e.to_string()),
        mysql_async::Error::Url(e) => Error::Config(e.to_string()),
        other => Error::Connection(other.to_string()),
    }
}
