//! # tabula-client
//!
//! The connection layer of tabula: the [`Connection`] and [`Connector`]
//! traits every other crate talks to, the result [`Row`] model, connection
//! [`Config`], and the client [`Error`] type.
//!
//! ## Features
//!
//! - `chrono`, `uuid`, `decimal` (default): forwarded to `tabula-types`
//! - `json`: forwarded to `tabula-types`
//! - `mysql`: a [`Connector`] over `mysql_async`
//!
//! ## Example
//!
//! ```rust,ignore
//! use tabula_client::{Config, Connection, Connector};
//! use tabula_client::mysql::MySqlConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_connection_string(
//!         "Server=localhost;Database=shop;User Id=app;Password=secret;"
//!     )?;
//!
//!     let connector = MySqlConnector::new(config)?;
//!     let mut conn = connector.connect().await?;
//!
//!     let outcome = conn.query("SELECT `id`, `name` FROM `users`;").await?;
//!     for row in &outcome.rows {
//!         let name: String = row.get_by_name("name")?;
//!         println!("User: {name}");
//!     }
//!
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod from_row;
pub mod instrumentation;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod row;

// Re-export commonly used types
pub use config::Config;
pub use connection::{Connection, Connector, QueryOutcome};
pub use error::{Error, Result};
pub use from_row::{FromRow, MapRows, RowIteratorExt};
pub use row::{Column, Row};
pub use tabula_types::{FromSql, SqlValue};
