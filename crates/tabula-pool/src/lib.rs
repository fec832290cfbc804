//! # tabula-pool
//!
//! Bounded connection pool with a fair waiter queue.
//!
//! ## Features
//!
//! - Lazily opened connections, up to `max_connections`
//! - Idle connections reused last-in first-out
//! - Waiters served strictly first-in first-out; a released connection is
//!   handed straight to the head waiter
//! - Connections that fault while checked out are destroyed, never reused
//! - Optional acquisition timeout
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tabula_client::mysql::MySqlConnector;
//! use tabula_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new()
//!     .max_connections(10)
//!     .acquire_timeout(Duration::from_secs(5));
//!
//! let pool = Pool::new(config, MySqlConnector::from_url("mysql://app@localhost/shop")?)?;
//! let mut conn = pool.acquire().await?;
//! conn.query("SELECT 1").await?;
//! pool.release(conn).await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use lifecycle::{ConnectionMetadata, ConnectionState};
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledConnection};
