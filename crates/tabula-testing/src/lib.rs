//! # tabula-testing
//!
//! Test infrastructure for tabula.
//!
//! This crate provides a scripted, in-process implementation of the
//! connection traits so that the pool and the executor can be tested without
//! a database server.
//!
//! ## Features
//!
//! - Scripted responses matched by exact SQL, or queued one-shot responses
//! - Fault injection: failing connects, broken connections, server errors
//! - Stored-procedure trailing result sets that must be drained
//! - Counters for opened/closed connections and an execution log
//! - Test fixture utilities
//!
//! ## Example
//!
//! ```rust,ignore
//! use tabula_pool::{Pool, PoolConfig};
//! use tabula_testing::{MockConnector, MockResponse};
//!
//! #[tokio::test]
//! async fn test_with_mock() {
//!     let connector = MockConnector::builder()
//!         .with_default_response(MockResponse::affected(1))
//!         .build();
//!
//!     let pool = Pool::new(PoolConfig::new().max_connections(2), connector.clone()).unwrap();
//!     let mut conn = pool.acquire().await.unwrap();
//!     conn.query("DELETE FROM `users` WHERE `id`=1 LIMIT 1").await.unwrap();
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock;

pub use fixtures::TestFixture;
pub use mock::{MockConnection, MockConnector, MockConnectorBuilder, MockResponse};
