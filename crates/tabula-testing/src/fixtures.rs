//! Test fixture utilities.

use tabula_client::SqlValue;
use tabula_types::quote_identifier;

use crate::mock::MockResponse;

/// Test database fixture for setting up and tearing down test data.
pub struct TestFixture {
    /// Database name.
    pub database: String,
    /// Tables created by this fixture, as `(name, column definitions)`.
    pub tables: Vec<(String, String)>,
}

impl TestFixture {
    /// Create a new test fixture.
    #[must_use]
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            tables: Vec::new(),
        }
    }

    /// Add a table to the fixture.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>, columns: impl Into<String>) -> Self {
        self.tables.push((table.into(), columns.into()));
        self
    }

    /// Generate SQL to create the test database.
    #[must_use]
    pub fn create_database_sql(&self) -> String {
        format!(
            "CREATE DATABASE IF NOT EXISTS {};",
            quote_identifier(&self.database)
        )
    }

    /// Generate SQL to drop the test database.
    #[must_use]
    pub fn drop_database_sql(&self) -> String {
        format!(
            "DROP DATABASE IF EXISTS {};",
            quote_identifier(&self.database)
        )
    }

    /// Generate SQL to create every table, in declaration order.
    #[must_use]
    pub fn create_tables_sql(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|(name, columns)| {
                format!(
                    "CREATE TABLE IF NOT EXISTS {}.{} ({columns});",
                    quote_identifier(&self.database),
                    quote_identifier(name)
                )
            })
            .collect()
    }
}

/// Sample `users` rows: `(id, name, age)`.
pub fn users() -> Vec<(i64, &'static str, i64)> {
    vec![(1, "Alice", 30), (2, "Bob", 25), (3, "Carol", 41)]
}

/// A `SELECT * FROM users` response built from [`users()`].
pub fn users_response() -> MockResponse {
    MockResponse::rows(
        ["id", "name", "age"],
        users()
            .into_iter()
            .map(|(id, name, age)| vec![SqlValue::Int(id), SqlValue::from(name), SqlValue::Int(age)])
            .collect(),
    )
}

/// An eager-load response for `users AS u` joined with `profiles AS p`.
///
/// Bob has no profile, so his `p+` columns are NULL.
pub fn users_with_profiles_response() -> MockResponse {
    MockResponse::rows(
        ["u+id", "u+name", "p+bio"],
        vec![
            vec![SqlValue::Int(1), SqlValue::from("Alice"), SqlValue::from("likes rust")],
            vec![SqlValue::Int(2), SqlValue::from("Bob"), SqlValue::Null],
        ],
    )
}
