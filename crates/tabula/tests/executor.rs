//! Query executor integration tests.
//!
//! Every test runs against `tabula-testing`'s scripted connector and checks
//! both what the caller gets back and what the pool looks like afterwards.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use indexmap::IndexMap;
use tabula::{
    BuildOptions, Error, Filter, JoinPlanNode, Materialized, Model, Pool, PoolConfig, PoolError,
    QueryExecutor, QueryOptions, QueryRequest, Row, SaveOptions, SelectOptions, SqlValue,
    own_columns,
};
use tabula_client::FromRow;
use tabula_sql::{AssociationOptions, HasOne};
use tabula_testing::fixtures::{users_response, users_with_profiles_response};
use tabula_testing::{MockConnector, MockResponse};

// ============================================================================
// Test Models
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: Option<i64>,
    name: String,
    age: Option<i64>,
    profile: Option<Profile>,
    new_record: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct Profile {
    bio: String,
}

impl User {
    fn new(name: &str, age: i64) -> Self {
        Self {
            id: None,
            name: name.to_owned(),
            age: Some(age),
            profile: None,
            new_record: true,
        }
    }
}

impl Model for User {
    fn table_name() -> &'static str {
        "users"
    }

    fn build(row: &Row, options: BuildOptions, fill_plan: Option<&JoinPlanNode>) -> tabula::Result<Self> {
        let own = own_columns(row, fill_plan);
        let profile = fill_plan
            .and_then(|plan| plan.find("p"))
            .map(|node| row.scoped(node.prefix()))
            .filter(|scoped| !scoped.is_all_null())
            .map(|scoped| scoped.get_by_name::<String>("bio"))
            .transpose()?
            .map(|bio| Profile { bio });

        Ok(Self {
            id: Some(own.get_by_name("id")?),
            name: own.get_by_name("name")?,
            age: own.try_get_by_name("age"),
            profile,
            new_record: options.is_new_record,
        })
    }

    fn attributes(&self) -> IndexMap<String, SqlValue> {
        let mut values = IndexMap::new();
        values.insert("name".to_owned(), SqlValue::from(self.name.as_str()));
        values.insert("age".to_owned(), SqlValue::from(self.age));
        values
    }

    fn identifier(&self) -> Filter {
        Filter::Id(self.id.unwrap_or_default())
    }

    fn is_new_record(&self) -> bool {
        self.new_record
    }

    fn auto_increment_field() -> Option<&'static str> {
        Some("id")
    }

    fn set_auto_increment_id(&mut self, id: u64) {
        self.id = Some(id as i64);
    }

    fn mark_persisted(&mut self) {
        self.new_record = false;
    }
}

fn executor(connector: &MockConnector, max: u32) -> QueryExecutor<MockConnector> {
    let pool = Pool::new(PoolConfig::new().max_connections(max), connector.clone()).unwrap();
    QueryExecutor::new(pool)
}

fn users_connector() -> MockConnector {
    MockConnector::builder()
        .with_response("SELECT * FROM `users`;", users_response())
        .with_default_response(MockResponse::affected(1))
        .build()
}

// ============================================================================
// Materialization
// ============================================================================

#[tokio::test]
async fn test_select_builds_every_row() {
    let connector = users_connector();
    let db = executor(&connector, 1);

    let users: Vec<User> = db.find_all("SELECT * FROM `users`;").await.unwrap();
    let names: Vec<_> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["Alice", "Bob", "Carol"]);
    assert!(users.iter().all(|u| !u.new_record));

    let status = db.pool().status();
    assert_eq!(status.in_use, 0);
    assert_eq!(status.available, 1);
}

#[derive(Debug)]
struct NameOnly {
    name: String,
}

impl FromRow for NameOnly {
    fn from_row(row: &Row) -> Result<Self, tabula_client::Error> {
        Ok(Self {
            name: row.get_by_name("name")?,
        })
    }
}

#[tokio::test]
async fn test_fetch_as_maps_plain_structs() {
    let connector = users_connector();
    let db = executor(&connector, 1);

    let rows: Vec<NameOnly> = db.fetch_as("SELECT * FROM `users`;").await.unwrap();
    let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["Alice", "Bob", "Carol"]);
    assert_eq!(db.pool().status().in_use, 0);
}

#[tokio::test]
async fn test_plain_reduces_to_first_row() {
    let connector = users_connector();
    let db = executor(&connector, 1);

    let user: Option<User> = db.find("SELECT * FROM `users`;").await.unwrap();
    assert_eq!(user.unwrap().name, "Alice");
}

#[tokio::test]
async fn test_plain_with_no_rows_is_none() {
    let connector = MockConnector::builder()
        .with_default_response(MockResponse::rows(["id", "name"], Vec::new()))
        .build();
    let db = executor(&connector, 1);

    let user: Option<User> = db.find("SELECT * FROM `users` WHERE `id`=9;").await.unwrap();
    assert!(user.is_none());
}

#[tokio::test]
async fn test_non_select_without_build_results_is_raw() {
    let connector = users_connector();
    let db = executor(&connector, 1);

    let request = QueryRequest::<User>::new("UPDATE `users` SET `age`=1 WHERE `id`=1").factory();
    match db.run(request).await.unwrap() {
        Materialized::Raw(outcome) => assert_eq!(outcome.affected_rows, 1),
        other => panic!("expected raw outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_build_results_materializes_non_select() {
    let connector = MockConnector::builder()
        .with_default_response(MockResponse::procedure(users_response()))
        .build();
    let db = executor(&connector, 1);

    let request = QueryRequest::<User>::new("CALL list_users()")
        .factory()
        .options(QueryOptions::new().build_results(true));
    let users = db.run(request).await.unwrap().into_models();
    assert_eq!(users.len(), 3);
}

#[tokio::test]
async fn test_eager_load_splits_rows_by_prefix() {
    let connector = MockConnector::builder()
        .with_default_response(users_with_profiles_response())
        .build();
    let db = executor(&connector, 1);

    let plan = JoinPlanNode::new("users", "u").attributes(["id", "name"]).child(
        Arc::new(HasOne::new("users", "profiles", AssociationOptions::new())),
        JoinPlanNode::new("profiles", "p").attributes(["bio"]),
    );
    let users: Vec<User> = db
        .select(&SelectOptions::new().fill_plan(&plan))
        .await
        .unwrap();

    assert_eq!(
        connector.executed(),
        vec![
            "SELECT u.`id` AS `u+id`, u.`name` AS `u+name`, p.`bio` AS `p+bio` \
             FROM users AS u JOIN profiles AS p ON p.user_id = u.id;"
        ]
    );
    assert_eq!(users[0].profile.as_ref().unwrap().bio, "likes rust");
    assert_eq!(users[1].name, "Bob");
    assert!(users[1].profile.is_none());
}

#[tokio::test]
async fn test_build_error_is_reported() {
    let connector = MockConnector::builder()
        .with_default_response(MockResponse::rows(["id", "name"], vec![vec![
            SqlValue::from("not a number"),
            SqlValue::from("Alice"),
        ]]))
        .build();
    let db = executor(&connector, 1);

    let err = db.find_all::<User>("SELECT * FROM `users`;").await.unwrap_err();
    assert!(matches!(err, Error::Type(_)));
    assert_eq!(db.pool().status().available, 1);
}

// ============================================================================
// Save and Destroy
// ============================================================================

#[tokio::test]
async fn test_insert_backfills_auto_increment_id() {
    let connector = MockConnector::builder()
        .with_default_response(MockResponse::inserted(42))
        .build();
    let db = executor(&connector, 1);

    let saved = db.save(User::new("Alice", 30)).await.unwrap();
    assert_eq!(saved.id, Some(42));
    assert!(!saved.new_record);
    assert_eq!(
        connector.executed(),
        vec!["INSERT INTO `users` (`name`,`age`) VALUES ('Alice',30);"]
    );
}

#[tokio::test]
async fn test_save_existing_record_updates() {
    let connector = users_connector();
    let db = executor(&connector, 1);

    let mut user = User::new("Bob", 25);
    user.id = Some(2);
    user.new_record = false;

    let saved = db.save(user).await.unwrap();
    assert_eq!(saved.id, Some(2));
    assert_eq!(
        connector.executed(),
        vec!["UPDATE `users` SET `name`='Bob',`age`=25 WHERE `id`=2"]
    );
}

#[tokio::test]
async fn test_upsert_save() {
    let connector = MockConnector::builder()
        .with_default_response(MockResponse::inserted(7))
        .build();
    let db = executor(&connector, 1);

    let options = SaveOptions::new().upsert_keys(["age"]);
    db.save_with(User::new("Carol", 41), &options).await.unwrap();
    assert_eq!(
        connector.executed(),
        vec![
            "INSERT INTO `users` (`name`,`age`) VALUES ('Carol',41) \
             ON DUPLICATE KEY UPDATE `age`=41;"
        ]
    );
}

#[tokio::test]
async fn test_destroy_deletes_by_identifier() {
    let connector = users_connector();
    let db = executor(&connector, 1);

    let mut user = User::new("Bob", 25);
    user.id = Some(2);
    let destroyed = db.destroy(user).await.unwrap();
    assert_eq!(destroyed.name, "Bob");
    assert_eq!(
        connector.executed(),
        vec!["DELETE FROM `users` WHERE `id`=2 LIMIT 1"]
    );
}

#[tokio::test]
async fn test_failed_save_returns_subject() {
    let connector = MockConnector::builder()
        .with_default_response(MockResponse::error(1062, "Duplicate entry 'Alice'"))
        .build();
    let db = executor(&connector, 1);

    let failure = db.save(User::new("Alice", 30)).await.unwrap_err();
    assert!(failure.error.is_query_error(1062));
    let subject = failure.subject.unwrap();
    assert_eq!(subject.name, "Alice");
    assert!(subject.new_record);
}

// ============================================================================
// Pool Interaction
// ============================================================================

#[tokio::test]
async fn test_query_error_returns_connection_to_pool() {
    let connector = users_connector();
    let db = executor(&connector, 1);

    connector.push_response(MockResponse::error(1146, "Table 'shop.nope' doesn't exist"));
    let err = db.execute("SELECT * FROM nope").await.unwrap_err();
    assert!(err.is_query_error(1146));

    let status = db.pool().status();
    assert_eq!(status.total, 1);
    assert_eq!(status.available, 1);
    assert_eq!(connector.closes(), 0);
}

#[tokio::test]
async fn test_connection_error_destroys_connection() {
    let connector = users_connector();
    let db = executor(&connector, 1);

    connector.push_response(MockResponse::fault("Lost connection to MySQL server"));
    let err = db.execute("SELECT 1").await.unwrap_err();
    assert!(err.is_connection_error());

    let status = db.pool().status();
    assert_eq!(status.total, 0);
    assert_eq!(connector.closes(), 1);

    // The next query opens a fresh connection.
    db.execute("DELETE FROM `users` WHERE `id`=1 LIMIT 1").await.unwrap();
    assert_eq!(connector.connects(), 2);
}

#[tokio::test]
async fn test_acquire_failure_is_reported_without_release() {
    let connector = users_connector();
    let db = executor(&connector, 1);
    db.pool().close().await;

    let err = db.execute("SELECT 1").await.unwrap_err();
    assert!(matches!(err, Error::Pool(PoolError::PoolClosed)));
    assert_eq!(connector.connects(), 0);
}

#[tokio::test]
async fn test_procedure_call_is_drained_before_release() {
    let connector = MockConnector::builder()
        .with_response("CALL refresh_totals()", MockResponse::procedure(MockResponse::empty()))
        .with_default_response(MockResponse::affected(0))
        .build();
    let db = executor(&connector, 1);

    db.execute("CALL refresh_totals()").await.unwrap();
    assert_eq!(connector.drains(), 1);

    // Same connection, no "commands out of sync".
    db.execute("UPDATE `totals` SET `n`=0 WHERE `id`=1").await.unwrap();
    assert_eq!(connector.connects(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_bounded_pool() {
    let connector = users_connector();
    let db = executor(&connector, 2);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.find_all::<User>("SELECT * FROM `users`;").await.map(|u| u.len())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 3);
    }

    assert!(connector.connects() <= 2);
    assert_eq!(db.pool().status().in_use, 0);
}

#[tokio::test]
async fn test_compile_error_touches_no_connection() {
    let connector = users_connector();
    let db = executor(&connector, 1);

    let options = SelectOptions::new().filter(Filter::format("id = ?", Vec::<i64>::new()));
    let err = db.select::<User>(&options).await.unwrap_err();
    assert!(matches!(err, Error::Compile(_)));
    assert_eq!(connector.connects(), 0);
}
