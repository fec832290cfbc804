//! Statement and join-plan compiler tests.
//!
//! These pin the exact SQL text the compilers emit for the shapes the
//! executor and the model layer rely on.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use indexmap::IndexMap;
use proptest::prelude::*;
use tabula_sql::{
    Association, AssociationOptions, BelongsTo, CompileError, Filter, FilterValue, HasOne,
    JoinPlanNode, SelectOptions, compile, count, insert, select, where_clause,
};
use tabula_types::SqlValue;

fn users_with_profiles() -> JoinPlanNode {
    JoinPlanNode::new("users", "u")
        .attributes(["id", "name"])
        .child(
            Arc::new(HasOne::new("users", "profiles", AssociationOptions::new())),
            JoinPlanNode::new("profiles", "p").attributes(["bio"]),
        )
}

// ============================================================================
// Statement Shapes
// ============================================================================

#[test]
fn test_insert_users() {
    let mut values = IndexMap::new();
    values.insert("name".to_owned(), SqlValue::from("Alice"));
    values.insert("age".to_owned(), SqlValue::from(30));

    assert_eq!(
        insert("users", &values, false, None).unwrap(),
        "INSERT INTO `users` (`name`,`age`) VALUES ('Alice',30);"
    );
}

#[test]
fn test_where_in_and_null() {
    let ids = Filter::map([("id", FilterValue::list([1, 2, 3]))]);
    assert_eq!(where_clause(&ids).unwrap(), "`id` IN (1,2,3)");

    let name = Filter::map([("name", FilterValue::null())]);
    assert_eq!(where_clause(&name).unwrap(), "`name` IS NULL");
}

#[test]
fn test_mixed_map_filter() {
    let filter = Filter::map([
        ("status", FilterValue::list(["active", "trial"])),
        ("deleted_at", FilterValue::null()),
        ("org_id", FilterValue::from(7)),
    ]);
    assert_eq!(
        where_clause(&filter).unwrap(),
        "`status` IN ('active','trial') AND `deleted_at` IS NULL AND `org_id` = 7"
    );
}

// ============================================================================
// Eager Loading
// ============================================================================

#[test]
fn test_eager_load_compiles_projection_and_source() {
    let plan = compile(&users_with_profiles());
    assert_eq!(
        plan.projection_list(),
        "u.`id` AS `u+id`, u.`name` AS `u+name`, p.`bio` AS `p+bio`"
    );
    assert_eq!(
        plan.from_clause(),
        "users AS u JOIN profiles AS p ON p.user_id = u.id"
    );
}

#[test]
fn test_select_with_fill_plan() {
    let root = users_with_profiles();
    let options = SelectOptions::new()
        .fill_plan(&root)
        .filter(Filter::raw("u.id = 1"));

    assert_eq!(
        select("users", &options).unwrap(),
        "SELECT u.`id` AS `u+id`, u.`name` AS `u+name`, p.`bio` AS `p+bio` \
         FROM users AS u JOIN profiles AS p ON p.user_id = u.id WHERE u.id = 1;"
    );
    assert_eq!(
        count("users", &options).unwrap(),
        "SELECT count(*) FROM users AS u JOIN profiles AS p ON p.user_id = u.id WHERE u.id = 1;"
    );
}

#[test]
fn test_select_rejects_duplicate_prefix() {
    let root = JoinPlanNode::new("users", "u").child(
        Arc::new(HasOne::new("users", "profiles", AssociationOptions::new())),
        JoinPlanNode::new("profiles", "u"),
    );
    let result = select("users", &SelectOptions::new().fill_plan(&root));
    assert_eq!(result.unwrap_err(), CompileError::DuplicatePrefix("u".into()));
}

#[test]
fn test_repeated_compilation_is_byte_identical() {
    let root = JoinPlanNode::new("comments", "c")
        .attributes(["id", "body"])
        .child(
            Arc::new(BelongsTo::new("comments", "posts", AssociationOptions::new())),
            JoinPlanNode::new("posts", "po").attributes(["title"]).child(
                Arc::new(BelongsTo::new("posts", "users", AssociationOptions::new())),
                JoinPlanNode::new("users", "au").attributes(["name"]),
            ),
        );

    let first = select("comments", &SelectOptions::new().fill_plan(&root)).unwrap();
    for _ in 0..10 {
        let again = select("comments", &SelectOptions::new().fill_plan(&root)).unwrap();
        assert_eq!(first, again);
    }
}

#[test]
fn test_foreign_key_columns() {
    let has_one = HasOne::new("users", "profiles", AssociationOptions::new());
    let belongs_to = BelongsTo::new("profiles", "users", AssociationOptions::new());

    // Both sides of the same relation agree on the column.
    assert_eq!(has_one.foreign_key_column(), belongs_to.foreign_key_column());
}

// ============================================================================
// Injection Safety
// ============================================================================

proptest! {
    #[test]
    fn prop_filter_string_stays_inside_literal(value in ".*") {
        let sql = where_clause(&Filter::eq("name", value.as_str())).unwrap();
        let literal = sql.strip_prefix("`name` = ").unwrap();

        prop_assert!(literal.starts_with('\''));
        prop_assert!(literal.ends_with('\''));
        let inner = &literal[1..literal.len() - 1];

        // Every quote inside the literal is preceded by a backslash that is
        // not itself escaped.
        let mut escaped = false;
        for c in inner.chars() {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else {
                prop_assert!(c != '\'');
            }
        }
        prop_assert!(!escaped);
    }

    #[test]
    fn prop_column_names_stay_quoted(column in "[a-z_]{1,16}") {
        let sql = where_clause(&Filter::eq(column.clone(), 1)).unwrap();
        prop_assert_eq!(sql, format!("`{column}` = 1"));
    }
}
