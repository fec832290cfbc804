//! Benchmarks for statement and join-plan compilation.

#![allow(clippy::unwrap_used, missing_docs)]

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use indexmap::IndexMap;
use tabula_sql::{
    AssociationOptions, BelongsTo, Filter, FilterValue, HasOne, JoinPlanNode, SelectOptions,
    compile, insert, select, where_clause,
};
use tabula_types::SqlValue;

fn eager_tree() -> JoinPlanNode {
    JoinPlanNode::new("comments", "c")
        .attributes(["id", "body", "created_at"])
        .child(
            Arc::new(BelongsTo::new("comments", "posts", AssociationOptions::new())),
            JoinPlanNode::new("posts", "po")
                .attributes(["id", "title"])
                .child(
                    Arc::new(BelongsTo::new("posts", "users", AssociationOptions::new())),
                    JoinPlanNode::new("users", "au").attributes(["id", "name"]).child(
                        Arc::new(HasOne::new("users", "profiles", AssociationOptions::new())),
                        JoinPlanNode::new("profiles", "pr").attributes(["bio"]),
                    ),
                ),
        )
}

/// Benchmark a conjunctive filter with an IN list.
fn bench_where_clause(c: &mut Criterion) {
    let filter = Filter::map([
        ("status", FilterValue::list(["active", "trial", "past_due"])),
        ("org_id", FilterValue::from(42)),
        ("deleted_at", FilterValue::null()),
    ]);

    c.bench_function("where_clause", |b| {
        b.iter(|| black_box(where_clause(&filter).unwrap()))
    });
}

/// Benchmark insert compilation with string escaping.
fn bench_insert(c: &mut Criterion) {
    let mut values = IndexMap::new();
    values.insert("name".to_owned(), SqlValue::from("O'Brien \"the\" \\ 3rd"));
    values.insert("age".to_owned(), SqlValue::from(30));
    values.insert("bio".to_owned(), SqlValue::Null);

    c.bench_function("insert", |b| {
        b.iter(|| black_box(insert("users", &values, false, None).unwrap()))
    });
}

/// Benchmark compiling a four-level eager-load tree.
fn bench_join_plan(c: &mut Criterion) {
    let root = eager_tree();

    c.bench_function("join_plan_compile", |b| b.iter(|| black_box(compile(&root))));

    let options = SelectOptions::new()
        .fill_plan(&root)
        .filter(Filter::raw("c.id > 100"))
        .limit(50);
    c.bench_function("select_with_fill_plan", |b| {
        b.iter(|| black_box(select("comments", &options).unwrap()))
    });
}

criterion_group!(benches, bench_where_clause, bench_insert, bench_join_plan);
criterion_main!(benches);
