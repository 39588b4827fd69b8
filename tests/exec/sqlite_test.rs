//! End-to-end tests: compile, run against SQLite, decode rows.

use std::path::Path;
use std::thread;

use quarry::compile::QueryConditions;
use quarry::exec::{fetch, fetch_one, ExecError, SqlitePool};
use quarry::model::load_model;
use quarry::{Model, QueryError};
use serde_json::{json, Value};

const SCHEMA: &str = "
    CREATE TABLE company (id INTEGER PRIMARY KEY, name TEXT, city TEXT);
    CREATE TABLE author (id INTEGER PRIMARY KEY, name TEXT, email TEXT, company INTEGER);
    CREATE TABLE post (
        id INTEGER PRIMARY KEY, title TEXT, body TEXT, status TEXT,
        author INTEGER, editor INTEGER, published TEXT, views INTEGER
    );
    CREATE TABLE comment (id INTEGER PRIMARY KEY, post INTEGER, body TEXT);

    INSERT INTO company VALUES (1, 'Acme', 'Berlin');
    INSERT INTO author VALUES (1, 'Ann Smith', 'ann@example.com', 1);
    INSERT INTO author VALUES (2, 'Bob', 'bob@example.com', NULL);
    INSERT INTO post VALUES (1, 'Hello', 'first body', 'live', 1, 2, '2024-01-02', 10);
    INSERT INTO post VALUES (2, 'Second', 'second body', 'draft', 2, NULL, NULL, 0);
    INSERT INTO post VALUES (3, 'Third', 'third body', 'archived', 1, NULL, NULL, 5);
    INSERT INTO comment VALUES (1, 1, 'nice'), (2, 1, 'great'), (3, 2, 'meh');
";

fn blog() -> Model {
    load_model(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/blog.json")))
        .unwrap()
}

fn seeded() -> SqlitePool {
    let pool = SqlitePool::open_in_memory().unwrap();
    pool.execute_batch(SCHEMA).unwrap();
    pool
}

fn column<'a>(rows: &'a [quarry::Row], path: &str) -> Vec<&'a Value> {
    rows.iter().map(|row| &row[path]).collect()
}

#[test]
fn test_fetch_list_with_joins() {
    let model = blog();
    let pool = seeded();
    let request = QueryConditions::minimal("post", "list").with_sort("title", 1);
    let rows = fetch(&model, &pool, &request).unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["title"], json!("Hello"));
    assert_eq!(rows[0]["author.name"], json!("Ann Smith"));
    assert_eq!(rows[0]["author.company.name"], json!("Acme"));
    assert_eq!(rows[0]["id"], json!(1));
    // Bob has no company, so the LEFT JOIN yields NULL
    assert_eq!(rows[1]["author.company.name"], Value::Null);
}

#[test]
fn test_search_and_sort() {
    let model = blog();
    let pool = seeded();
    let request = QueryConditions::minimal("post", "list")
        .with_search("*", "smith")
        .with_sort("id", -1);
    let rows = fetch(&model, &pool, &request).unwrap();
    assert_eq!(column(&rows, "id"), vec![&json!(3), &json!(1)]);

    let request = QueryConditions::minimal("post", "list").with_search("*", "by:bob");
    let rows = fetch(&model, &pool, &request).unwrap();
    assert_eq!(column(&rows, "title"), vec![&json!("Second")]);
}

#[test]
fn test_conditions_and_paging() {
    let model = blog();
    let pool = seeded();
    let request = QueryConditions::new("post")
        .with_where("status", "IN", json!(["live", "archived"]))
        .with_where("views", ">", json!(1))
        .with_sort("views", -1)
        .with_limit(1)
        .with_offset(1);
    let rows = fetch(&model, &pool, &request).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], json!("Third"));
    assert_eq!(rows[0]["views"], json!(5));
}

#[test]
fn test_fetch_one_detail() {
    let model = blog();
    let pool = seeded();
    let row = fetch_one(&model, &pool, "post", "detail", 1).unwrap();

    assert_eq!(row["byline"], json!("Ann Smith @ Acme"));
    assert_eq!(row["comment_count"], json!(2));
    assert_eq!(row["author.email"], json!("ann@example.com"));
    assert_eq!(row["body"], json!("first body"));
    assert_eq!(row.len(), 6);
}

#[test]
fn test_fetch_one_missing() {
    let model = blog();
    let pool = seeded();
    let err = fetch_one(&model, &pool, "post", "list", 99).unwrap_err();
    assert!(matches!(
        err,
        ExecError::Query(QueryError::NotFound { ref collection, pk: 99 }) if collection == "post"
    ));
    assert!(err.is_user_error());
    assert_eq!(err.to_string(), "No post record with id 99");
}

#[test]
fn test_custom_join_field() {
    let model = blog();
    let pool = seeded();
    let request = QueryConditions::minimal("post", "feed")
        .with_pk(2)
        .with_sort("latest_comment", 1);
    let rows = fetch(&model, &pool, &request).unwrap();
    assert_eq!(column(&rows, "latest_comment"), vec![&json!("meh")]);
}

#[test]
fn test_identity_string() {
    let model = blog();
    let pool = seeded();
    assert_eq!(model.identity_string(&pool, "company", 1).unwrap(), "Acme, Berlin");
    assert_eq!(model.identity_string(&pool, "author", 2).unwrap(), "Bob");
    assert_eq!(model.identity_string(&pool, "post", 3).unwrap(), "Third");

    let err = model.identity_string(&pool, "company", 7).unwrap_err();
    assert!(matches!(err, ExecError::Query(QueryError::NotFound { .. })));
}

#[test]
fn test_custom_query_run() {
    let model = blog();
    let pool = seeded();
    let query = model.custom_query("posts_by_author").unwrap();

    let rows = query.run(&pool, &[json!(1)]).unwrap();
    assert_eq!(column(&rows, "id"), vec![&json!(1), &json!(3)]);
    assert_eq!(column(&rows, "title"), vec![&json!("Hello"), &json!("Third")]);

    let err = query.run(&pool, &[]).unwrap_err();
    assert!(matches!(
        err,
        ExecError::Query(QueryError::ParameterCount { got: 0, expected: 1 })
    ));
}

#[test]
fn test_literal_question_mark_is_not_a_parameter() {
    let model = blog();
    let pool = seeded();
    let query = model.custom_query("posts_with_title").unwrap();
    let rows = query.run(&pool, &[json!("Hello")]).unwrap();
    assert_eq!(column(&rows, "id"), vec![&json!(1)]);

    let rows = query.run(&pool, &[json!("it's")]).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_file_pool_serves_threads() {
    let path = std::env::temp_dir().join(format!("quarry-pool-{}.sqlite", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let model = blog();
    let pool = SqlitePool::open(&path, 2).unwrap();
    assert_eq!(pool.size(), 2);
    pool.execute_batch(SCHEMA).unwrap();

    thread::scope(|scope| {
        let handles: Vec<_> = (1..=3u64)
            .map(|pk| {
                let model = &model;
                let pool = &pool;
                scope.spawn(move || model.identity_string(pool, "post", pk).unwrap())
            })
            .collect();
        let labels: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(labels, vec!["Hello", "Second", "Third"]);
    });

    drop(pool);
    std::fs::remove_file(&path).unwrap();
}
