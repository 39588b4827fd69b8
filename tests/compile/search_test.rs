//! Integration tests for free-text search.

use std::path::Path;

use insta::assert_snapshot;
use quarry::compile::{compile, CompileError, QueryConditions};
use quarry::model::{load_model, load_model_from_str};
use quarry::{Model, QueryError};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

fn blog() -> Model {
    load_model(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/blog.json")))
        .unwrap()
}

fn list_search(key: &str, term: &str) -> String {
    let request = QueryConditions::minimal("post", "list").with_search(key, term);
    let sql = compile(&blog(), &request).unwrap().sql;
    Parser::parse_sql(&SQLiteDialect {}, &sql).unwrap_or_else(|e| panic!("{}\n{}", e, sql));
    sql
}

fn where_clause(sql: &str) -> Option<&str> {
    sql.find(" WHERE ").map(|at| &sql[at + 1..])
}

#[test]
fn test_every_term_must_match_some_field() {
    let sql = list_search("*", "john smith");
    assert_snapshot!(where_clause(&sql).unwrap(), @"WHERE (p.title LIKE '%john%' OR a1.name LIKE '%john%' OR c2.name LIKE '%john%' OR p.status LIKE '%john%') AND (p.title LIKE '%smith%' OR a1.name LIKE '%smith%' OR c2.name LIKE '%smith%' OR p.status LIKE '%smith%')");
}

#[test]
fn test_punctuation_splits_terms() {
    let sql = list_search("*", "o'brien");
    assert_snapshot!(where_clause(&sql).unwrap(), @"WHERE (p.title LIKE '%o%' OR a1.name LIKE '%o%' OR c2.name LIKE '%o%' OR p.status LIKE '%o%') AND (p.title LIKE '%brien%' OR a1.name LIKE '%brien%' OR c2.name LIKE '%brien%' OR p.status LIKE '%brien%')");
}

#[test]
fn test_numeric_term_is_primary_key() {
    let sql = list_search("*", "42");
    assert_eq!(where_clause(&sql), Some("WHERE p.id = 42"));
}

#[test]
fn test_oversized_number_is_text() {
    let sql = list_search("*", "99999999999999999999");
    assert!(
        sql.contains("p.title LIKE '%99999999999999999999%'"),
        "{}",
        sql
    );
    assert!(!sql.contains("p.id ="), "{}", sql);
}

#[test]
fn test_single_field_search() {
    let sql = list_search("title", "rust async");
    assert_snapshot!(where_clause(&sql).unwrap(), @"WHERE (p.title LIKE '%rust%' OR p.title LIKE '%async%')");

    let sql = list_search("author.company.name", "acme");
    assert_eq!(where_clause(&sql), Some("WHERE (c2.name LIKE '%acme%')"));
}

#[test]
fn test_search_prefix_redirects() {
    let sql = list_search("*", "by:smith");
    assert_eq!(where_clause(&sql), Some("WHERE (a1.name LIKE '%smith%')"));
}

#[test]
fn test_unknown_prefix_is_plain_text() {
    let sql = list_search("*", "tag:rust");
    assert!(sql.contains("(p.title LIKE '%tag%' OR"), "{}", sql);
    assert!(sql.contains("(p.title LIKE '%rust%' OR"), "{}", sql);
}

#[test]
fn test_empty_terms_add_nothing() {
    assert_eq!(where_clause(&list_search("*", "")), None);
    assert_eq!(where_clause(&list_search("*", " ,; ")), None);
    assert_eq!(where_clause(&list_search("title", "")), None);
}

#[test]
fn test_custom_fields_not_searched() {
    let request = QueryConditions::minimal("post", "detail").with_search("*", "x");
    let sql = compile(&blog(), &request).unwrap().sql;
    assert!(
        sql.ends_with(
            "WHERE (p.title LIKE '%x%' OR p.body LIKE '%x%' OR a1.email LIKE '%x%')"
        ),
        "{}",
        sql
    );
}

#[test]
fn test_nothing_searchable_matches_nothing() {
    let model = load_model_from_str(
        r#"{ "collections": { "score": {
            "fields": { "points": { "type": "int" } },
            "fieldsets": { "identity": ["points"] }
        } } }"#,
    )
    .unwrap();
    let request = QueryConditions::minimal("score", "identity").with_search("*", "high");
    let sql = compile(&model, &request).unwrap().sql;
    assert_snapshot!(sql, @"SELECT s.points AS f0, s.id AS f1 FROM score s WHERE (0 = 1)");
}

#[test]
fn test_search_entries_follow_key_order() {
    let request = QueryConditions::minimal("post", "list")
        .with_search("title", "a")
        .with_search("*", "7")
        .with_where("status", "=", serde_json::json!("live"));
    let sql = compile(&blog(), &request).unwrap().sql;
    assert_eq!(
        where_clause(&sql),
        Some("WHERE p.status = 'live' AND p.id = 7 AND (p.title LIKE '%a%')")
    );
}

#[test]
fn test_search_on_unmapped_field() {
    let request = QueryConditions::minimal("post", "list").with_search("views", "3");
    let err = compile(&blog(), &request).unwrap_err();
    assert_eq!(
        err,
        CompileError::User(QueryError::Condition {
            index: 0,
            source: Box::new(QueryError::UnmappedField("views".into())),
        })
    );
}
