//! Integration tests for field-set projection and join synthesis.

use std::path::Path;

use insta::assert_snapshot;
use quarry::compile::{compile, CompileError, QueryConditions};
use quarry::field::ScanTarget;
use quarry::model::{load_model, load_model_from_str};
use quarry::{Model, QueryError};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

fn blog() -> Model {
    load_model(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/blog.json")))
        .unwrap()
}

fn sql_for(model: &Model, request: &QueryConditions) -> String {
    let sql = compile(model, request).unwrap().sql;
    Parser::parse_sql(&SQLiteDialect {}, &sql).unwrap_or_else(|e| panic!("{}\n{}", e, sql));
    sql
}

#[test]
fn test_list_fieldset() {
    let sql = sql_for(&blog(), &QueryConditions::minimal("post", "list"));
    assert_snapshot!(sql, @"SELECT p.title AS f0, a1.name AS f1, c2.name AS f2, p.status AS f3, p.id AS f4 FROM post p LEFT JOIN author a1 ON a1.id = p.author LEFT JOIN company c2 ON c2.id = a1.company");
}

#[test]
fn test_default_fieldset() {
    let sql = sql_for(&blog(), &QueryConditions::new("post"));
    assert_snapshot!(sql, @"SELECT p.author AS f0, p.body AS f1, p.editor AS f2, p.published AS f3, p.status AS f4, p.title AS f5, p.views AS f6, p.id AS f7 FROM post p");
}

#[test]
fn test_custom_fields_share_joins() {
    let sql = sql_for(&blog(), &QueryConditions::minimal("post", "detail"));
    assert_snapshot!(sql, @"SELECT p.title AS f0, p.body AS f1, a1.name || ' @ ' || c2.name AS f2, (SELECT COUNT(*) FROM comment cm WHERE cm.post = p.id) AS f3, a1.email AS f4, p.id AS f5 FROM post p LEFT JOIN author a1 ON a1.id = p.author LEFT JOIN company c2 ON c2.id = a1.company");
}

#[test]
fn test_custom_join_resolves_collection_token() {
    let sql = sql_for(&blog(), &QueryConditions::minimal("post", "feed"));
    assert_snapshot!(sql, @"SELECT p.title AS f0, lc.body AS f1, p.id AS f2 FROM post p LEFT JOIN comment lc ON lc.post = p.id");
}

#[test]
fn test_two_paths_to_one_collection() {
    let sql = sql_for(&blog(), &QueryConditions::minimal("post", "people"));
    assert_snapshot!(sql, @"SELECT a1.name AS f0, a2.name AS f1, p.id AS f2 FROM post p LEFT JOIN author a1 ON a1.id = p.author LEFT JOIN author a2 ON a2.id = p.editor");
}

#[test]
fn test_identity_fieldset() {
    let sql = sql_for(&blog(), &QueryConditions::minimal("company", "identity"));
    assert_snapshot!(sql, @"SELECT c.name AS f0, c.city AS f1, c.id AS f2 FROM company c");
}

#[test]
fn test_output_columns() {
    let compiled = compile(&blog(), &QueryConditions::minimal("post", "detail")).unwrap();
    let columns: Vec<_> = compiled
        .columns
        .iter()
        .map(|c| (c.path.as_str(), c.label.as_str(), c.scan))
        .collect();
    assert_eq!(
        columns,
        vec![
            ("title", "f0", ScanTarget::Text),
            ("body", "f1", ScanTarget::Text),
            ("byline", "f2", ScanTarget::Text),
            ("comment_count", "f3", ScanTarget::Integer),
            ("author.email", "f4", ScanTarget::Text),
            ("id", "f5", ScanTarget::Integer),
        ]
    );
}

#[test]
fn test_unknown_collection_and_fieldset() {
    let model = blog();

    let err = compile(&model, &QueryConditions::new("page")).unwrap_err();
    assert_eq!(err, CompileError::User(QueryError::UnknownCollection("page".into())));
    assert!(err.is_user_error());

    let err = compile(&model, &QueryConditions::minimal("author", "list")).unwrap_err();
    assert_eq!(err.to_string(), "Fieldset list doesn't exist in author");
}

#[test]
fn test_broken_member_names_path() {
    let model = load_model_from_str(
        r#"{ "collections": { "post": {
            "fields": {
                "title": { "type": "string" },
                "author": { "type": "ref", "collection": "author" }
            },
            "fieldsets": { "identity": ["title"], "broken": ["title", "author.nickname"] }
        }, "author": { "fields": { "name": { "type": "string" } } } } }"#,
    )
    .unwrap();

    let err = compile(&model, &QueryConditions::minimal("post", "broken")).unwrap_err();
    assert!(matches!(
        err,
        CompileError::Member { ref member, .. } if member == "author.nickname"
    ));
    assert!(!err.is_user_error());
    assert_eq!(
        err.to_string(),
        "resolving post.author.nickname: Collection author has no field 'nickname'"
    );
}
