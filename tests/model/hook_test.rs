//! Integration tests for hook lookup and dispatch.

use std::path::Path;
use std::sync::Mutex;

use quarry::exec::{ExecError, Row, SqlitePool};
use quarry::model::{load_model, load_model_from_str, HookAction, HookOutcome, LoadError, Mailer};
use quarry::{Model, QueryError};
use serde_json::{json, Value};

fn blog() -> Model {
    load_model(Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/blog.json")))
        .unwrap()
}

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(String, String, Option<Value>)>>,
}

impl Mailer for Outbox {
    fn send(
        &self,
        recipient: &str,
        template: &str,
        record: &Row,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sent.lock().unwrap().push((
            recipient.to_string(),
            template.to_string(),
            record.get("title").cloned(),
        ));
        Ok(())
    }
}

struct Offline;

impl Mailer for Offline {
    fn send(
        &self,
        _: &str,
        _: &str,
        _: &Row,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("smtp unreachable".into())
    }
}

fn record(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_hooks_for_filters_by_trigger() {
    let model = blog();
    let kinds: Vec<_> = model
        .hooks_for("post", "status", "changed")
        .map(|h| h.action.kind())
        .collect();
    assert_eq!(kinds, vec!["set", "email"]);

    assert_eq!(model.hooks_for("post", "status", "created").count(), 0);
    assert_eq!(model.hooks_for("post", "title", "changed").count(), 0);
    assert_eq!(model.hooks_for("comment", "post", "created").count(), 1);
    assert_eq!(model.hooks_for("ghost", "name", "changed").count(), 0);
}

#[test]
fn test_set_assigns_fields() {
    let model = blog();
    let pool = SqlitePool::open_in_memory().unwrap();
    let hook = model
        .hooks_for("post", "status", "changed")
        .find(|h| matches!(h.action, HookAction::Set(_)))
        .unwrap();

    let mut row = record(&[("id", json!(3)), ("views", json!(41))]);
    let outcome = hook.fire(&mut row, &pool, &Outbox::default()).unwrap();

    assert_eq!(outcome, HookOutcome::Assigned(vec!["views".to_string()]));
    assert_eq!(row["views"], json!(0));
    assert_eq!(row["id"], json!(3));
}

#[test]
fn test_email_goes_to_mailer() {
    let model = blog();
    let pool = SqlitePool::open_in_memory().unwrap();
    let outbox = Outbox::default();
    let hook = model
        .hooks_for("post", "status", "changed")
        .find(|h| matches!(h.action, HookAction::Email(_)))
        .unwrap();

    let mut row = record(&[("id", json!(3)), ("title", json!("Hello"))]);
    let outcome = hook.fire(&mut row, &pool, &outbox).unwrap();

    assert_eq!(
        outcome,
        HookOutcome::Emailed {
            recipient: "editor@example.com".to_string()
        }
    );
    let sent = outbox.sent.lock().unwrap();
    assert_eq!(
        sent.as_slice(),
        [(
            "editor@example.com".to_string(),
            "status-changed".to_string(),
            Some(json!("Hello"))
        )]
    );
}

#[test]
fn test_mailer_failure_surfaces() {
    let model = blog();
    let pool = SqlitePool::open_in_memory().unwrap();
    let hook = model
        .hooks_for("post", "status", "changed")
        .find(|h| matches!(h.action, HookAction::Email(_)))
        .unwrap();

    let err = hook
        .fire(&mut record(&[("id", json!(3))]), &pool, &Offline)
        .unwrap_err();
    assert!(matches!(err, ExecError::Mail(_)));
    assert!(!err.is_user_error());
}

#[test]
fn test_raw_query_binds_record_field() {
    let model = blog();
    let pool = SqlitePool::open_in_memory().unwrap();
    pool.execute_batch(
        "CREATE TABLE comment (id INTEGER PRIMARY KEY, post INTEGER, body TEXT);
         INSERT INTO comment (id, post, body) VALUES
            (1, 7, 'first'), (2, 7, 'second'), (3, 8, 'elsewhere');",
    )
    .unwrap();

    let hook = model.hooks_for("comment", "post", "created").next().unwrap();
    let mut row = record(&[("id", json!(2)), ("post", json!(7))]);
    let outcome = hook.fire(&mut row, &pool, &Outbox::default()).unwrap();

    let expected: Row = [("n".to_string(), json!(2))].into_iter().collect();
    assert_eq!(outcome, HookOutcome::Queried(vec![expected]));
}

#[test]
fn test_raw_query_rejects_bad_binding() {
    let model = blog();
    let pool = SqlitePool::open_in_memory().unwrap();
    let hook = model.hooks_for("comment", "post", "created").next().unwrap();

    let mut row = record(&[("id", json!(2)), ("post", json!("seven"))]);
    let err = hook
        .fire(&mut row, &pool, &Outbox::default())
        .unwrap_err();
    assert!(matches!(err, ExecError::Query(_)));
    assert!(err.is_user_error());
}

#[test]
fn test_raw_query_requires_bound_field_on_record() {
    let model = blog();
    let pool = SqlitePool::open_in_memory().unwrap();
    pool.execute_batch("CREATE TABLE comment (id INTEGER PRIMARY KEY, post INTEGER, body TEXT);")
        .unwrap();
    let hook = model.hooks_for("comment", "post", "created").next().unwrap();

    let mut row = record(&[("id", json!(1))]);
    let err = hook
        .fire(&mut row, &pool, &Outbox::default())
        .unwrap_err();
    assert!(matches!(
        err,
        ExecError::Query(QueryError::UnboundRecordField(ref field)) if field == "post"
    ));
    assert!(err.is_user_error());
    assert_eq!(
        err.to_string(),
        "Record has no field 'post' to bind to the hook query"
    );
}

#[test]
fn test_hook_binding_must_name_collection_field() {
    let model = |bind: &str| {
        load_model_from_str(&format!(
            r#"{{
                "collections": {{ "comment": {{ "fields": {{
                    "name": {{ "type": "string" }},
                    "post": {{ "type": "int" }}
                }} }} }},
                "hooks": [ {{
                    "collection": "comment",
                    "when": {{ "field": "post", "what": "created" }},
                    "raw": {{
                        "query": "SELECT COUNT(*) AS n FROM comment WHERE post = ?",
                        "parameters": [ {{ "type": "id", "field": "{}" }} ],
                        "columns": {{ "n": {{ "type": "int" }} }}
                    }}
                }} ]
            }}"#,
            bind
        ))
    };

    assert!(model("post").is_ok());
    assert!(model("id").is_ok());

    let err = model("psot").unwrap_err();
    assert!(matches!(
        err,
        LoadError::UnknownHookBinding { ref collection, ref field }
            if collection == "comment" && field == "psot"
    ));
    assert_eq!(
        err.to_string(),
        "Hook query on comment binds unknown field 'psot'"
    );
}
