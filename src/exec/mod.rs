//! Running compiled and custom queries.
//!
//! The database sits behind two small traits: a [`Pool`] hands out a
//! [`Connection`] guard, and the guard returns the connection when dropped,
//! on success and error paths alike. [`sqlite::SqlitePool`] is the bundled
//! implementation.

pub mod sqlite;

use std::collections::BTreeMap;
use std::error::Error;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::compile::{compile, CompileError, OutputColumn, QueryConditions};
use crate::error::QueryError;
use crate::model::{CustomQuery, Model, IDENTITY_FIELD_SET, PRIMARY_KEY};

pub use sqlite::SqlitePool;

/// A decoded result row, keyed by field path.
pub type Row = BTreeMap<String, Value>;

/// Result type for execution.
pub type ExecResult<T> = Result<T, ExecError>;

/// Errors raised while running a query.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// The database rejected or failed the statement.
    #[error("database error running `{sql}`: {source}")]
    Database {
        sql: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    /// A result value did not fit its declared column type.
    #[error("cannot decode column {column}: {message}")]
    Decode { column: String, message: String },

    #[error("connection pool: {0}")]
    Pool(String),

    #[error("mailer failed: {0}")]
    Mail(#[source] Box<dyn Error + Send + Sync>),
}

impl ExecError {
    pub fn database(sql: &str, source: impl Error + Send + Sync + 'static) -> Self {
        Self::Database {
            sql: sql.to_string(),
            source: Box::new(source),
        }
    }

    /// Whether the request, rather than the model or database, caused this error.
    pub fn is_user_error(&self) -> bool {
        match self {
            ExecError::Compile(e) => e.is_user_error(),
            ExecError::Query(e) => e.is_user_error(),
            _ => false,
        }
    }
}

/// A checked-out database connection.
pub trait Connection {
    /// Run `sql` and decode each row into one value per entry of `columns`,
    /// reading the result column named by its label.
    fn query(&mut self, sql: &str, columns: &[OutputColumn]) -> ExecResult<Vec<Vec<Value>>>;
}

/// Source of connections. Dropping the returned guard releases it.
pub trait Pool: Send + Sync {
    fn acquire(&self) -> ExecResult<Box<dyn Connection + '_>>;
}

/// Run `sql` on one pooled connection and key each row by column path.
pub fn run_sql(pool: &dyn Pool, sql: &str, columns: &[OutputColumn]) -> ExecResult<Vec<Row>> {
    debug!(sql = %sql, "SQL");
    let mut conn = pool.acquire()?;
    let rows = conn.query(sql, columns)?;
    Ok(rows
        .into_iter()
        .map(|values| {
            columns
                .iter()
                .map(|c| c.path.clone())
                .zip(values)
                .collect()
        })
        .collect())
}

/// Compile `request` and run it.
pub fn fetch(model: &Model, pool: &dyn Pool, request: &QueryConditions) -> ExecResult<Vec<Row>> {
    let compiled = compile(model, request)?;
    run_sql(pool, &compiled.sql, &compiled.columns)
}

/// Fetch one record of `collection` by primary key through `fieldset`.
pub fn fetch_one(
    model: &Model,
    pool: &dyn Pool,
    collection: &str,
    fieldset: &str,
    pk: u64,
) -> ExecResult<Row> {
    let request = QueryConditions::minimal(collection, fieldset).with_pk(pk);
    fetch(model, pool, &request)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            QueryError::NotFound {
                collection: collection.to_string(),
                pk,
            }
            .into()
        })
}

impl CustomQuery {
    /// Bind `inputs`, run the statement, and decode rows by output column.
    pub fn run(&self, pool: &dyn Pool, inputs: &[Value]) -> ExecResult<Vec<Row>> {
        let sql = self.bind(inputs)?;
        debug!(query = %self.name, "running custom query");
        run_sql(pool, &sql, &self.output_columns())
    }
}

fn label_part(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_key_path(path: &str) -> bool {
    path == PRIMARY_KEY || path == "sortIndex" || path.ends_with(".id")
}

impl Model {
    /// Human-readable label of one record, from its `identity` field-set.
    ///
    /// Scalar values are joined with `", "` in field-set order; keys and
    /// `sortIndex` are skipped.
    pub fn identity_string(&self, pool: &dyn Pool, collection: &str, pk: u64) -> ExecResult<String> {
        let request = QueryConditions::minimal(collection, IDENTITY_FIELD_SET).with_pk(pk);
        let compiled = compile(self, &request)?;
        let rows = run_sql(pool, &compiled.sql, &compiled.columns)?;
        let row = rows.into_iter().next().ok_or_else(|| QueryError::NotFound {
            collection: collection.to_string(),
            pk,
        })?;

        let parts: Vec<String> = compiled
            .columns
            .iter()
            .filter(|c| !is_key_path(&c.path))
            .filter_map(|c| row.get(&c.path).and_then(label_part))
            .collect();
        Ok(parts.join(", "))
    }
}
