//! Request compilation: `QueryConditions` to one SELECT statement.
//!
//! ```text
//! QueryConditions → field-set → AliasGraph + Projection → WHERE/ORDER/LIMIT → SQL
//! ```
//!
//! Compilation is pure. Each call owns its alias graph, so any number of
//! requests may compile against one shared [`Model`] concurrently.
//!
//! # Example
//!
//! ```ignore
//! use quarry::compile::{compile, QueryConditions};
//!
//! let request = QueryConditions::new("post")
//!     .with_fieldset("list")
//!     .with_search("*", "rust async")
//!     .with_limit(20);
//! let compiled = compile(&model, &request)?;
//! println!("{}", compiled.sql);
//! ```

pub mod alias;
pub mod conditions;
pub mod placeholder;
pub mod projection;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::QueryError;
use crate::field::ScanTarget;
use crate::model::Model;
use crate::sql::{and_all, Query};

pub use alias::{AliasGraph, MappedTable};
pub use conditions::{Comparator, Condition, Sort, SEARCH_ALL};
pub use projection::{ColumnSource, MappedField, Projection};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during compilation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    User(#[from] QueryError),

    #[error("Collection {collection} has no field '{field}'")]
    UnknownField { collection: String, field: String },

    #[error("{collection}.{field} is not a reference and cannot be joined through")]
    NotAReference { collection: String, field: String },

    #[error("Custom field {field} joins on '{token}', which is not joined in this query")]
    UnresolvedJoinToken { field: String, token: String },

    #[error("resolving {collection}.{member}: {source}")]
    Member {
        collection: String,
        member: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Whether the request, rather than the model, caused this error.
    pub fn is_user_error(&self) -> bool {
        match self {
            CompileError::User(e) => e.is_user_error(),
            CompileError::Member { source, .. } => source.is_user_error(),
            _ => false,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

// ============================================================================
// Request
// ============================================================================

/// A runtime query request. Built per request, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryConditions {
    pub collection: String,
    #[serde(default)]
    pub pk: Option<u64>,
    #[serde(default)]
    pub fieldset: Option<String>,
    #[serde(default, rename = "where")]
    pub r#where: Vec<Condition>,
    /// Field path (or `*`) to free-text term.
    #[serde(default)]
    pub search: BTreeMap<String, String>,
    #[serde(default)]
    pub sort: Vec<Sort>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

impl QueryConditions {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            ..Default::default()
        }
    }

    /// Just a collection and a field-set.
    pub fn minimal(collection: &str, fieldset: &str) -> Self {
        Self::new(collection).with_fieldset(fieldset)
    }

    pub fn with_pk(mut self, pk: u64) -> Self {
        self.pk = Some(pk);
        self
    }

    pub fn with_fieldset(mut self, fieldset: &str) -> Self {
        self.fieldset = Some(fieldset.to_string());
        self
    }

    pub fn with_where(mut self, field: &str, cmp: &str, val: Value) -> Self {
        self.r#where.push(Condition::new(field, cmp, val));
        self
    }

    pub fn with_search(mut self, field: &str, term: &str) -> Self {
        self.search.insert(field.to_string(), term.to_string());
        self
    }

    pub fn with_sort(mut self, field_name: &str, direction: i32) -> Self {
        self.sort.push(Sort {
            field_name: field_name.to_string(),
            direction,
        });
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

// ============================================================================
// Result
// ============================================================================

/// A result column: the select-list label it is read from and the path it is
/// exposed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub path: String,
    pub label: String,
    pub scan: ScanTarget,
}

/// Result of compiling a request.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// The generated SQL string.
    pub sql: String,
    /// The query AST (for debugging/inspection).
    pub query: Query,
    /// Result columns in select-list order.
    pub columns: Vec<OutputColumn>,
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile `request` against `model`.
pub fn compile(model: &Model, request: &QueryConditions) -> CompileResult<CompiledQuery> {
    let collection = model.collection(&request.collection)?;
    let members = collection.field_set(request.fieldset.as_deref())?;

    let mut graph = AliasGraph::new(model, &request.collection);
    let projection = Projection::build(&mut graph, members)?;

    let filters = conditions::where_exprs(collection, &projection, request)?;
    let order_by = conditions::order_by(&projection, &request.sort)?;
    let page = conditions::page(request.limit, request.offset)?;

    let mut query = Query::new()
        .select(projection.select_list())
        .from(graph.base_table_ref());
    if let Some(filter) = and_all(filters) {
        query = query.filter(filter);
    }
    let query = query
        .joins(graph.into_joins())
        .order_by(order_by)
        .limit_offset(page);

    let sql = query.to_sql();
    debug!(collection = %request.collection, sql = %sql, "compiled query");

    Ok(CompiledQuery {
        sql,
        query,
        columns: projection.output_columns(),
    })
}
