//! Schema model: collections, field-sets, custom queries and hooks.
//!
//! A [`Model`] is built once from a JSON document (see [`loader`]) and is
//! read-only afterwards, so it can be shared across request threads behind
//! an `Arc` without locking.

pub mod custom_query;
pub mod hook;
pub mod loader;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::field::FieldRef;

pub use custom_query::{CustomQuery, QueryParameter};
pub use hook::{Hook, HookAction, HookEmail, HookOutcome, HookWhen, Mailer};
pub use loader::{load_model, load_model_from_str, LoadError, LoadResult, ModelLoader};

/// Field-set used when a request names none.
pub const DEFAULT_FIELD_SET: &str = "default";
/// Field-set that renders a human-readable label for a record.
pub const IDENTITY_FIELD_SET: &str = "identity";
/// Primary key field, present in every resolved field-set.
pub const PRIMARY_KEY: &str = "id";

/// Root registry of collections and named custom queries.
#[derive(Debug, Default)]
pub struct Model {
    pub collections: BTreeMap<String, Collection>,
    pub custom_queries: BTreeMap<String, Arc<CustomQuery>>,
    /// Problems found while loading that did not stop the load.
    pub warnings: Vec<QueryError>,
}

impl Model {
    pub fn collection(&self, name: &str) -> QueryResult<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| QueryError::UnknownCollection(name.to_string()))
    }

    pub fn custom_query(&self, name: &str) -> QueryResult<&Arc<CustomQuery>> {
        self.custom_queries
            .get(name)
            .ok_or_else(|| QueryError::UnknownCustomQuery(name.to_string()))
    }

    /// Hooks a write path must fire when `field` of `collection` sees `what`.
    pub fn hooks_for<'a>(
        &'a self,
        collection: &str,
        field: &'a str,
        what: &'a str,
    ) -> impl Iterator<Item = &'a Hook> + 'a {
        self.collections
            .get(collection)
            .into_iter()
            .flat_map(|c| c.hooks.iter())
            .filter(move |hook| hook.matches(field, what))
    }
}

/// One logical table.
#[derive(Debug)]
pub struct Collection {
    pub table_name: String,
    pub fields: BTreeMap<String, FieldRef>,
    pub field_sets: BTreeMap<String, Vec<FieldSetFieldDef>>,
    pub custom_fields: BTreeMap<String, FieldSetFieldDef>,
    pub hooks: Vec<Hook>,
    pub search_prefixes: BTreeMap<String, SearchPrefix>,
}

impl Collection {
    /// Look up a field-set, falling back to `default` when no name is given.
    pub fn field_set(&self, name: Option<&str>) -> QueryResult<&[FieldSetFieldDef]> {
        let name = name.unwrap_or(DEFAULT_FIELD_SET);
        self.field_sets
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| QueryError::UnknownFieldSet {
                collection: self.table_name.clone(),
                fieldset: name.to_string(),
            })
    }

    pub fn field(&self, name: &str) -> Option<&FieldRef> {
        self.fields.get(name)
    }
}

/// A member of a field-set.
#[derive(Debug, Clone)]
pub enum FieldSetFieldDef {
    /// A direct or dot-delimited cross-collection field path.
    Normal(FieldPath),
    /// A computed column written as raw SQL.
    Custom(Arc<CustomField>),
}

impl FieldSetFieldDef {
    /// The key this member is exposed under in result rows.
    pub fn path(&self) -> &str {
        match self {
            FieldSetFieldDef::Normal(path) => path.as_str(),
            FieldSetFieldDef::Custom(custom) => &custom.path,
        }
    }
}

/// A dot-delimited field path such as `author.company.name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    path: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            segments: path.split('.').map(str::to_string).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Reference fields walked before the terminal field.
    pub fn hops(&self) -> &[String] {
        &self.segments[..self.segments.len() - 1]
    }

    /// The field read from the last table reached.
    pub fn terminal(&self) -> &str {
        // split() always yields at least one segment
        &self.segments[self.segments.len() - 1]
    }
}

/// A computed column.
///
/// `query` is an SQL expression whose `[a.b.c]` placeholders are replaced by
/// aliased columns; `join` is an optional hand-written join whose
/// `[collection]` placeholders are replaced by that collection's alias.
#[derive(Debug)]
pub struct CustomField {
    pub path: String,
    pub query: String,
    pub join: Option<String>,
    pub field: FieldRef,
}

/// A short search token redirected to one field, e.g. `tag:rust`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPrefix {
    pub prefix: String,
    pub field_name: String,
}
