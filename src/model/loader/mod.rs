//! JSON model loader.
//!
//! Reads a configuration document shaped like:
//!
//! ```json
//! {
//!   "collections": {
//!     "post": {
//!       "fields": { "title": { "type": "string" }, "author": { "type": "ref", "collection": "author" } },
//!       "fieldsets": { "list": ["title", "author.name"] },
//!       "custom": { "comments": { "query": "(SELECT COUNT(*) FROM comment c WHERE c.post = [id])", "dataType": "int" } },
//!       "searchPrefixes": { "by": { "field": "author.name" } }
//!     }
//!   },
//!   "customQueries": { "recent": { "query": "SELECT ...", "parameters": [], "columns": {}, "type": "select" } },
//!   "hooks": [ { "collection": "post", "when": { "field": "status", "what": "changed" }, "set": { "dirty": true } } ]
//! }
//! ```
//!
//! and produces a validated [`Model`] or a [`LoadError`].
//!
//! # Example
//!
//! ```rust,ignore
//! use quarry::model::loader::load_model;
//! use std::path::Path;
//!
//! let model = load_model(Path::new("model.json"))?;
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{
    Collection, CustomField, CustomQuery, FieldPath, FieldSetFieldDef, Hook, HookAction,
    HookEmail, HookWhen, Model, QueryParameter, SearchPrefix, DEFAULT_FIELD_SET,
    IDENTITY_FIELD_SET, PRIMARY_KEY,
};
use crate::compile::placeholder;
use crate::error::QueryError;
use crate::field::{param_str, FieldDef, FieldError, FieldRegistry, IntField};
use crate::model::custom_query::count_placeholders;

/// Errors that abort model construction.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File not found
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// IO error reading the document
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON or a document of the wrong shape
    #[error("Failed to parse model: {0}")]
    Json(#[from] serde_json::Error),

    /// A field definition was rejected by the field registry
    #[error("Error parsing {path} - {source}")]
    Field {
        path: String,
        #[source]
        source: FieldError,
    },

    /// No identity field-set and nothing to synthesize one from
    #[error("No identity fieldset, and collection ({0}) doesn't have a 'name' field to fall back upon")]
    MissingIdentity(String),

    /// A reference field points at a collection that does not exist
    #[error("{path} references unknown collection '{collection}'")]
    UnknownReference { path: String, collection: String },

    /// A custom field join names a collection that does not exist
    #[error("Join of custom field {path} references unknown collection '{token}'")]
    UnknownJoinCollection { path: String, token: String },

    /// `?` placeholders and declared parameters disagree
    #[error("Custom query {name} has {placeholders} placeholders but {parameters} parameters")]
    PlaceholderCount {
        name: String,
        placeholders: usize,
        parameters: usize,
    },

    /// A hook query parameter binds a field the hooked collection lacks
    #[error("Hook query on {collection} binds unknown field '{field}'")]
    UnknownHookBinding { collection: String, field: String },

    /// A hook must carry exactly one action
    #[error("Hook on {collection}.{field} must define exactly one of set, email or raw (found {found})")]
    HookAction {
        collection: String,
        field: String,
        found: usize,
    },
}

/// Result type for model loading operations.
pub type LoadResult<T> = Result<T, LoadError>;

// =============================================================================
// Raw document
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawModel {
    #[serde(default)]
    collections: BTreeMap<String, RawCollection>,
    #[serde(default, rename = "customQueries")]
    custom_queries: BTreeMap<String, RawCustomQuery>,
    #[serde(default)]
    hooks: Vec<RawHook>,
}

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(default)]
    fields: BTreeMap<String, FieldDef>,
    #[serde(default, rename = "fieldsets")]
    field_sets: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    custom: BTreeMap<String, RawCustomField>,
    #[serde(default, rename = "searchPrefixes")]
    search_prefixes: BTreeMap<String, RawSearchPrefix>,
}

#[derive(Debug, Deserialize)]
struct RawCustomField {
    query: String,
    #[serde(rename = "dataType")]
    data_type: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    join: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSearchPrefix {
    field: String,
}

#[derive(Debug, Deserialize)]
struct RawCustomQuery {
    query: String,
    #[serde(default)]
    parameters: Vec<FieldDef>,
    #[serde(default)]
    columns: BTreeMap<String, FieldDef>,
}

#[derive(Debug, Deserialize)]
struct RawHook {
    collection: String,
    when: RawHookWhen,
    #[serde(default)]
    set: Option<Map<String, Value>>,
    #[serde(default)]
    email: Option<RawHookEmail>,
    #[serde(default)]
    raw: Option<RawCustomQuery>,
}

#[derive(Debug, Deserialize)]
struct RawHookWhen {
    field: String,
    what: String,
}

#[derive(Debug, Deserialize)]
struct RawHookEmail {
    recipient: String,
    template: String,
}

// =============================================================================
// Loader
// =============================================================================

/// Builds models, resolving field types through a [`FieldRegistry`].
#[derive(Debug, Clone, Default)]
pub struct ModelLoader {
    registry: FieldRegistry,
}

impl ModelLoader {
    pub fn new(registry: FieldRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn load_str(&self, json: &str) -> LoadResult<Model> {
        self.build(serde_json::from_str(json)?)
    }

    pub fn load_reader<R: Read>(&self, reader: R) -> LoadResult<Model> {
        self.build(serde_json::from_reader(reader)?)
    }

    pub fn load_file(&self, path: &Path) -> LoadResult<Model> {
        if !path.exists() {
            return Err(LoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let file = File::open(path)?;
        self.load_reader(BufReader::new(file))
    }

    fn build(&self, raw: RawModel) -> LoadResult<Model> {
        info!("begin model init");

        let mut custom_queries = BTreeMap::new();
        for (name, raw_query) in raw.custom_queries {
            debug!(query = %name, "custom query");
            let query = self.custom_query(&name, raw_query)?;
            custom_queries.insert(name, Arc::new(query));
        }

        let mut collections = BTreeMap::new();
        for (name, raw_collection) in raw.collections {
            let collection = self.collection(&name, raw_collection)?;
            collections.insert(name, collection);
        }

        validate_references(&collections)?;

        let mut warnings = Vec::new();
        for raw_hook in raw.hooks {
            let hook = self.hook(raw_hook)?;
            match collections.get_mut(&hook.collection) {
                Some(collection) => {
                    check_hook_bindings(collection, &hook)?;
                    collection.hooks.push(hook);
                }
                None => {
                    warn!(collection = %hook.collection, "hook on non existing collection");
                    warnings.push(QueryError::UnknownCollection(hook.collection));
                }
            }
        }

        info!(
            collections = collections.len(),
            custom_queries = custom_queries.len(),
            "end model init"
        );

        Ok(Model {
            collections,
            custom_queries,
            warnings,
        })
    }

    fn collection(&self, name: &str, raw: RawCollection) -> LoadResult<Collection> {
        debug!(collection = %name, "read collection");

        let mut fields = BTreeMap::new();
        for (field_name, def) in &raw.fields {
            let field = self.registry.from_def(def).map_err(|source| LoadError::Field {
                path: format!("{}.{}", name, field_name),
                source,
            })?;
            fields.insert(field_name.clone(), field);
        }
        fields
            .entry(PRIMARY_KEY.to_string())
            .or_insert_with(IntField::primary_key);

        let mut custom_fields = BTreeMap::new();
        for (custom_name, raw_custom) in raw.custom {
            let field = self
                .registry
                .by_type(&raw_custom.data_type, &FieldDef::new())
                .map_err(|source| LoadError::Field {
                    path: format!("{}.custom.{}", name, custom_name),
                    source,
                })?;
            let custom = CustomField {
                path: raw_custom.path.unwrap_or_else(|| custom_name.clone()),
                query: raw_custom.query,
                join: raw_custom.join,
                field,
            };
            custom_fields.insert(custom_name, FieldSetFieldDef::Custom(Arc::new(custom)));
        }

        let mut raw_sets = raw.field_sets;
        if !raw_sets.contains_key(DEFAULT_FIELD_SET) {
            raw_sets.insert(
                DEFAULT_FIELD_SET.to_string(),
                raw.fields.keys().cloned().collect(),
            );
        }
        if !raw_sets.contains_key(IDENTITY_FIELD_SET) {
            if !raw.fields.contains_key("name") {
                return Err(LoadError::MissingIdentity(name.to_string()));
            }
            raw_sets.insert(IDENTITY_FIELD_SET.to_string(), vec!["name".to_string()]);
        }

        let mut field_sets = BTreeMap::new();
        for (set_name, mut members) in raw_sets {
            debug!(collection = %name, fieldset = %set_name, "evaluate fieldset");
            if !members.iter().any(|m| m == PRIMARY_KEY) {
                members.push(PRIMARY_KEY.to_string());
            }
            let defs = members
                .iter()
                .map(|member| match custom_fields.get(member) {
                    Some(custom) => custom.clone(),
                    None => FieldSetFieldDef::Normal(FieldPath::new(member)),
                })
                .collect();
            field_sets.insert(set_name, defs);
        }

        let search_prefixes = raw
            .search_prefixes
            .into_iter()
            .map(|(prefix, raw_prefix)| {
                let search_prefix = SearchPrefix {
                    prefix: prefix.clone(),
                    field_name: raw_prefix.field,
                };
                (prefix, search_prefix)
            })
            .collect();

        Ok(Collection {
            table_name: name.to_string(),
            fields,
            field_sets,
            custom_fields,
            hooks: Vec::new(),
            search_prefixes,
        })
    }

    fn custom_query(&self, name: &str, raw: RawCustomQuery) -> LoadResult<CustomQuery> {
        let mut parameters = Vec::with_capacity(raw.parameters.len());
        for (i, def) in raw.parameters.iter().enumerate() {
            let path = || format!("{}.[in][{}]", name, i);
            let field = self
                .registry
                .from_def(def)
                .map_err(|source| LoadError::Field { path: path(), source })?;
            let bind = param_str(def, "field")
                .map_err(|source| LoadError::Field { path: path(), source })?
                .map(str::to_string);
            parameters.push(QueryParameter { field, bind });
        }

        let mut columns = BTreeMap::new();
        for (column, def) in &raw.columns {
            let field = self.registry.from_def(def).map_err(|source| LoadError::Field {
                path: format!("{}.[out][{}]", name, column),
                source,
            })?;
            columns.insert(column.clone(), field);
        }

        let placeholders = count_placeholders(&raw.query);
        if placeholders != parameters.len() {
            return Err(LoadError::PlaceholderCount {
                name: name.to_string(),
                placeholders,
                parameters: parameters.len(),
            });
        }

        Ok(CustomQuery {
            name: name.to_string(),
            query: raw.query,
            parameters,
            columns,
        })
    }

    fn hook(&self, raw: RawHook) -> LoadResult<Hook> {
        let action = match (raw.set, raw.email, raw.raw) {
            (Some(set), None, None) => HookAction::Set(set),
            (None, Some(email), None) => HookAction::Email(HookEmail {
                recipient: email.recipient,
                template: email.template,
            }),
            (None, None, Some(raw_query)) => {
                let name = format!("hook {}.{}", raw.collection, raw.when.field);
                debug!(hook = %name, "custom query in hook");
                HookAction::Query(Arc::new(self.custom_query(&name, raw_query)?))
            }
            (set, email, raw_query) => {
                let found = usize::from(set.is_some())
                    + usize::from(email.is_some())
                    + usize::from(raw_query.is_some());
                return Err(LoadError::HookAction {
                    collection: raw.collection,
                    field: raw.when.field,
                    found,
                });
            }
        };

        Ok(Hook {
            collection: raw.collection,
            when: HookWhen {
                field: raw.when.field,
                what: raw.when.what,
            },
            action,
        })
    }
}

/// Every record field a hook query binds must be declared on the collection.
fn check_hook_bindings(collection: &Collection, hook: &Hook) -> LoadResult<()> {
    let HookAction::Query(query) = &hook.action else {
        return Ok(());
    };
    for param in &query.parameters {
        let Some(bind) = &param.bind else {
            continue;
        };
        if !collection.fields.contains_key(bind) {
            return Err(LoadError::UnknownHookBinding {
                collection: hook.collection.clone(),
                field: bind.clone(),
            });
        }
    }
    Ok(())
}

/// Reference fields and custom-field joins must name existing collections.
fn validate_references(collections: &BTreeMap<String, Collection>) -> LoadResult<()> {
    for (name, collection) in collections {
        for (field_name, field) in &collection.fields {
            if let Some(target) = field.references() {
                if !collections.contains_key(target) {
                    return Err(LoadError::UnknownReference {
                        path: format!("{}.{}", name, field_name),
                        collection: target.to_string(),
                    });
                }
            }
        }

        for def in collection.custom_fields.values() {
            let FieldSetFieldDef::Custom(custom) = def else {
                continue;
            };
            let Some(join) = &custom.join else {
                continue;
            };
            for token in placeholder::placeholders(join) {
                if !collections.contains_key(token) {
                    return Err(LoadError::UnknownJoinCollection {
                        path: format!("{}.{}", name, custom.path),
                        token: token.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Convenience entry points
// =============================================================================

/// Load a model from a file path with the built-in field types.
pub fn load_model(path: &Path) -> LoadResult<Model> {
    ModelLoader::default().load_file(path)
}

/// Load a model from a JSON string with the built-in field types.
pub fn load_model_from_str(json: &str) -> LoadResult<Model> {
    ModelLoader::default().load_str(json)
}

impl Model {
    pub fn from_json(json: &str) -> LoadResult<Model> {
        load_model_from_str(json)
    }

    pub fn from_file(path: &Path) -> LoadResult<Model> {
        load_model(path)
    }
}
