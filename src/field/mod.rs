//! Typed field capabilities.
//!
//! A [`Field`] escapes request values into SQL literals, reports whether it
//! takes part in free-text search, and says how a result column of its type
//! is decoded. Concrete types are built by a [`FieldRegistry`] keyed on the
//! `type` tag of a field definition:
//!
//! ```json
//! { "type": "ref", "collection": "author" }
//! ```

mod builtin;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

pub use builtin::{BoolField, DateField, EnumField, FloatField, IntField, RefField, StringField};

/// Errors raised while building a field or escaping a value through it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("field definition has no 'type'")]
    MissingType,

    #[error("unknown data type '{0}'")]
    UnknownType(String),

    #[error("param {param} {message}")]
    InvalidParam { param: String, message: String },

    #[error("cannot use {value} as {type_name}")]
    InvalidValue {
        type_name: &'static str,
        value: String,
    },
}

impl FieldError {
    pub fn invalid_value(type_name: &'static str, value: &Value) -> Self {
        Self::InvalidValue {
            type_name,
            value: value.to_string(),
        }
    }
}

pub type FieldResult<T> = Result<T, FieldError>;

/// Shared handle to a field capability.
pub type FieldRef = Arc<dyn Field>;

/// A raw field definition: the `type` tag plus type parameters.
pub type FieldDef = Map<String, Value>;

/// How a result column is read back from the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    Text,
    Integer,
    Float,
    Bool,
}

/// The per-type capability the compiler consumes.
pub trait Field: fmt::Debug + Send + Sync {
    /// The registry tag this field was built from.
    fn type_name(&self) -> &'static str;

    /// Escape a value into a SQL literal. Never returns unescaped input.
    fn to_db(&self, value: &Value) -> FieldResult<String>;

    /// Escape the text of a `LIKE` pattern. Types that validate their domain
    /// on `to_db` relax it here, since a pattern is a fragment.
    fn to_db_pattern(&self, value: &Value) -> FieldResult<String> {
        self.to_db(value)
    }

    /// Whether `*` free-text search matches against this field.
    fn is_searchable(&self) -> bool {
        false
    }

    /// Decoding target for result columns of this type.
    fn scan_target(&self) -> ScanTarget;

    /// Collection this field points at, for fields that can be joined through.
    fn references(&self) -> Option<&str> {
        None
    }
}

/// Builds a field from its definition.
pub type FieldConstructor = fn(&FieldDef) -> FieldResult<FieldRef>;

/// Type tag to constructor mapping.
#[derive(Clone)]
pub struct FieldRegistry {
    constructors: HashMap<String, FieldConstructor>,
}

impl FieldRegistry {
    /// A registry with no types.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry with the built-in types.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry
            .register("string", StringField::construct)
            .register("text", StringField::construct_text)
            .register("enum", EnumField::construct)
            .register("int", IntField::construct_int)
            .register("integer", IntField::construct_int)
            .register("id", IntField::construct_id)
            .register("ref", RefField::construct)
            .register("float", FloatField::construct)
            .register("decimal", FloatField::construct)
            .register("bool", BoolField::construct)
            .register("boolean", BoolField::construct)
            .register("date", DateField::construct)
            .register("datetime", DateField::construct);
        registry
    }

    /// Register (or replace) a type tag.
    pub fn register(&mut self, tag: &str, constructor: FieldConstructor) -> &mut Self {
        self.constructors.insert(tag.to_string(), constructor);
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Build a field of the given type from its parameters.
    pub fn by_type(&self, tag: &str, def: &FieldDef) -> FieldResult<FieldRef> {
        let constructor = self
            .constructors
            .get(tag)
            .ok_or_else(|| FieldError::UnknownType(tag.to_string()))?;
        constructor(def)
    }

    /// Build a field from a definition carrying its own `type` tag.
    pub fn from_def(&self, def: &FieldDef) -> FieldResult<FieldRef> {
        let tag = param_str(def, "type")?.ok_or(FieldError::MissingType)?;
        self.by_type(tag, def)
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("FieldRegistry").field("types", &tags).finish()
    }
}

// =============================================================================
// Parameter helpers
// =============================================================================

/// Read an optional string parameter.
pub fn param_str<'a>(def: &'a FieldDef, name: &str) -> FieldResult<Option<&'a str>> {
    match def.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(FieldError::InvalidParam {
            param: name.to_string(),
            message: "value must be a string".to_string(),
        }),
    }
}

/// Read an optional integer parameter.
pub fn param_int(def: &FieldDef, name: &str) -> FieldResult<Option<i64>> {
    match def.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| FieldError::InvalidParam {
            param: name.to_string(),
            message: "value must be an integer".to_string(),
        }),
    }
}

/// Read an optional list-of-strings parameter.
pub fn param_str_list(def: &FieldDef, name: &str) -> FieldResult<Option<Vec<String>>> {
    let invalid = || FieldError::InvalidParam {
        param: name.to_string(),
        message: "value must be an array of strings".to_string(),
    };
    match def.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(invalid))
            .collect::<FieldResult<Vec<_>>>()
            .map(Some),
        Some(_) => Err(invalid()),
    }
}
