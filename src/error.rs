//! Request-level errors.
//!
//! Everything here is caused by the request rather than the model or the
//! database, and is safe to show to whoever sent it.

use crate::field::FieldError;

/// A recoverable, user-facing error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("Collection {0} doesn't exist")]
    UnknownCollection(String),

    #[error("Fieldset {fieldset} doesn't exist in {collection}")]
    UnknownFieldSet {
        collection: String,
        fieldset: String,
    },

    #[error("Custom query {0} doesn't exist")]
    UnknownCustomQuery(String),

    #[error("Cannot query on non mapped field '{0}'")]
    UnmappedField(String),

    #[error("Sort referenced non mapped field '{0}'")]
    UnmappedSortField(String),

    #[error("IN conditions on '{0}' require that val is an array")]
    InRequiresArray(String),

    #[error("Compare method '{0}' not allowed")]
    UnsupportedComparator(String),

    #[error("Invalid value for '{field}': {source}")]
    InvalidValue {
        field: String,
        #[source]
        source: FieldError,
    },

    #[error("building condition {index}: {source}")]
    Condition {
        index: usize,
        #[source]
        source: Box<QueryError>,
    },

    #[error("Offset {0} is out of range")]
    OffsetOutOfRange(u64),

    #[error("Record has no field '{0}' to bind to the hook query")]
    UnboundRecordField(String),

    #[error("Could not run query, got {got} parameters, expected {expected}")]
    ParameterCount { got: usize, expected: usize },

    #[error("No {collection} record with id {pk}")]
    NotFound { collection: String, pk: u64 },
}

impl QueryError {
    /// Every variant is caused by the request. Kept as a method so callers
    /// classifying wrapped errors do not match on variants.
    pub fn is_user_error(&self) -> bool {
        true
    }

    pub fn invalid_value(field: &str, source: FieldError) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            source,
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
