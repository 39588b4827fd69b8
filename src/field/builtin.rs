//! Built-in field types.

use std::sync::Arc;

use serde_json::Value;

use super::{
    param_int, param_str, param_str_list, Field, FieldDef, FieldError, FieldRef, FieldResult,
    ScanTarget,
};
use crate::sql::quote_string;

/// Plain text. Searchable.
#[derive(Debug, Clone, Default)]
pub struct StringField {
    long: bool,
    max_length: Option<usize>,
}

impl StringField {
    pub fn construct(def: &FieldDef) -> FieldResult<FieldRef> {
        Ok(Arc::new(Self::parse(def, false)?))
    }

    pub fn construct_text(def: &FieldDef) -> FieldResult<FieldRef> {
        Ok(Arc::new(Self::parse(def, true)?))
    }

    fn parse(def: &FieldDef, long: bool) -> FieldResult<Self> {
        let max_length = match param_int(def, "maxLength")? {
            Some(n) if n <= 0 => {
                return Err(FieldError::InvalidParam {
                    param: "maxLength".into(),
                    message: "must be positive".into(),
                })
            }
            Some(n) => Some(n as usize),
            None => None,
        };
        Ok(Self { long, max_length })
    }
}

impl Field for StringField {
    fn type_name(&self) -> &'static str {
        if self.long {
            "text"
        } else {
            "string"
        }
    }

    fn to_db(&self, value: &Value) -> FieldResult<String> {
        let s = match value {
            Value::Null => return Ok("NULL".into()),
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(FieldError::invalid_value(self.type_name(), value)),
        };
        if let Some(max) = self.max_length {
            if s.chars().count() > max {
                return Err(FieldError::invalid_value(self.type_name(), value));
            }
        }
        Ok(quote_string(&s))
    }

    fn is_searchable(&self) -> bool {
        true
    }

    fn scan_target(&self) -> ScanTarget {
        ScanTarget::Text
    }
}

/// Text restricted to a fixed set of choices. Searchable.
#[derive(Debug, Clone)]
pub struct EnumField {
    choices: Vec<String>,
}

impl EnumField {
    pub fn construct(def: &FieldDef) -> FieldResult<FieldRef> {
        let choices = param_str_list(def, "choices")?.ok_or_else(|| FieldError::InvalidParam {
            param: "choices".into(),
            message: "is required".into(),
        })?;
        Ok(Arc::new(Self { choices }))
    }
}

impl Field for EnumField {
    fn type_name(&self) -> &'static str {
        "enum"
    }

    fn to_db(&self, value: &Value) -> FieldResult<String> {
        match value {
            Value::Null => Ok("NULL".into()),
            Value::String(s) if self.choices.iter().any(|c| c == s) => Ok(quote_string(s)),
            _ => Err(FieldError::invalid_value(self.type_name(), value)),
        }
    }

    fn to_db_pattern(&self, value: &Value) -> FieldResult<String> {
        match value {
            Value::String(s) => Ok(quote_string(s)),
            _ => Err(FieldError::invalid_value(self.type_name(), value)),
        }
    }

    fn is_searchable(&self) -> bool {
        true
    }

    fn scan_target(&self) -> ScanTarget {
        ScanTarget::Text
    }
}

/// Whole numbers. `id` is the unsigned primary-key flavour.
#[derive(Debug, Clone)]
pub struct IntField {
    unsigned: bool,
}

impl IntField {
    pub fn construct_int(_: &FieldDef) -> FieldResult<FieldRef> {
        Ok(Arc::new(Self { unsigned: false }))
    }

    pub fn construct_id(_: &FieldDef) -> FieldResult<FieldRef> {
        Ok(Arc::new(Self { unsigned: true }))
    }

    pub fn primary_key() -> FieldRef {
        Arc::new(Self { unsigned: true })
    }
}

impl Field for IntField {
    fn type_name(&self) -> &'static str {
        if self.unsigned {
            "id"
        } else {
            "int"
        }
    }

    fn to_db(&self, value: &Value) -> FieldResult<String> {
        if value.is_null() {
            return Ok("NULL".into());
        }
        let n = integer_value(value)
            .ok_or_else(|| FieldError::invalid_value(self.type_name(), value))?;
        if self.unsigned && n < 0 {
            return Err(FieldError::invalid_value(self.type_name(), value));
        }
        Ok(n.to_string())
    }

    fn scan_target(&self) -> ScanTarget {
        ScanTarget::Integer
    }
}

/// A foreign key into another collection; joins are synthesized through it.
#[derive(Debug, Clone)]
pub struct RefField {
    collection: String,
}

impl RefField {
    pub fn construct(def: &FieldDef) -> FieldResult<FieldRef> {
        let collection = param_str(def, "collection")?.ok_or_else(|| FieldError::InvalidParam {
            param: "collection".into(),
            message: "is required".into(),
        })?;
        Ok(Arc::new(Self {
            collection: collection.to_string(),
        }))
    }
}

impl Field for RefField {
    fn type_name(&self) -> &'static str {
        "ref"
    }

    fn to_db(&self, value: &Value) -> FieldResult<String> {
        if value.is_null() {
            return Ok("NULL".into());
        }
        match integer_value(value) {
            Some(n) if n >= 0 => Ok(n.to_string()),
            _ => Err(FieldError::invalid_value(self.type_name(), value)),
        }
    }

    fn scan_target(&self) -> ScanTarget {
        ScanTarget::Integer
    }

    fn references(&self) -> Option<&str> {
        Some(&self.collection)
    }
}

/// Floating point numbers.
#[derive(Debug, Clone)]
pub struct FloatField;

impl FloatField {
    pub fn construct(_: &FieldDef) -> FieldResult<FieldRef> {
        Ok(Arc::new(Self))
    }
}

impl Field for FloatField {
    fn type_name(&self) -> &'static str {
        "float"
    }

    fn to_db(&self, value: &Value) -> FieldResult<String> {
        let f = match value {
            Value::Null => return Ok("NULL".into()),
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match f {
            Some(f) if f.is_finite() => {
                let mut buffer = ryu::Buffer::new();
                Ok(buffer.format(f).to_string())
            }
            _ => Err(FieldError::invalid_value(self.type_name(), value)),
        }
    }

    fn scan_target(&self) -> ScanTarget {
        ScanTarget::Float
    }
}

/// Booleans, stored as 1/0.
#[derive(Debug, Clone)]
pub struct BoolField;

impl BoolField {
    pub fn construct(_: &FieldDef) -> FieldResult<FieldRef> {
        Ok(Arc::new(Self))
    }
}

impl Field for BoolField {
    fn type_name(&self) -> &'static str {
        "bool"
    }

    fn to_db(&self, value: &Value) -> FieldResult<String> {
        let b = match value {
            Value::Null => return Ok("NULL".into()),
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(s) => match s.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        match b {
            Some(true) => Ok("1".into()),
            Some(false) => Ok("0".into()),
            None => Err(FieldError::invalid_value(self.type_name(), value)),
        }
    }

    fn scan_target(&self) -> ScanTarget {
        ScanTarget::Bool
    }
}

/// Dates and timestamps, kept as quoted text. Not searchable.
#[derive(Debug, Clone)]
pub struct DateField;

impl DateField {
    pub fn construct(_: &FieldDef) -> FieldResult<FieldRef> {
        Ok(Arc::new(Self))
    }
}

impl Field for DateField {
    fn type_name(&self) -> &'static str {
        "date"
    }

    fn to_db(&self, value: &Value) -> FieldResult<String> {
        match value {
            Value::Null => Ok("NULL".into()),
            Value::String(s) => Ok(quote_string(s)),
            _ => Err(FieldError::invalid_value(self.type_name(), value)),
        }
    }

    fn scan_target(&self) -> ScanTarget {
        ScanTarget::Text
    }
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
