//! WHERE, ORDER BY and LIMIT/OFFSET builders.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::projection::{MappedField, Projection};
use super::QueryConditions;
use crate::error::{QueryError, QueryResult};
use crate::field::FieldError;
use crate::model::{Collection, PRIMARY_KEY};
use crate::sql::{
    col, or_all, paren, raw_sql, BinaryOperator, Expr, ExprExt, LimitOffset, OrderByExpr,
};

static NOT_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("static pattern"));

/// Search key that matches across every searchable field.
pub const SEARCH_ALL: &str = "*";

/// A structured filter: `field cmp val`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub cmp: String,
    pub val: Value,
}

impl Condition {
    pub fn new(field: &str, cmp: &str, val: Value) -> Self {
        Self {
            field: field.to_string(),
            cmp: cmp.to_string(),
            val,
        }
    }
}

/// A sort entry. Negative direction sorts descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    #[serde(rename = "fieldName")]
    pub field_name: String,
    pub direction: i32,
}

/// Comparison operators accepted in conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lte,
    Gte,
    Lt,
    Gt,
    Like,
    In,
}

impl FromStr for Comparator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Comparator::Eq),
            "!=" => Ok(Comparator::Ne),
            "<=" => Ok(Comparator::Lte),
            ">=" => Ok(Comparator::Gte),
            "<" => Ok(Comparator::Lt),
            ">" => Ok(Comparator::Gt),
            "LIKE" => Ok(Comparator::Like),
            "IN" => Ok(Comparator::In),
            other => Err(QueryError::UnsupportedComparator(other.to_string())),
        }
    }
}

/// Split a search term on runs of non-alphanumerics, dropping empty parts.
pub fn tokenize(term: &str) -> Vec<&str> {
    NOT_ALPHANUMERIC
        .split(term)
        .filter(|part| !part.is_empty())
        .collect()
}

/// The id an all-digit `*` search term stands for.
pub fn numeric_id(term: &str) -> Option<u64> {
    if term.is_empty() || !term.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    term.parse().ok()
}

fn mapped<'p>(projection: &'p Projection, field: &str) -> QueryResult<&'p MappedField> {
    projection
        .get(field)
        .ok_or_else(|| QueryError::UnmappedField(field.to_string()))
}

fn escape(field: &MappedField, value: &Value) -> QueryResult<String> {
    field
        .field
        .to_db(value)
        .map_err(|e| QueryError::invalid_value(&field.path, e))
}

/// A null that no comparison other than `=`/`!=` can match.
fn reject_null(field: &MappedField) -> QueryError {
    QueryError::invalid_value(
        &field.path,
        FieldError::invalid_value(field.field.type_name(), &Value::Null),
    )
}

/// `field LIKE '%text%'`, with `text` escaped by the field first.
fn like(field: &MappedField, value: &Value) -> QueryResult<Expr> {
    if value.is_null() {
        return Err(reject_null(field));
    }
    let escaped = field
        .field
        .to_db_pattern(value)
        .map_err(|e| QueryError::invalid_value(&field.path, e))?;
    let inner = escaped
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(&escaped);
    Ok(field.expr().like(raw_sql(&format!("'%{}%'", inner))))
}

/// Compile one structured condition.
pub fn condition_expr(projection: &Projection, condition: &Condition) -> QueryResult<Expr> {
    let field = mapped(projection, &condition.field)?;
    let cmp: Comparator = condition.cmp.parse()?;

    let op = match cmp {
        Comparator::In => {
            let Value::Array(values) = &condition.val else {
                return Err(QueryError::InRequiresArray(condition.field.clone()));
            };
            let escaped = values
                .iter()
                .map(|v| escape(field, v).map(|s| raw_sql(&s)))
                .collect::<QueryResult<Vec<_>>>()?;
            return Ok(field.expr().in_list(escaped));
        }
        Comparator::Like => return like(field, &condition.val),
        Comparator::Eq if condition.val.is_null() => return Ok(field.expr().is_null()),
        Comparator::Ne if condition.val.is_null() => return Ok(field.expr().is_not_null()),
        _ if condition.val.is_null() => return Err(reject_null(field)),
        Comparator::Eq => BinaryOperator::Eq,
        Comparator::Ne => BinaryOperator::Ne,
        Comparator::Lte => BinaryOperator::Lte,
        Comparator::Gte => BinaryOperator::Gte,
        Comparator::Lt => BinaryOperator::Lt,
        Comparator::Gt => BinaryOperator::Gt,
    };
    let escaped = escape(field, &condition.val)?;
    Ok(field.expr().binary(op, raw_sql(&escaped)))
}

fn search_one_field(projection: &Projection, field: &str, parts: &[&str]) -> QueryResult<Expr> {
    let field = mapped(projection, field)?;
    let likes = parts
        .iter()
        .map(|part| like(field, &Value::String(part.to_string())))
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(paren(or_all(likes).unwrap_or(Expr::Raw("0 = 1".into()))))
}

fn search_everywhere(projection: &Projection, parts: &[&str]) -> QueryResult<Vec<Expr>> {
    parts
        .iter()
        .map(|part| {
            let value = Value::String(part.to_string());
            let likes = projection
                .searchable()
                .map(|field| like(field, &value))
                .collect::<QueryResult<Vec<_>>>()?;
            Ok(paren(or_all(likes).unwrap_or(Expr::Raw("0 = 1".into()))))
        })
        .collect()
}

/// Compile free-text search entries into WHERE conditions.
fn search_exprs(
    collection: &Collection,
    projection: &Projection,
    key: &str,
    term: &str,
) -> QueryResult<Vec<Expr>> {
    if key != SEARCH_ALL {
        let parts = tokenize(term);
        if parts.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![search_one_field(projection, key, &parts)?]);
    }

    if let Some(id) = numeric_id(term) {
        let pk = Condition::new(PRIMARY_KEY, "=", Value::from(id));
        return Ok(vec![condition_expr(projection, &pk)?]);
    }

    if let Some((prefix, rest)) = term.split_once(':') {
        if let Some(search_prefix) = collection.search_prefixes.get(prefix) {
            debug!(prefix = %prefix, field = %search_prefix.field_name, "search prefix");
            return search_exprs(collection, projection, &search_prefix.field_name, rest);
        }
    }

    let parts = tokenize(term);
    search_everywhere(projection, &parts)
}

/// Build the full WHERE list: primary key, structured conditions, then search.
///
/// Errors are tagged with the index of the condition that produced them.
pub fn where_exprs(
    collection: &Collection,
    projection: &Projection,
    conditions: &QueryConditions,
) -> QueryResult<Vec<Expr>> {
    let mut structured = Vec::with_capacity(conditions.r#where.len() + 1);
    if let Some(pk) = conditions.pk {
        structured.push(Condition::new(PRIMARY_KEY, "=", Value::from(pk)));
    }
    structured.extend(conditions.r#where.iter().cloned());

    let mut exprs = Vec::with_capacity(structured.len());
    for (index, condition) in structured.iter().enumerate() {
        let expr = condition_expr(projection, condition).map_err(|source| QueryError::Condition {
            index,
            source: Box::new(source),
        })?;
        exprs.push(expr);
    }

    for (key, term) in &conditions.search {
        let index = exprs.len();
        let found = search_exprs(collection, projection, key, term).map_err(|source| {
            QueryError::Condition {
                index,
                source: Box::new(source),
            }
        })?;
        exprs.extend(found);
    }

    Ok(exprs)
}

/// ORDER BY entries, referencing select-list labels.
pub fn order_by(projection: &Projection, sorts: &[Sort]) -> QueryResult<Vec<OrderByExpr>> {
    sorts
        .iter()
        .map(|sort| {
            let field = projection
                .get(&sort.field_name)
                .ok_or_else(|| QueryError::UnmappedSortField(sort.field_name.clone()))?;
            let label = col(&field.label);
            Ok(if sort.direction < 0 {
                OrderByExpr::desc(label)
            } else {
                OrderByExpr::asc(label)
            })
        })
        .collect()
}

/// LIMIT only when positive; OFFSET whenever given.
///
/// SQLite reads OFFSET as a signed 64-bit integer, so larger offsets are
/// rejected rather than wrapped.
pub fn page(limit: Option<i64>, offset: Option<u64>) -> QueryResult<LimitOffset> {
    if let Some(off) = offset {
        if i64::try_from(off).is_err() {
            return Err(QueryError::OffsetOutOfRange(off));
        }
    }
    Ok(LimitOffset {
        limit: limit.and_then(|l| u64::try_from(l).ok()).filter(|l| *l > 0),
        offset,
    })
}
