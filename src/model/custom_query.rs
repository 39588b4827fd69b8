//! Named, parameterized raw SQL statements.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::compile::OutputColumn;
use crate::error::{QueryError, QueryResult};
use crate::field::FieldRef;

/// A reusable raw SQL template with typed `?` inputs and typed output columns.
#[derive(Debug)]
pub struct CustomQuery {
    pub name: String,
    pub query: String,
    pub parameters: Vec<QueryParameter>,
    pub columns: BTreeMap<String, FieldRef>,
}

/// One positional input of a custom query.
#[derive(Debug, Clone)]
pub struct QueryParameter {
    pub field: FieldRef,
    /// Record field a hook binds to this input; the record's id when unset.
    pub bind: Option<String>,
}

impl CustomQuery {
    /// Escape `inputs` through their declared fields and substitute them into
    /// the template, left to right.
    pub fn bind(&self, inputs: &[Value]) -> QueryResult<String> {
        if inputs.len() != self.parameters.len() {
            return Err(QueryError::ParameterCount {
                got: inputs.len(),
                expected: self.parameters.len(),
            });
        }

        let escaped = self
            .parameters
            .iter()
            .zip(inputs)
            .enumerate()
            .map(|(i, (param, value))| {
                param
                    .field
                    .to_db(value)
                    .map_err(|e| QueryError::invalid_value(&format!("{}[{}]", self.name, i), e))
            })
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(substitute_positional(&self.query, &escaped))
    }

    /// Columns read back from each result row, keyed by result column name.
    pub fn output_columns(&self) -> Vec<OutputColumn> {
        self.columns
            .iter()
            .map(|(name, field)| OutputColumn {
                path: name.clone(),
                label: name.clone(),
                scan: field.scan_target(),
            })
            .collect()
    }
}

/// Count `?` placeholders outside single-quoted literals.
pub fn count_placeholders(template: &str) -> usize {
    let mut count = 0;
    scan_placeholders(template, |_| count += 1);
    count
}

/// Replace each `?` outside single-quoted literals with the next value.
///
/// Placeholders beyond the supplied values are left in place.
pub fn substitute_positional(template: &str, values: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut next = values.iter();
    let mut last = 0;
    scan_placeholders(template, |pos| {
        if let Some(value) = next.next() {
            out.push_str(&template[last..pos]);
            out.push_str(value);
            last = pos + 1;
        }
    });
    out.push_str(&template[last..]);
    out
}

fn scan_placeholders(template: &str, mut on_placeholder: impl FnMut(usize)) {
    let mut in_literal = false;
    for (pos, c) in template.char_indices() {
        match c {
            // '' inside a literal toggles twice, which keeps us inside it
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => on_placeholder(pos),
            _ => {}
        }
    }
}
