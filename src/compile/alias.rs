//! Per-query table alias graph.
//!
//! Every path prefix walked through reference fields (`author`,
//! `author.company`) gets exactly one LEFT JOIN and one alias, no matter how
//! many projection members or conditions traverse it. The graph lives for a
//! single compilation, so concurrent compilations never share aliases.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{CompileError, CompileResult};
use crate::field::FieldRef;
use crate::model::{Collection, FieldPath, Model, PRIMARY_KEY};
use crate::sql::{table_col, ExprExt, Join, TableRef};

/// A collection bound to its alias in the current query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedTable {
    pub collection: String,
    pub alias: String,
}

/// A field path resolved to a qualified column.
#[derive(Debug, Clone)]
pub struct ResolvedColumn {
    pub table: MappedTable,
    pub column: String,
    pub field: FieldRef,
}

#[derive(Debug)]
pub struct AliasGraph<'m> {
    model: &'m Model,
    base: MappedTable,
    counter: usize,
    joins: Vec<Join>,
    by_path: HashMap<String, MappedTable>,
    // First alias bound to each collection, for `[collection]` join tokens.
    by_collection: BTreeMap<String, String>,
}

fn alias_letter(collection: &str) -> char {
    match collection.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => c.to_ascii_lowercase(),
        _ => 't',
    }
}

impl<'m> AliasGraph<'m> {
    pub fn new(model: &'m Model, base_collection: &str) -> Self {
        let base = MappedTable {
            collection: base_collection.to_string(),
            alias: alias_letter(base_collection).to_string(),
        };
        let mut by_collection = BTreeMap::new();
        by_collection.insert(base.collection.clone(), base.alias.clone());
        Self {
            model,
            base,
            counter: 0,
            joins: Vec::new(),
            by_path: HashMap::new(),
            by_collection,
        }
    }

    pub fn base(&self) -> &MappedTable {
        &self.base
    }

    pub fn base_table_ref(&self) -> TableRef {
        TableRef::new(&self.base.collection).with_alias(&self.base.alias)
    }

    fn collection(&self, name: &str) -> CompileResult<&'m Collection> {
        Ok(self.model.collection(name)?)
    }

    fn allocate(&mut self, collection: &str) -> String {
        self.counter += 1;
        format!("{}{}", alias_letter(collection), self.counter)
    }

    /// Follow `hops` from the base table, joining each unseen prefix.
    pub fn walk(&mut self, hops: &[String]) -> CompileResult<MappedTable> {
        let mut current = self.base.clone();
        for (i, hop) in hops.iter().enumerate() {
            let key = hops[..=i].join(".");
            if let Some(mapped) = self.by_path.get(&key) {
                current = mapped.clone();
                continue;
            }

            let collection = self.collection(&current.collection)?;
            let field = collection
                .field(hop)
                .ok_or_else(|| CompileError::UnknownField {
                    collection: current.collection.clone(),
                    field: hop.clone(),
                })?;
            let target = field
                .references()
                .ok_or_else(|| CompileError::NotAReference {
                    collection: current.collection.clone(),
                    field: hop.clone(),
                })?;
            let target = self.collection(target)?.table_name.clone();

            let alias = self.allocate(&target);
            debug!(path = %key, table = %target, alias = %alias, "join");
            self.joins.push(Join::left(
                TableRef::new(&target).with_alias(&alias),
                table_col(&alias, PRIMARY_KEY).eq(table_col(&current.alias, hop)),
            ));

            let mapped = MappedTable {
                collection: target,
                alias,
            };
            self.by_collection
                .entry(mapped.collection.clone())
                .or_insert_with(|| mapped.alias.clone());
            self.by_path.insert(key, mapped.clone());
            current = mapped;
        }
        Ok(current)
    }

    /// Resolve a dotted path to its aliased column and declared field.
    pub fn resolve(&mut self, path: &FieldPath) -> CompileResult<ResolvedColumn> {
        let table = self.walk(path.hops())?;
        let collection = self.collection(&table.collection)?;
        let field = collection
            .field(path.terminal())
            .cloned()
            .ok_or_else(|| CompileError::UnknownField {
                collection: table.collection.clone(),
                field: path.terminal().to_string(),
            })?;
        Ok(ResolvedColumn {
            table,
            column: path.terminal().to_string(),
            field,
        })
    }

    /// Alias already bound to `collection` in this query, if any.
    pub fn alias_for_collection(&self, collection: &str) -> Option<&str> {
        self.by_collection.get(collection).map(String::as_str)
    }

    /// Append a model-written join whose tokens are already resolved.
    pub fn push_raw_join(&mut self, sql: String) {
        self.joins.push(Join::Raw(sql));
    }

    pub fn into_joins(self) -> Vec<Join> {
        self.joins
    }
}
