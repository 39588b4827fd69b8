//! Field-set projection: members to SELECT columns.

use tracing::debug;

use super::alias::AliasGraph;
use super::placeholder::substitute_placeholders;
use super::{CompileError, CompileResult, OutputColumn};
use crate::field::FieldRef;
use crate::model::{CustomField, FieldPath, FieldSetFieldDef};
use crate::sql::{paren, raw_sql, table_col, Expr, SelectExpr};

/// Where a projected value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    /// `alias.column`
    Column { table: String, column: String },
    /// A custom field expression with its placeholders resolved.
    Computed(String),
}

/// One projected member, addressable by its path in conditions and sorts.
#[derive(Debug, Clone)]
pub struct MappedField {
    pub path: String,
    /// Select-list alias, `f0`, `f1`, ...
    pub label: String,
    pub source: ColumnSource,
    pub field: FieldRef,
    pub custom: bool,
}

impl MappedField {
    /// The expression used when this member appears in a predicate.
    pub fn expr(&self) -> Expr {
        match &self.source {
            ColumnSource::Column { table, column } => table_col(table, column),
            ColumnSource::Computed(sql) => paren(raw_sql(sql)),
        }
    }

    /// Only declared columns take part in `*` search.
    pub fn is_searchable(&self) -> bool {
        !self.custom && self.field.is_searchable()
    }

    fn select_expr(&self) -> SelectExpr {
        let expr = match &self.source {
            ColumnSource::Column { table, column } => table_col(table, column),
            ColumnSource::Computed(sql) => raw_sql(sql),
        };
        SelectExpr::new(expr).with_alias(&self.label)
    }
}

/// The ordered select list of one compilation.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    fields: Vec<MappedField>,
}

impl Projection {
    /// Resolve `members` against the graph's base collection.
    ///
    /// Joins needed along the way are added to `graph`. A member that fails
    /// to resolve fails the whole projection.
    pub fn build(graph: &mut AliasGraph<'_>, members: &[FieldSetFieldDef]) -> CompileResult<Self> {
        let mut projection = Projection::default();
        for member in members {
            if projection.get(member.path()).is_some() {
                continue;
            }
            let label = format!("f{}", projection.fields.len());
            let mapped = match member {
                FieldSetFieldDef::Normal(path) => map_normal(graph, path, label),
                FieldSetFieldDef::Custom(custom) => map_custom(graph, custom, label),
            }
            .map_err(|source| CompileError::Member {
                collection: graph.base().collection.clone(),
                member: member.path().to_string(),
                source: Box::new(source),
            })?;
            debug!(path = %mapped.path, label = %mapped.label, "mapped field");
            projection.fields.push(mapped);
        }
        Ok(projection)
    }

    pub fn get(&self, path: &str) -> Option<&MappedField> {
        self.fields.iter().find(|f| f.path == path)
    }

    pub fn fields(&self) -> &[MappedField] {
        &self.fields
    }

    pub fn searchable(&self) -> impl Iterator<Item = &MappedField> {
        self.fields.iter().filter(|f| f.is_searchable())
    }

    pub fn select_list(&self) -> Vec<SelectExpr> {
        self.fields.iter().map(MappedField::select_expr).collect()
    }

    pub fn output_columns(&self) -> Vec<OutputColumn> {
        self.fields
            .iter()
            .map(|f| OutputColumn {
                path: f.path.clone(),
                label: f.label.clone(),
                scan: f.field.scan_target(),
            })
            .collect()
    }
}

fn map_normal(
    graph: &mut AliasGraph<'_>,
    path: &FieldPath,
    label: String,
) -> CompileResult<MappedField> {
    let resolved = graph.resolve(path)?;
    Ok(MappedField {
        path: path.as_str().to_string(),
        label,
        source: ColumnSource::Column {
            table: resolved.table.alias,
            column: resolved.column,
        },
        field: resolved.field,
        custom: false,
    })
}

fn map_custom(
    graph: &mut AliasGraph<'_>,
    custom: &CustomField,
    label: String,
) -> CompileResult<MappedField> {
    // The expression first: its paths create the aliases the join may name.
    let sql = substitute_placeholders(&custom.query, |token| {
        let resolved = graph.resolve(&FieldPath::new(token))?;
        Ok::<_, CompileError>(format!("{}.{}", resolved.table.alias, resolved.column))
    })?;

    if let Some(join) = &custom.join {
        let join = substitute_placeholders(join, |token| {
            graph
                .alias_for_collection(token)
                .map(str::to_string)
                .ok_or_else(|| CompileError::UnresolvedJoinToken {
                    field: custom.path.clone(),
                    token: token.to_string(),
                })
        })?;
        graph.push_raw_join(join);
    }

    Ok(MappedField {
        path: custom.path.clone(),
        label,
        source: ColumnSource::Computed(sql),
        field: custom.field.clone(),
        custom: true,
    })
}
