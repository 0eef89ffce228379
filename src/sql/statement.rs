//! Statement assembler.
//!
//! Combines path resolution and formula compilation into complete
//! parameterised statements. Entity and field names are interpolated from the
//! loaded model; values supplied at run time are only ever bound through the
//! placeholders listed in [`Statement::params`].

use tracing::debug;

use super::formula::FormulaCompiler;
use super::fragment::{
    append_joins, chain_joins, column, quote_bracket, reference_joins, render_filters, render_joins,
    QueryFragment,
};
use crate::error::{CompileError, StatementBuildError, StatementKind};
use crate::model::resolve::resolve_field;
use crate::model::{Entity, Field, ModelRegistry, SortOrder};

/// A SQL statement and the placeholders the caller must bind, in order of
/// first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<String>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.params.contains(&name) {
            self.params.push(name);
        }
        self
    }
}

/// Scopes a list to the rows whose `field` holds the key of a parent row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListContext {
    pub field: String,
    pub key: i64,
}

impl ListContext {
    pub fn new(field: impl Into<String>, key: i64) -> Self {
        Self {
            field: field.into(),
            key,
        }
    }
}

/// Restricts a list to rows whose `column` equals the value bound to
/// `@lookup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupFilter {
    pub column: String,
}

impl LookupFilter {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

/// Builds the statements of one model.
#[derive(Debug, Clone, Copy)]
pub struct StatementAssembler<'m> {
    registry: &'m ModelRegistry,
    compiler: FormulaCompiler<'m>,
}

impl<'m> StatementAssembler<'m> {
    pub fn new(registry: &'m ModelRegistry) -> Self {
        Self {
            registry,
            compiler: FormulaCompiler::new(registry),
        }
    }

    pub fn registry(&self) -> &'m ModelRegistry {
        self.registry
    }

    /// The SELECT list for `entity`.
    ///
    /// With `include_ref_id` (object queries) every field is present, each
    /// Reference field as its raw key, the target's `_archived` flag and the
    /// display value. Without it (lists) only listed, non-computed fields are
    /// present and Reference fields contribute the display value alone.
    pub fn build_columns(&self, entity: &'m Entity, include_ref_id: bool) -> Result<String, CompileError> {
        let mut columns = vec![format!("{}.Id", entity.table())];
        for field in entity.fields.values() {
            if !include_ref_id && !field.listed {
                continue;
            }
            if field.is_computed() {
                if include_ref_id {
                    columns.push(self.compiler.compile_field(entity, field)?.select);
                }
            } else if include_ref_id {
                columns.extend(self.field_columns(entity, field)?);
            } else {
                columns.push(chain_joins(self.registry, entity, field)?.column());
            }
        }
        Ok(columns.join(","))
    }

    /// One aliased INNER JOIN per hop of every (optionally listed-only)
    /// Reference chain, each clause preceded by a space.
    pub fn build_joins(&self, entity: &'m Entity, listed_only: bool) -> Result<String, CompileError> {
        Ok(render_joins(&reference_joins(self.registry, entity, listed_only)?))
    }

    /// Free-text search over the listed fields, OR-ed together.
    ///
    /// An entity without listed fields yields `"0"`, matching nothing.
    pub fn build_list_filters(&self, entity: &'m Entity) -> Result<String, CompileError> {
        let mut terms = Vec::new();
        for field in entity.listed_fields() {
            if field.is_computed() {
                continue;
            }
            let chain = chain_joins(self.registry, entity, field)?;
            terms.push(format!("{} LIKE @name", chain.column()));
        }
        if terms.is_empty() {
            return Ok("0".to_string());
        }
        Ok(terms.join(" OR "))
    }

    /// List of the non-archived rows of `entity`, filtered by the `@name`
    /// search pattern.
    pub fn build_list_query(
        &self,
        entity: &'m Entity,
        context: Option<&ListContext>,
        lookup: Option<&LookupFilter>,
        order: Option<&SortOrder>,
    ) -> Result<Statement, StatementBuildError> {
        let wrap = |e: CompileError| StatementBuildError::new(StatementKind::ListQuery, &entity.name, e);
        let e_table = entity.table();
        let columns = self.build_columns(entity, false).map_err(wrap)?;
        let joins = self.build_joins(entity, true).map_err(wrap)?;
        let filters = self.build_list_filters(entity).map_err(wrap)?;

        let mut sql = format!(
            "SELECT {columns} FROM {e_table}{joins} WHERE ({e_table}._archived IS NULL) AND ({filters})"
        );
        if let Some(context) = context {
            resolve_field(entity, &context.field).map_err(|e| wrap(e.into()))?;
            sql.push_str(&format!(
                " AND {} = {}",
                column(&entity.name, &context.field),
                context.key
            ));
        }
        let mut statement_params = vec!["@name".to_string()];
        if let Some(lookup) = lookup {
            resolve_field(entity, &lookup.column).map_err(|e| wrap(e.into()))?;
            sql.push_str(&format!(" AND {} = @lookup", column(&entity.name, &lookup.column)));
            statement_params.push("@lookup".to_string());
        }
        if let Some(order) = order {
            let sort_column = self.sort_column(entity, order).map_err(wrap)?;
            sql.push_str(&format!(
                " ORDER BY {} {}",
                sort_column,
                if order.ascending { "ASC" } else { "DESC" }
            ));
        }

        debug!(entity = %entity.name, sql = %sql, "built list query");
        Ok(Statement {
            sql,
            params: statement_params,
        })
    }

    /// Every field of one row of `entity`, computed fields included.
    pub fn build_object_query(&self, entity: &'m Entity) -> Result<Statement, StatementBuildError> {
        let wrap = |e: CompileError| StatementBuildError::new(StatementKind::ObjectQuery, &entity.name, e);
        let e_table = entity.table();

        // Compile every computed field once; the SELECT list and the FROM
        // list are both assembled from the same fragments.
        let mut computed = QueryFragment::default();
        let mut columns = vec![format!("{e_table}.Id")];
        for field in entity.fields.values() {
            if field.is_computed() {
                let fragment = self.compiler.compile_field(entity, field).map_err(wrap)?;
                columns.push(fragment.select);
                for derived in fragment.from {
                    computed.add_derived(derived);
                }
                append_joins(&mut computed.join, fragment.join);
                computed.filter.extend(fragment.filter);
            } else {
                columns.extend(self.field_columns(entity, field).map_err(wrap)?);
            }
        }

        let mut joins = reference_joins(self.registry, entity, false).map_err(|e| wrap(e.into()))?;
        append_joins(&mut joins, computed.join);
        let derived: String = computed.from.iter().map(|d| format!(",{d}")).collect();

        let sql = format!(
            "SELECT {columns} FROM {e_table}{derived}{joins} WHERE {e_table}.Id = @id{filters}",
            columns = columns.join(","),
            joins = render_joins(&joins),
            filters = render_filters(&computed.filter),
        );
        debug!(entity = %entity.name, sql = %sql, "built object query");
        Ok(Statement::new(sql).with_param("@id"))
    }

    /// Display value of `entity.field` for the row bound to `@id`, following
    /// Reference fields to the terminal value.
    pub fn build_ref_value_query(
        &self,
        entity: &'m Entity,
        field: &'m Field,
    ) -> Result<Statement, StatementBuildError> {
        let wrap = |e: CompileError| StatementBuildError::new(StatementKind::RefValueQuery, &entity.name, e);
        let chain = chain_joins(self.registry, entity, field).map_err(|e| wrap(e.into()))?;
        let joins: String = chain.joins().map(|join| format!(" {join}")).collect();
        let e_table = entity.table();
        let sql = format!(
            "SELECT {} FROM {e_table}{joins} WHERE {e_table}.[Id] = @id",
            chain.column(),
        );
        debug!(entity = %entity.name, field = %field.name, sql = %sql, "built reference value query");
        Ok(Statement::new(sql).with_param("@id"))
    }

    /// Columns of a persisted field in an object query: Reference fields
    /// yield their key, the referenced row's `_archived` flag and the
    /// terminal display value.
    fn field_columns(&self, entity: &'m Entity, field: &'m Field) -> Result<Vec<String>, CompileError> {
        let chain = chain_joins(self.registry, entity, field)?;
        let Some(first) = chain.first_alias() else {
            return Ok(vec![column(&entity.name, &field.name)]);
        };
        Ok(vec![
            column(&entity.name, &field.name),
            format!("{first}._archived"),
            chain.column(),
        ])
    }

    /// ORDER BY target of a list. A path on another entity sorts by the row
    /// some listed Reference chain joins for it, the first such row winning.
    fn sort_column(&self, entity: &'m Entity, order: &SortOrder) -> Result<String, CompileError> {
        let path = &order.path;
        if path.entity == entity.name {
            resolve_field(entity, &path.field)?;
            return Ok(column(&entity.name, &path.field));
        }
        for field in entity.listed_fields() {
            let chain = chain_joins(self.registry, entity, field)?;
            if let Some(hop) = chain.hops.iter().find(|hop| hop.entity == path.entity) {
                return Ok(format!("{}.{}", hop.alias, quote_bracket(&path.field)));
            }
        }
        Ok(column(&path.entity, &path.field))
    }
}
