//! Formula compiler.
//!
//! Turns the formula of a computed field into a [`QueryFragment`]. Plain
//! operands become column expressions; aggregates over a relation become
//! correlated derived tables:
//!
//! ```text
//! Count(lines.orderId) on Order.lineCount
//!
//!   select: uuidorderIdOrderlineCount.uuidorderIdOrderlineCount
//!   from:   (SELECT COUNT([OrderLines].orderId) uuidorderIdOrderlineCount
//!            FROM [OrderLines]
//!            INNER JOIN [Orders] ON [OrderLines].[orderId]=[Orders].[Id]
//!            WHERE [Orders].Id=@id) uuidorderIdOrderlineCount
//! ```
//!
//! When the aggregated value is itself computed, the inner formula is compiled
//! as a grouped subquery (one row per child, exposing its id and foreign keys)
//! and the outer aggregate reads from it.

use tracing::trace;

use super::fragment::{
    aggregate_alias, append_join, append_joins, column, hop_alias, qualified, quote_bracket,
    reference_joins, render_filters, render_joins, rewrite_table_refs, shared_reference_joins,
    DerivedTable, OuterContext, QueryFragment,
};
use crate::error::{CompileError, CompileResult};
use crate::model::formula::{Argument, Function, FunctionKind};
use crate::model::resolve::{resolve_cross_ref, resolve_field, CrossTarget, Via};
use crate::model::{Entity, Field, ModelRegistry, Relation};

/// Nesting limit for formulas, guarding against computed fields that refer
/// to each other.
pub const MAX_FORMULA_DEPTH: usize = 32;

/// Formula of a computed field.
pub fn formula_of<'m>(entity: &Entity, field: &'m Field) -> CompileResult<&'m Function> {
    field
        .formula
        .as_ref()
        .ok_or_else(|| CompileError::MissingFormula {
            entity: entity.name.clone(),
            field: field.name.clone(),
        })
}

/// Where in the model a formula is being compiled.
#[derive(Debug, Clone, Copy)]
struct Scope<'m> {
    /// Entity whose aggregate is being built around this one, if any.
    parent: Option<&'m Entity>,
    /// Relation from `parent` to `entity`.
    parent_relation: Option<&'m Relation>,
    entity: &'m Entity,
    field: &'m Field,
    depth: usize,
}

impl<'m> Scope<'m> {
    fn enter(
        &self,
        parent: Option<&'m Entity>,
        parent_relation: Option<&'m Relation>,
        entity: &'m Entity,
        field: &'m Field,
    ) -> Self {
        Scope {
            parent,
            parent_relation,
            entity,
            field,
            depth: self.depth + 1,
        }
    }

    fn deeper(&self) -> Self {
        Scope {
            depth: self.depth + 1,
            ..*self
        }
    }
}

/// Extra joins and predicates of a conditional aggregate.
#[derive(Debug, Default)]
struct Condition {
    joins: Vec<String>,
    predicates: Vec<String>,
}

fn invalid(function: &Function, position: usize, reason: impl Into<String>) -> CompileError {
    CompileError::InvalidArgument {
        function: function.name.clone(),
        position,
        reason: reason.into(),
    }
}

fn argument(function: &Function, position: usize) -> CompileResult<&Argument> {
    function.arg(position).ok_or_else(|| CompileError::Arity {
        function: function.name.clone(),
        expected: position + 1,
        found: function.args.len(),
    })
}

/// Turn the derived tables of a grouped fragment into joins on `anchor`, so
/// the fragment can be used as an expression inside another subquery.
fn attach_grouped(inner: QueryFragment, lead: Option<String>, anchor: &str) -> QueryFragment {
    let mut fragment = QueryFragment::value(inner.select);
    if let Some(lead) = lead {
        append_join(&mut fragment.join, lead);
    }
    for table in &inner.from {
        append_join(
            &mut fragment.join,
            format!("INNER JOIN {table} ON [{}].[Id]={anchor}", table.alias),
        );
    }
    append_joins(&mut fragment.join, inner.join);
    fragment.filter = inner.filter;
    fragment.correlated = inner.correlated;
    fragment
}

/// Compiles formulas against one model.
#[derive(Debug, Clone, Copy)]
pub struct FormulaCompiler<'m> {
    registry: &'m ModelRegistry,
}

impl<'m> FormulaCompiler<'m> {
    pub fn new(registry: &'m ModelRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'m ModelRegistry {
        self.registry
    }

    /// Compile the formula of `entity.field` for a single-object query.
    pub fn compile_field(&self, entity: &'m Entity, field: &'m Field) -> CompileResult<QueryFragment> {
        let function = formula_of(entity, field)?;
        self.compile(None, None, entity, field, function, &OuterContext::top_level())
    }

    /// Compile `function`, the formula of `entity.field`.
    ///
    /// `parent` and `parent_relation` are set when the value feeds an
    /// aggregate of `parent` over `parent_relation`; `outer` carries the joins
    /// and predicates that aggregate needs pushed down.
    pub fn compile(
        &self,
        parent: Option<&'m Entity>,
        parent_relation: Option<&'m Relation>,
        entity: &'m Entity,
        field: &'m Field,
        function: &Function,
        outer: &OuterContext,
    ) -> CompileResult<QueryFragment> {
        let scope = Scope {
            parent,
            parent_relation,
            entity,
            field,
            depth: 0,
        };
        self.compile_in(scope, function, outer)
    }

    fn compile_in(
        &self,
        scope: Scope<'m>,
        function: &Function,
        outer: &OuterContext,
    ) -> CompileResult<QueryFragment> {
        if scope.depth > MAX_FORMULA_DEPTH {
            return Err(CompileError::TooDeep {
                entity: scope.entity.name.clone(),
                field: scope.field.name.clone(),
                limit: MAX_FORMULA_DEPTH,
            });
        }
        let kind = function.kind()?;
        trace!(
            entity = %scope.entity.name,
            field = %scope.field.name,
            function = %kind,
            depth = scope.depth,
            "compiling formula"
        );

        match kind {
            FunctionKind::Get => self.compile_operand(scope, function, 0, outer),
            FunctionKind::Sub | FunctionKind::Mul | FunctionKind::Div => {
                self.compile_arithmetic(scope, function, kind, outer)
            }
            FunctionKind::Sum
            | FunctionKind::Min
            | FunctionKind::Max
            | FunctionKind::Avg
            | FunctionKind::Count => {
                self.compile_aggregate(scope, function, kind, Condition::default(), outer)
            }
            FunctionKind::AvgIfEq | FunctionKind::CountIfEq => {
                let (relation, _) = self.aggregated_relation(scope, function)?;
                let left = self.compile_condition_operand(scope, function, 1, relation)?;
                let right = self.compile_condition_operand(scope, function, 2, relation)?;
                let mut condition = Condition::default();
                append_joins(&mut condition.joins, left.join);
                append_joins(&mut condition.joins, right.join);
                condition
                    .predicates
                    .push(format!("{} = {}", left.select, right.select));
                condition.predicates.extend(left.filter);
                condition.predicates.extend(right.filter);
                self.compile_aggregate(scope, function, kind, condition, outer)
            }
            FunctionKind::RollingDaysAvg | FunctionKind::RollingDaysSum => {
                let (relation, _) = self.aggregated_relation(scope, function)?;
                let date = self.compile_condition_operand(scope, function, 1, relation)?;
                let days = match argument(function, 2)? {
                    Argument::FieldRef(n) => n.parse::<u32>().map_err(|_| {
                        invalid(function, 2, format!("'{n}' is not a number of days"))
                    })?,
                    other => {
                        return Err(invalid(
                            function,
                            2,
                            format!("expected a number of days, found '{other}'"),
                        ))
                    }
                };
                let mut condition = Condition::default();
                append_joins(&mut condition.joins, date.join);
                condition.predicates.push(format!(
                    "DATE({},'unixepoch') >= DATE('now','-{days} days')",
                    date.select
                ));
                condition.predicates.extend(date.filter);
                self.compile_aggregate(scope, function, kind, condition, outer)
            }
        }
    }

    // ========================================================================
    // Operands
    // ========================================================================

    /// Operand of `Get` and of the arithmetic functions.
    fn compile_operand(
        &self,
        scope: Scope<'m>,
        function: &Function,
        position: usize,
        outer: &OuterContext,
    ) -> CompileResult<QueryFragment> {
        match argument(function, position)? {
            Argument::FuncCall(inner) => self.compile_in(scope.deeper(), inner, outer),
            Argument::FieldRef(name) => {
                let field = resolve_field(scope.entity, name)?;
                if field.is_computed() {
                    let formula = formula_of(scope.entity, field)?;
                    let inner = scope.enter(scope.parent, scope.parent_relation, scope.entity, field);
                    self.compile_in(inner, formula, outer)
                } else {
                    Ok(QueryFragment::value(qualified(&scope.entity.name, &field.name)))
                }
            }
            Argument::CrossRef { via, remote } => {
                let target = resolve_cross_ref(self.registry, scope.entity, via, remote)?;
                match target.via {
                    Via::Reference(link) => {
                        self.compile_reference(scope, link, target, scope.parent.is_none())
                    }
                    Via::Relation(_) => Err(invalid(
                        function,
                        position,
                        format!("relation '{via}' can only be read through an aggregate"),
                    )),
                }
            }
        }
    }

    /// A field reached through the Reference field `link` of the scope entity.
    ///
    /// With `inline` the value is read for the object being loaded: a plain
    /// target field through the statement's aliased join, a computed one as a
    /// scalar subquery over the referenced row. Otherwise aggregates of the
    /// target are grouped and joined on the link so the value can be used
    /// inside another subquery.
    fn compile_reference(
        &self,
        scope: Scope<'m>,
        link: &'m Field,
        target: CrossTarget<'m>,
        inline: bool,
    ) -> CompileResult<QueryFragment> {
        let entity = scope.entity;
        let e_table = entity.table();
        let t_table = target.entity.table();
        let link_column = column(&entity.name, &link.name);
        let link_join = format!("INNER JOIN {t_table} ON {t_table}.Id = {link_column}");

        if !target.field.is_computed() {
            if inline {
                let row = quote_bracket(&hop_alias(&entity.name, &link.name));
                return Ok(QueryFragment::value(format!("{row}.{}", target.field.name)));
            }
            let mut fragment =
                QueryFragment::value(qualified(&target.entity.name, &target.field.name));
            fragment.join.push(link_join);
            return Ok(fragment);
        }

        let formula = formula_of(target.entity, target.field)?;
        if inline {
            // Compile the target as if its own row were loaded, then key that
            // row by the link of ours.
            let inner_scope = scope.enter(None, None, target.entity, target.field);
            let inner = self.compile_in(inner_scope, formula, &OuterContext::top_level())?;
            let mut joins = reference_joins(self.registry, target.entity, false)?;
            append_joins(&mut joins, inner.join);
            let derived: String = inner.from.iter().map(|d| format!(",{d}")).collect();
            let query = format!(
                "(SELECT {select} FROM {t_table}{derived}{joins} WHERE {t_table}.Id=@id{filters})",
                select = inner.select,
                joins = render_joins(&joins),
                filters = render_filters(&inner.filter),
            );
            let key = format!("(SELECT {link_column} FROM {e_table} WHERE {e_table}.Id=@id)");
            let mut fragment = QueryFragment::value(query.replace("@id", &key));
            fragment.correlated = inner.correlated;
            Ok(fragment)
        } else {
            let inner_scope = scope.enter(Some(entity), None, target.entity, target.field);
            let context = OuterContext {
                grouped: true,
                ..OuterContext::default()
            };
            let inner = self.compile_in(inner_scope, formula, &context)?;
            Ok(attach_grouped(inner, Some(link_join), &link_column))
        }
    }

    /// One side of the equality test of `AvgIfEq`/`CountIfEq`, or the date
    /// of `RollingDays*`. The result is an expression valid inside the
    /// aggregate's subquery, plus the joins it needs there.
    fn compile_condition_operand(
        &self,
        scope: Scope<'m>,
        function: &Function,
        position: usize,
        relation: &'m Relation,
    ) -> CompileResult<QueryFragment> {
        let entity = scope.entity;
        match argument(function, position)? {
            Argument::FieldRef(name) => {
                let field = resolve_field(entity, name)?;
                if !field.is_computed() {
                    return Ok(QueryFragment::value(qualified(&entity.name, &field.name)));
                }
                let formula = formula_of(entity, field)?;
                let inner_scope = scope.enter(scope.parent, scope.parent_relation, entity, field);
                let context = OuterContext {
                    grouped: true,
                    ..OuterContext::default()
                };
                let inner = self.compile_in(inner_scope, formula, &context)?;
                Ok(attach_grouped(inner, None, &column(&entity.name, "Id")))
            }
            Argument::CrossRef { via, remote } => {
                let target = resolve_cross_ref(self.registry, entity, via, remote)?;
                match target.via {
                    Via::Relation(r) if r.name == relation.name => {
                        if !target.field.is_computed() {
                            return Ok(QueryFragment::value(qualified(
                                &target.entity.name,
                                &target.field.name,
                            )));
                        }
                        let formula = formula_of(target.entity, target.field)?;
                        let inner_scope = scope.enter(Some(entity), Some(r), target.entity, target.field);
                        let context = OuterContext {
                            grouped: true,
                            ..OuterContext::default()
                        };
                        let inner = self.compile_in(inner_scope, formula, &context)?;
                        Ok(attach_grouped(inner, None, &column(&target.entity.name, "Id")))
                    }
                    Via::Relation(_) => Err(invalid(
                        function,
                        position,
                        format!("only the aggregated relation '{}' can be compared", relation.name),
                    )),
                    Via::Reference(link) => {
                        self.compile_reference(scope, link, target, false)
                    }
                }
            }
            Argument::FuncCall(inner) => {
                let fragment = self.compile_in(scope.deeper(), inner, &OuterContext::default())?;
                if fragment.from.is_empty() {
                    Ok(fragment)
                } else {
                    Err(invalid(function, position, "an aggregate cannot be compared"))
                }
            }
        }
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    fn compile_arithmetic(
        &self,
        scope: Scope<'m>,
        function: &Function,
        kind: FunctionKind,
        outer: &OuterContext,
    ) -> CompileResult<QueryFragment> {
        let op = match kind {
            FunctionKind::Sub => "-",
            FunctionKind::Mul => "*",
            // Forces floating point division.
            _ => "*1.0/",
        };
        let left = self.compile_operand(scope, function, 0, outer)?;
        let right = self.compile_operand(scope, function, 1, outer)?;

        let mut fragment = QueryFragment::value(format!("({} {op} {})", left.select, right.select));
        for table in left.from.into_iter().chain(right.from) {
            fragment.add_derived(table);
        }
        append_joins(&mut fragment.join, left.join.into_iter().chain(right.join));
        fragment.filter = left.filter;
        fragment.filter.extend(right.filter);
        fragment.correlated = left.correlated || right.correlated;
        Ok(fragment)
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    /// The relation named by the first argument of an aggregate, and the
    /// field it aggregates.
    fn aggregated_relation(
        &self,
        scope: Scope<'m>,
        function: &Function,
    ) -> CompileResult<(&'m Relation, CrossTarget<'m>)> {
        match argument(function, 0)? {
            Argument::CrossRef { via, remote } => {
                let target = resolve_cross_ref(self.registry, scope.entity, via, remote)?;
                match target.via {
                    Via::Relation(relation) => Ok((relation, target)),
                    Via::Reference(_) => Err(invalid(
                        function,
                        0,
                        format!("'{via}' is a reference field, not a relation"),
                    )),
                }
            }
            other => Err(invalid(
                function,
                0,
                format!("expected relation.field, found '{other}'"),
            )),
        }
    }

    fn compile_aggregate(
        &self,
        scope: Scope<'m>,
        function: &Function,
        kind: FunctionKind,
        condition: Condition,
        outer: &OuterContext,
    ) -> CompileResult<QueryFragment> {
        let aggregate = kind
            .aggregate()
            .ok_or_else(|| CompileError::UnknownFormula(function.name.clone()))?;
        let (relation, target) = self.aggregated_relation(scope, function)?;
        let entity = scope.entity;
        let e_table = entity.table();
        let r_table = target.entity.table();
        let alias = aggregate_alias(&target.field.name, &entity.name, &scope.field.name);
        let join_back = format!(
            "INNER JOIN {e_table} ON {r_table}.[{}]={e_table}.[Id]",
            relation.target.field
        );

        let mut joins = Vec::new();
        let mut predicates = Vec::new();
        let (value, source) = if target.field.is_computed() {
            let formula = formula_of(target.entity, target.field)?;
            let inner_scope = scope.enter(Some(entity), Some(relation), target.entity, target.field);
            let context = OuterContext {
                join: vec![join_back.clone()],
                filter: Vec::new(),
                grouped: true,
            };
            let inner = self.compile_in(inner_scope, formula, &context)?;
            let chain = shared_reference_joins(self.registry, target.entity)?;

            let source = match inner.from.as_slice() {
                [single] if inner.select == format!("{0}.{0}", single.alias) => {
                    // The child rows are read from the grouped subquery, so
                    // joins written against the child table address its alias.
                    for clause in chain.iter().chain(std::iter::once(&join_back)) {
                        append_join(&mut joins, rewrite_table_refs(clause, &r_table, &single.alias));
                    }
                    single.to_string()
                }
                derived => {
                    for table in derived {
                        append_join(
                            &mut joins,
                            format!("INNER JOIN {table} ON [{}].[Id]={r_table}.[Id]", table.alias),
                        );
                    }
                    append_joins(&mut joins, chain);
                    append_join(&mut joins, join_back.clone());
                    r_table.clone()
                }
            };
            append_joins(&mut joins, inner.join);
            predicates.extend(inner.filter);
            (inner.select, source)
        } else {
            append_join(&mut joins, join_back.clone());
            (qualified(&target.entity.name, &target.field.name), r_table.clone())
        };
        append_joins(&mut joins, outer.join.iter().cloned());
        append_joins(&mut joins, condition.joins);
        predicates.extend(outer.filter.iter().cloned());
        predicates.extend(condition.predicates);

        let mut where_clause = match scope.parent {
            None => format!("WHERE {e_table}.Id=@id"),
            Some(_) => format!("WHERE ({e_table}._archived IS NULL)"),
        };
        where_clause.push_str(&render_filters(&predicates));

        let (exposed, group_by) = if outer.grouped {
            (self.exposed_columns(scope), format!(" GROUP BY {e_table}.[Id]"))
        } else {
            (String::new(), String::new())
        };

        // A sum over no rows is 0 rather than NULL.
        let value = match aggregate {
            "SUM" => format!("COALESCE(SUM({value}),0)"),
            _ => format!("{aggregate}({value})"),
        };
        let query = format!(
            "(SELECT {value} {alias}{exposed} FROM {source}{joins} {where_clause}{group_by})",
            joins = render_joins(&joins),
        );
        let mut fragment = QueryFragment::value(format!("{alias}.{alias}"));
        fragment.add_derived(DerivedTable { query, alias });
        fragment.correlated = true;
        Ok(fragment)
    }

    /// Columns a grouped subquery exposes so the enclosing query can join it:
    /// the row id, every Reference field, and the foreign key of the relation
    /// being aggregated.
    fn exposed_columns(&self, scope: Scope<'m>) -> String {
        let entity = scope.entity;
        let mut names: Vec<&str> = entity
            .fields
            .values()
            .filter(|f| f.is_reference())
            .map(|f| f.name.as_str())
            .collect();
        if let Some(relation) = scope.parent_relation {
            let fk = relation.target.field.as_str();
            if entity.fields.contains_key(fk) && !names.contains(&fk) {
                names.push(fk);
            }
        }
        let mut exposed = format!(", {}.[Id] Id", entity.table());
        for name in names {
            exposed.push_str(&format!(", {} [{name}]", column(&entity.name, name)));
        }
        exposed
    }
}
