//! The pieces of SQL produced for one formula node, and the naming helpers
//! every generated statement shares.

use std::fmt;

use crate::error::ResolveResult;
use crate::model::resolve::{dereference_chain, reference_hops};
use crate::model::{Entity, Field, ModelRegistry};

// ============================================================================
// Naming
// ============================================================================

/// Bracket-quote an identifier.
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// Table of an entity: the entity name pluralised with `s`, bracket-quoted.
pub fn table(entity: &str) -> String {
    quote_bracket(&format!("{entity}s"))
}

/// `[<entity>s].[<field>]`
pub fn column(entity: &str, field: &str) -> String {
    format!("{}.{}", table(entity), quote_bracket(field))
}

/// `[<entity>s].<field>`, the form used for formula values.
pub fn qualified(entity: &str, field: &str) -> String {
    format!("{}.{}", table(entity), field)
}

/// Alias of the derived table that aggregates `target_field` for the
/// computed field `entity.field`.
///
/// Distinct computed fields aggregating the same target get distinct
/// aliases, and the same call site always gets the same alias.
pub fn aggregate_alias(target_field: &str, entity: &str, field: &str) -> String {
    format!("uuid{target_field}{entity}{field}")
}

/// Replace every occurrence of `table` in `sql` with `[alias]`.
///
/// Used when an aggregate reads from a derived table instead of the target
/// table itself: joins written against the table must address the alias.
pub fn rewrite_table_refs(sql: &str, table: &str, alias: &str) -> String {
    sql.replace(table, &quote_bracket(alias))
}

// ============================================================================
// Joins
// ============================================================================

/// Append `clause` unless a join of the same table is already present.
///
/// Joins of derived tables are never considered duplicates of each other
/// unless the clause text is identical.
pub fn append_join(joins: &mut Vec<String>, clause: impl Into<String>) {
    let clause = clause.into();
    let clause = clause.trim();
    if clause.is_empty() {
        return;
    }
    let duplicate = match join_head(clause) {
        Some(head) => joins.iter().any(|j| join_head(j) == Some(head)),
        None => joins.iter().any(|j| j == clause),
    };
    if !duplicate {
        joins.push(clause.to_string());
    }
}

/// [`append_join`] for each clause in order.
pub fn append_joins<I, S>(joins: &mut Vec<String>, clauses: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for clause in clauses {
        append_join(joins, clause);
    }
}

/// Each clause preceded by a space, ready to follow a FROM item.
pub fn render_joins(joins: &[String]) -> String {
    joins.iter().map(|j| format!(" {j}")).collect()
}

/// Each predicate as `" AND <predicate>"`.
pub fn render_filters(filters: &[String]) -> String {
    filters.iter().map(|p| format!(" AND {p}")).collect()
}

/// `INNER JOIN <table>` prefix of a join of a plain table, alias included.
fn join_head(join: &str) -> Option<&str> {
    let rest = join.strip_prefix("INNER JOIN ")?;
    if !rest.starts_with('[') {
        return None;
    }
    let mut end = rest.find(' ').unwrap_or(rest.len());
    // An aliased table is told apart by its alias.
    if rest[end..].starts_with(" [") {
        end += rest[end + 1..].find(' ').map_or(rest.len() - end, |i| i + 1);
    }
    Some(&join[.."INNER JOIN ".len() + end])
}

/// Joins of the Reference chains of `entity` that address each referenced
/// table by its own name, one join per table.
///
/// Only valid inside aggregate subqueries, where the joined tables are
/// read by name.
pub fn shared_reference_joins(
    registry: &ModelRegistry,
    entity: &Entity,
) -> ResolveResult<Vec<String>> {
    let mut joins = Vec::new();
    for field in entity.fields.values() {
        for hop in reference_hops(registry, entity, field)? {
            append_join(
                &mut joins,
                format!(
                    "INNER JOIN {target} ON {target}.Id = {owner}",
                    target = hop.target.table(),
                    owner = column(&hop.owner.name, &hop.field.name),
                ),
            );
        }
    }
    Ok(joins)
}

/// Alias of the row reached from `from` through the Reference field `field`.
pub fn hop_alias(from: &str, field: &str) -> String {
    format!("{from}_{field}")
}

/// One joined hop of a Reference chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedHop {
    /// Entity of the joined row.
    pub entity: String,
    /// Bracket-quoted alias of the joined row.
    pub alias: String,
    pub join: String,
}

/// A Reference chain laid out as aliased joins: `Shop.city` joins
/// `[Citys] [Shop_city]`, its `country` then `[Countrys] [Shop_city_country]`.
#[derive(Debug, Clone)]
pub struct ChainJoins<'m> {
    pub hops: Vec<JoinedHop>,
    /// Bracket-quoted name of the row holding the terminal value: the last
    /// hop's alias, or the entity's own table for a non-Reference field.
    pub row: String,
    pub terminal: &'m Field,
}

impl ChainJoins<'_> {
    /// `[<row>].[<terminal>]`
    pub fn column(&self) -> String {
        format!("{}.{}", self.row, quote_bracket(&self.terminal.name))
    }

    /// Alias of the first joined row, the one the field's key points at.
    pub fn first_alias(&self) -> Option<&str> {
        self.hops.first().map(|hop| hop.alias.as_str())
    }

    pub fn joins(&self) -> impl Iterator<Item = &str> {
        self.hops.iter().map(|hop| hop.join.as_str())
    }
}

/// Lay out the Reference chain of `entity.field`.
pub fn chain_joins<'m>(
    registry: &'m ModelRegistry,
    entity: &'m Entity,
    field: &'m Field,
) -> ResolveResult<ChainJoins<'m>> {
    let (_, terminal) = dereference_chain(registry, entity, field)?;
    let mut row = entity.table();
    let mut path = entity.name.clone();
    let mut hops = Vec::new();
    for hop in reference_hops(registry, entity, field)? {
        path = hop_alias(&path, &hop.field.name);
        let alias = quote_bracket(&path);
        let join = format!(
            "INNER JOIN {target} {alias} ON {alias}.Id = {row}.{key}",
            target = hop.target.table(),
            key = quote_bracket(&hop.field.name),
        );
        hops.push(JoinedHop {
            entity: hop.target.name.clone(),
            alias: alias.clone(),
            join,
        });
        row = alias;
    }
    Ok(ChainJoins {
        hops,
        row,
        terminal,
    })
}

/// One aliased INNER JOIN per hop of every (optionally listed-only)
/// Reference chain of `entity`.
pub fn reference_joins(
    registry: &ModelRegistry,
    entity: &Entity,
    listed_only: bool,
) -> ResolveResult<Vec<String>> {
    let mut joins = Vec::new();
    for field in entity.fields.values() {
        if listed_only && !field.listed {
            continue;
        }
        let chain = chain_joins(registry, entity, field)?;
        joins.extend(chain.joins().map(str::to_string));
    }
    Ok(joins)
}

// ============================================================================
// Fragments
// ============================================================================

/// A correlated aggregate subquery used as a FROM item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedTable {
    /// The parenthesised SELECT.
    pub query: String,
    pub alias: String,
}

impl fmt::Display for DerivedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.query, self.alias)
    }
}

/// SQL produced by compiling one formula node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFragment {
    /// Value expression for the SELECT list.
    pub select: String,
    /// Derived tables the enclosing FROM must include.
    pub from: Vec<DerivedTable>,
    /// Extra JOIN clauses.
    pub join: Vec<String>,
    /// Extra predicates, AND-ed onto the enclosing WHERE.
    pub filter: Vec<String>,
    /// The value is read from a correlated aggregate subquery.
    pub correlated: bool,
}

impl QueryFragment {
    /// A plain value expression.
    pub fn value(select: impl Into<String>) -> Self {
        Self {
            select: select.into(),
            ..Self::default()
        }
    }

    /// The derived tables comma-joined, as they appear in a FROM list.
    pub fn from_clause(&self) -> String {
        self.from
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn join_clause(&self) -> String {
        render_joins(&self.join)
    }

    pub fn filter_clause(&self) -> String {
        render_filters(&self.filter)
    }

    /// Add a derived table unless an identical one is already present.
    pub fn add_derived(&mut self, table: DerivedTable) {
        if !self.from.contains(&table) {
            self.from.push(table);
        }
    }
}

/// Join and filter text pushed down into nested aggregates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OuterContext {
    /// Joins the nested subquery must include to reach the caller's tables.
    pub join: Vec<String>,
    /// Predicates the nested subquery must apply.
    pub filter: Vec<String>,
    /// The subquery feeds an enclosing query and must yield one row per row
    /// of its own entity, exposing that row's id and foreign keys.
    pub grouped: bool,
}

impl OuterContext {
    pub fn top_level() -> Self {
        Self::default()
    }
}
