//! Table definitions for entities.
//!
//! # Examples
//!
//! ```ignore
//! use tabula::sql::ddl::CreateTable;
//!
//! let sql = CreateTable::for_entity(&order).to_sql();
//! // CREATE TABLE [Orders](Id INTEGER PRIMARY KEY, _archived INTEGER, [number] TEXT, ...)
//! ```

use super::fragment::{quote_bracket, table};
use crate::model::Entity;

// ============================================================================
// CREATE TABLE
// ============================================================================

/// CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "DDL statements have no effect until converted to SQL with to_sql()"]
pub struct CreateTable {
    /// Bracket-quoted table name.
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl CreateTable {
    /// Create a new CREATE TABLE statement with the bookkeeping columns every
    /// record table carries.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            name: table_name.into(),
            columns: vec![
                ColumnDef::new("Id", "INTEGER").primary_key(),
                ColumnDef::new("_archived", "INTEGER"),
            ],
        }
    }

    /// The table of `entity`, with a column per persisted field up to the
    /// first computed field.
    pub fn for_entity(entity: &Entity) -> Self {
        let mut create = Self::new(table(&entity.name));
        for field in entity.persisted_fields() {
            if let Some(column_type) = field.field_type.column_type() {
                create = create.column(ColumnDef::new(quote_bracket(&field.name), column_type));
            }
        }
        create
    }

    /// Add a column definition.
    pub fn column(mut self, col: ColumnDef) -> Self {
        self.columns.push(col);
        self
    }

    /// Convert to SQL.
    pub fn to_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(ColumnDef::to_sql)
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {}({columns})", self.name)
    }
}

// ============================================================================
// Column Definition
// ============================================================================

/// Column definition for CREATE TABLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: &'static str,
    pub primary_key: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: &'static str) -> Self {
        Self {
            name: name.into(),
            data_type,
            primary_key: false,
        }
    }

    /// Add PRIMARY KEY constraint.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn to_sql(&self) -> String {
        if self.primary_key {
            format!("{} {} PRIMARY KEY", self.name, self.data_type)
        } else {
            format!("{} {}", self.name, self.data_type)
        }
    }
}
