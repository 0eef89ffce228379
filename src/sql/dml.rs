//! Mutation statements for entity rows.
//!
//! Every persisted field (those before the first computed field) is bound
//! through a placeholder named after the field, and the row through `@id`.
//!
//! ```ignore
//! use tabula::sql::dml::{Archive, Insert, Update};
//!
//! Insert::for_entity(&order).to_statement();  // INSERT INTO [Orders]([number],[customer]) VALUES (@number,@customer)
//! Update::for_entity(&order).to_statement();  // UPDATE [Orders] SET [number]=@number,... WHERE Id = @id
//! Archive::for_entity(&order).to_statement(); // UPDATE [Orders] SET _archived=1 WHERE Id = @id
//! ```

use tracing::debug;

use super::fragment::{quote_bracket, table};
use super::statement::Statement;
use crate::model::Entity;

fn persisted_columns(entity: &Entity) -> Vec<String> {
    entity.persisted_fields().map(|f| f.name.clone()).collect()
}

// ============================================================================
// INSERT
// ============================================================================

/// INSERT of a new row.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "DML statements have no effect until converted with to_statement()"]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
}

impl Insert {
    pub fn into(table_name: impl Into<String>) -> Self {
        Self {
            table: table_name.into(),
            columns: Vec::new(),
        }
    }

    pub fn for_entity(entity: &Entity) -> Self {
        Self::into(table(&entity.name)).columns(persisted_columns(entity))
    }

    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns.extend(cols.into_iter().map(Into::into));
        self
    }

    pub fn to_statement(&self) -> Statement {
        let sql = if self.columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.table)
        } else {
            let names = self
                .columns
                .iter()
                .map(|c| quote_bracket(c))
                .collect::<Vec<_>>()
                .join(",");
            let placeholders = self
                .columns
                .iter()
                .map(|c| format!("@{c}"))
                .collect::<Vec<_>>()
                .join(",");
            format!("INSERT INTO {}({names}) VALUES ({placeholders})", self.table)
        };
        debug!(sql = %sql, "built insert");
        self.columns
            .iter()
            .fold(Statement::new(sql), |s, c| s.with_param(format!("@{c}")))
    }
}

// ============================================================================
// UPDATE
// ============================================================================

/// UPDATE of every persisted field of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "DML statements have no effect until converted with to_statement()"]
pub struct Update {
    pub table: String,
    pub columns: Vec<String>,
}

impl Update {
    pub fn table(table_name: impl Into<String>) -> Self {
        Self {
            table: table_name.into(),
            columns: Vec::new(),
        }
    }

    pub fn for_entity(entity: &Entity) -> Self {
        Self::table(table(&entity.name)).columns(persisted_columns(entity))
    }

    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns.extend(cols.into_iter().map(Into::into));
        self
    }

    pub fn to_statement(&self) -> Statement {
        let assignments = if self.columns.is_empty() {
            // Nothing to change, but the statement must still be valid.
            "_archived=_archived".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| format!("{}=@{c}", quote_bracket(c)))
                .collect::<Vec<_>>()
                .join(",")
        };
        let sql = format!("UPDATE {} SET {assignments} WHERE Id = @id", self.table);
        debug!(sql = %sql, "built update");
        self.columns
            .iter()
            .fold(Statement::new(sql), |s, c| s.with_param(format!("@{c}")))
            .with_param("@id")
    }
}

// ============================================================================
// Soft delete
// ============================================================================

/// Marks one row archived; archived rows drop out of lists.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "DML statements have no effect until converted with to_statement()"]
pub struct Archive {
    pub table: String,
}

impl Archive {
    pub fn for_entity(entity: &Entity) -> Self {
        Self {
            table: table(&entity.name),
        }
    }

    pub fn to_statement(&self) -> Statement {
        Statement::new(format!("UPDATE {} SET _archived=1 WHERE Id = @id", self.table))
            .with_param("@id")
    }
}
