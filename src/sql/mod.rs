//! SQL generation for the record model.
//!
//! - [`fragment`] - the pieces produced for one formula node, naming helpers
//! - [`formula`] - recursive formula compiler
//! - [`statement`] - list, object and reference-value queries
//! - [`ddl`] - CREATE TABLE per entity
//! - [`dml`] - INSERT, UPDATE and soft delete
//! - [`row`] - result rows back to display text
//!
//! All statements target SQLite and use named `@` placeholders.

pub mod ddl;
pub mod dml;
pub mod formula;
pub mod fragment;
pub mod row;
pub mod statement;

pub use ddl::{ColumnDef, CreateTable};
pub use dml::{Archive, Insert, Update};
pub use formula::{FormulaCompiler, MAX_FORMULA_DEPTH};
pub use fragment::{DerivedTable, OuterContext, QueryFragment};
pub use row::{format_cell, value_to_string, CellValue, Slot};
pub use statement::{ListContext, LookupFilter, Statement, StatementAssembler};
