//! # Tabula
//!
//! Relational record models with computed fields, compiled to SQLite queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Model file (entities, fields,               │
//! │              relations, formulas, translations)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [dsl: lexer + parser]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     AST                                  │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [lowering]
//! ┌─────────────────────────────────────────────────────────┐
//! │          ModelRegistry (read-only after load)            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sql: formula compiler + statement assembler]
//! ┌─────────────────────────────────────────────────────────┐
//! │     SQL statements (list, object, ref value, DDL, DML)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [store: rusqlite + row materializer]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Display rows and records                 │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Computed fields are declared as formulas such as `Sum(lines.amount)` or
//! `Div(total, lineCount)` and become correlated aggregate subqueries, so a
//! single statement returns stored and computed values together.

pub mod config;
pub mod dsl;
pub mod error;
pub mod logging;
pub mod lowering;
pub mod model;
pub mod sql;
pub mod store;

pub use error::{CompileError, ModelReferenceError, StatementBuildError, StatementKind};
pub use model::{Entity, Field, FieldType, ModelRegistry};
pub use sql::{FormulaCompiler, Statement, StatementAssembler};
pub use store::{Store, StoreError};
