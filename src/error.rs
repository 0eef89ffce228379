//! Error types shared by the resolver, the formula compiler and the
//! statement assembler.
//!
//! Each layer wraps the one below it, so a failure deep inside a cascading
//! aggregate surfaces as a single [`StatementBuildError`] naming the statement
//! and entity that could not be built.

use std::fmt;

/// Result type for path resolution.
pub type ResolveResult<T> = Result<T, ModelReferenceError>;

/// Result type for formula compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// A name in the model does not lead anywhere.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelReferenceError {
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    #[error("unknown field '{field}' on entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("unknown relation '{relation}' on entity '{entity}'")]
    UnknownRelation { entity: String, relation: String },

    /// `name` is neither a field nor a relation of `entity`.
    #[error("'{name}' is neither a field nor a relation of entity '{entity}'")]
    UnknownPath { entity: String, name: String },

    /// A chain of Reference fields loops back on itself.
    #[error("reference cycle through field '{field}' of entity '{entity}'")]
    ReferenceCycle { entity: String, field: String },
}

/// Errors raised while turning a formula into a query fragment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Reference(#[from] ModelReferenceError),

    #[error("unknown formula function '{0}'")]
    UnknownFormula(String),

    #[error("{function} expects {expected} argument(s), found {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {position} of {function}: {reason}")]
    InvalidArgument {
        function: String,
        position: usize,
        reason: String,
    },

    /// Field `field` has no formula attached although it is computed.
    #[error("computed field '{field}' of entity '{entity}' has no formula")]
    MissingFormula { entity: String, field: String },

    #[error("formula of '{entity}.{field}' nests deeper than {limit} levels")]
    TooDeep {
        entity: String,
        field: String,
        limit: usize,
    },
}

/// The statement shapes produced by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateTable,
    ListQuery,
    ObjectQuery,
    RefValueQuery,
    Insert,
    Update,
    Archive,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::CreateTable => "create table",
            StatementKind::ListQuery => "list query",
            StatementKind::ObjectQuery => "object query",
            StatementKind::RefValueQuery => "reference value query",
            StatementKind::Insert => "insert",
            StatementKind::Update => "update",
            StatementKind::Archive => "archive",
        };
        f.write_str(name)
    }
}

/// A statement could not be assembled.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("failed to build {statement} for entity '{entity}': {source}")]
pub struct StatementBuildError {
    pub statement: StatementKind,
    pub entity: String,
    #[source]
    pub source: CompileError,
}

impl StatementBuildError {
    pub fn new(statement: StatementKind, entity: &str, source: impl Into<CompileError>) -> Self {
        Self {
            statement,
            entity: entity.to_string(),
            source: source.into(),
        }
    }
}
