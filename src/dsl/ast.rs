//! AST node types for model files.
//!
//! The tree mirrors the surface syntax closely: property lists are kept as
//! written, in order, and only [`crate::lowering`] decides what each key
//! means. That keeps the parser free of model knowledge and lets lowering
//! point at the exact property that is wrong.

use crate::dsl::span::Spanned;

// ============================================================================
// Model (Root)
// ============================================================================

/// A parsed model file.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub items: Vec<Spanned<Item>>,
}

/// A top-level `name = kind { ... }` block.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `app = application { title = "..."; }`
    Application(ApplicationDef),
    /// `Order = entity { ... }`
    Entity(EntityDef),
    /// `en = translation { term = "label"; ... }`
    Translation(TranslationDef),
}

// ============================================================================
// Application / Translation
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationDef {
    pub name: Spanned<String>,
    pub settings: Vec<Spanned<Term>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationDef {
    pub language: Spanned<String>,
    pub terms: Vec<Spanned<Term>>,
}

/// `key = "text";`
#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub key: Spanned<String>,
    pub text: Spanned<String>,
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    pub name: Spanned<String>,
    pub members: Vec<Spanned<Member>>,
}

/// A definition inside an entity block.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    /// `name = field { ... }`
    Field(MemberDef),
    /// `name = relation { ... }`
    Relation(MemberDef),
}

impl Member {
    pub fn def(&self) -> &MemberDef {
        match self {
            Member::Field(def) | Member::Relation(def) => def,
        }
    }
}

/// Name and property list shared by fields and relations.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDef {
    pub name: Spanned<String>,
    pub properties: Vec<Spanned<Property>>,
}

/// `key: value;`
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: Spanned<String>,
    pub value: Spanned<PropertyValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// A bare word: `text`, `true`, `20`.
    Word(String),
    /// `Entity.field`
    Path(PathExpr),
    /// `"..."`
    Text(String),
    /// `Sum(lines.amount)`
    Formula(Call),
}

impl PropertyValue {
    /// Short description used in diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            PropertyValue::Word(_) => "a word",
            PropertyValue::Path(_) => "an Entity.field path",
            PropertyValue::Text(_) => "a string",
            PropertyValue::Formula(_) => "a formula",
        }
    }
}

/// `left.right`
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub left: Spanned<String>,
    pub right: Spanned<String>,
}

// ============================================================================
// Formulas
// ============================================================================

/// `Name(arg, ...)`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: Spanned<String>,
    pub args: Vec<Spanned<CallArg>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Call(Call),
    Path(PathExpr),
    Name(String),
}
