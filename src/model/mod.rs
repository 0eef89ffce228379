//! The record model: entities, their typed fields and one-to-many relations.
//!
//! A [`ModelRegistry`] is built once (normally by [`crate::lowering`]) and is
//! read-only afterwards. Everything downstream borrows it explicitly; there is
//! no process-wide registry.

pub mod formula;
pub mod resolve;

pub use formula::{Argument, FilterKind, Function, FunctionKind};

use std::fmt;

use indexmap::IndexMap;

use crate::error::{ModelReferenceError, ResolveResult};

// ============================================================================
// Registry
// ============================================================================

/// The complete, immutable description of a record model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelRegistry {
    entities: IndexMap<String, Entity>,
    translations: IndexMap<String, Translation>,
    title: Option<String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity, returning the entity previously stored under the
    /// same name.
    pub fn insert_entity(&mut self, entity: Entity) -> Option<Entity> {
        self.entities.insert(entity.name.clone(), entity)
    }

    /// Builder-style [`insert_entity`](Self::insert_entity).
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.insert_entity(entity);
        self
    }

    /// Look up an entity by exact name.
    pub fn entity(&self, name: &str) -> ResolveResult<&Entity> {
        self.entities
            .get(name)
            .ok_or_else(|| ModelReferenceError::UnknownEntity(name.to_string()))
    }

    /// Entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }

    pub fn insert_translation(&mut self, translation: Translation) -> Option<Translation> {
        self.translations
            .insert(translation.language.clone(), translation)
    }

    pub fn translation(&self, language: &str) -> Option<&Translation> {
        self.translations.get(language)
    }

    /// Label for `term` in `language`, falling back to the term itself.
    pub fn translate<'a>(&'a self, language: Option<&str>, term: &'a str) -> &'a str {
        language
            .and_then(|lang| self.translations.get(lang))
            .and_then(|t| t.labels.get(term))
            .map(String::as_str)
            .unwrap_or(term)
    }

    /// Check every Reference and Relation target, and every Reference chain.
    ///
    /// The compiler does not require a validated model; dangling names only
    /// surface when a statement touching them is built. This lets a loader
    /// report them all up front instead.
    pub fn validate(&self) -> Vec<ModelReferenceError> {
        let mut problems = Vec::new();
        for entity in self.entities() {
            for field in entity.fields.values() {
                if let Some(target) = &field.reference {
                    if let Err(err) = self.check_path(target) {
                        problems.push(err);
                        continue;
                    }
                    if let Err(err) = resolve::dereference_chain(self, entity, field) {
                        problems.push(err);
                    }
                }
                if let Some(sort) = &field.sort {
                    if let Err(err) = self.check_path(&sort.path) {
                        problems.push(err);
                    }
                }
            }
            for relation in entity.relations.values() {
                if let Err(err) = self.check_path(&relation.target) {
                    problems.push(err);
                }
            }
        }
        problems
    }

    fn check_path(&self, path: &FieldPath) -> ResolveResult<()> {
        let entity = self.entity(&path.entity)?;
        resolve::resolve_field(entity, &path.field).map(|_| ())
    }
}

/// Display labels for one language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub language: String,
    pub labels: IndexMap<String, String>,
}

impl Translation {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            labels: IndexMap::new(),
        }
    }

    pub fn with_label(mut self, term: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(term.into(), label.into());
        self
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A record type, stored in the table `[<name>s]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    /// Fields in declaration order; persisted fields come first.
    pub fields: IndexMap<String, Field>,
    pub relations: IndexMap<String, Relation>,
}

impl Entity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            relations: IndexMap::new(),
        }
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    /// The bracket-quoted, pluralised table name, e.g. `[Orders]`.
    pub fn table(&self) -> String {
        crate::sql::fragment::table(&self.name)
    }

    /// Fields that have a column, up to the first computed field.
    pub fn persisted_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().take_while(|f| !f.is_computed())
    }

    pub fn computed_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().filter(|f| f.is_computed())
    }

    pub fn listed_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values().filter(|f| f.listed)
    }
}

// ============================================================================
// Fields
// ============================================================================

/// Storage and display type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Date,
    Integer,
    Boolean,
    Real,
    Reference,
    Computed,
}

impl FieldType {
    /// Parse the keyword used in model files.
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "text" => Some(FieldType::Text),
            "date" => Some(FieldType::Date),
            "integer" => Some(FieldType::Integer),
            "boolean" => Some(FieldType::Boolean),
            "real" => Some(FieldType::Real),
            "ref" => Some(FieldType::Reference),
            "auto" => Some(FieldType::Computed),
            _ => None,
        }
    }

    /// Column type in the generated schema. Computed fields have no column.
    pub fn column_type(&self) -> Option<&'static str> {
        match self {
            FieldType::Text => Some("TEXT"),
            FieldType::Date | FieldType::Integer | FieldType::Boolean | FieldType::Reference => {
                Some("INTEGER")
            }
            FieldType::Real => Some("REAL"),
            FieldType::Computed => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Text => "text",
            FieldType::Date => "date",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Real => "real",
            FieldType::Reference => "ref",
            FieldType::Computed => "auto",
        };
        f.write_str(s)
    }
}

/// An `Entity.field` path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub entity: String,
    pub field: String,
}

impl FieldPath {
    pub fn new(entity: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.field)
    }
}

/// Sort key for lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub path: FieldPath,
    pub ascending: bool,
}

impl SortOrder {
    pub fn asc(path: FieldPath) -> Self {
        Self {
            path,
            ascending: true,
        }
    }

    pub fn desc(path: FieldPath) -> Self {
        Self {
            path,
            ascending: false,
        }
    }
}

/// A typed attribute of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    /// Display width.
    pub length: u32,
    /// Shown (and searched) in list views.
    pub listed: bool,
    pub hidden: bool,
    /// printf-style format for computed values, e.g. `"%.1f"`.
    pub format: Option<String>,
    /// Target of a Reference field.
    pub reference: Option<FieldPath>,
    /// Order used when listing candidate values of a Reference field.
    pub sort: Option<SortOrder>,
    /// Value formula of a computed field.
    pub formula: Option<Function>,
    /// Restricts the candidates offered for a Reference field.
    pub filter: Option<Function>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            length: 0,
            listed: false,
            hidden: false,
            format: None,
            reference: None,
            sort: None,
            formula: None,
            filter: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn reference(name: impl Into<String>, target: FieldPath) -> Self {
        let mut field = Self::new(name, FieldType::Reference);
        field.reference = Some(target);
        field
    }

    pub fn computed(name: impl Into<String>, formula: Function) -> Self {
        let mut field = Self::new(name, FieldType::Computed);
        field.formula = Some(formula);
        field
    }

    pub fn listed(mut self) -> Self {
        self.listed = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_filter(mut self, filter: Function) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn is_computed(&self) -> bool {
        self.field_type == FieldType::Computed
    }

    pub fn is_reference(&self) -> bool {
        self.field_type == FieldType::Reference
    }
}

// ============================================================================
// Relations
// ============================================================================

/// A one-to-many edge: rows of `target.entity` whose `target.field` holds the
/// owning entity's id.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub name: String,
    pub target: FieldPath,
    pub order: Option<SortOrder>,
}

impl Relation {
    pub fn new(name: impl Into<String>, target: FieldPath) -> Self {
        Self {
            name: name.into(),
            target,
            order: None,
        }
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }
}
