//! Lowering the model-file AST to a [`ModelRegistry`].
//!
//! The parser accepts any `key: value;` property; this pass gives the keys
//! their meaning, checks every formula against the function catalog and
//! enforces the structural rules the compiler relies on (stored fields come
//! before computed ones, names are unique). Unknown property keys are not
//! fatal and come back as warnings.

use tracing::debug;

use crate::dsl::ast;
use crate::dsl::span::Span;
use crate::dsl::{self, Diagnostic, Severity};
use crate::model::{
    Argument, Entity, Field, FieldPath, FieldType, FilterKind, Function, FunctionKind,
    ModelRegistry, Relation, SortOrder, Translation,
};

/// A lowered model plus the non-fatal findings made on the way.
#[derive(Debug)]
pub struct Lowered {
    pub registry: ModelRegistry,
    pub warnings: Vec<Diagnostic>,
}

/// Errors that make a model file unusable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoweringError {
    #[error("unknown field type '{name}'")]
    UnknownType { name: String, span: Span },

    #[error("size of field '{field}' must be a non-negative integer, found '{value}'")]
    InvalidSize {
        field: String,
        value: String,
        span: Span,
    },

    #[error("property '{key}' expects {expected}, found {found}")]
    InvalidValue {
        key: String,
        expected: &'static str,
        found: String,
        span: Span,
    },

    #[error("duplicate entity '{name}'")]
    DuplicateEntity { name: String, span: Span },

    #[error("entity '{entity}' already has a field or relation named '{name}'")]
    DuplicateMember {
        entity: String,
        name: String,
        span: Span,
    },

    #[error("field '{entity}.{field}' is declared {declared} but {implied_by} makes it {implied}")]
    ConflictingType {
        entity: String,
        field: String,
        declared: FieldType,
        implied: FieldType,
        implied_by: &'static str,
        span: Span,
    },

    #[error("computed field '{entity}.{field}' has no value formula")]
    MissingValue {
        entity: String,
        field: String,
        span: Span,
    },

    #[error("reference field '{entity}.{field}' has no ref target")]
    MissingReference {
        entity: String,
        field: String,
        span: Span,
    },

    #[error("relation '{entity}.{relation}' has no ref target")]
    MissingRelationTarget {
        entity: String,
        relation: String,
        span: Span,
    },

    #[error("stored field '{entity}.{field}' must be declared before the computed fields")]
    PersistedAfterComputed {
        entity: String,
        field: String,
        span: Span,
    },

    #[error("unknown formula function '{name}'")]
    UnknownFunction { name: String, span: Span },

    #[error("unknown filter function '{name}'")]
    UnknownFilter { name: String, span: Span },

    #[error("{function} expects {expected} argument(s), found {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
        span: Span,
    },
}

impl LoweringError {
    /// Source range the error points at.
    pub fn span(&self) -> Span {
        match self {
            LoweringError::UnknownType { span, .. }
            | LoweringError::InvalidSize { span, .. }
            | LoweringError::InvalidValue { span, .. }
            | LoweringError::DuplicateEntity { span, .. }
            | LoweringError::DuplicateMember { span, .. }
            | LoweringError::ConflictingType { span, .. }
            | LoweringError::MissingValue { span, .. }
            | LoweringError::MissingReference { span, .. }
            | LoweringError::MissingRelationTarget { span, .. }
            | LoweringError::PersistedAfterComputed { span, .. }
            | LoweringError::UnknownFunction { span, .. }
            | LoweringError::UnknownFilter { span, .. }
            | LoweringError::Arity { span, .. } => span.clone(),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.span(), self.to_string())
    }
}

type LowerResult<T> = Result<T, LoweringError>;

/// Outcome of [`load`]: the registry when the source is usable, and every
/// diagnostic collected on the way.
#[derive(Debug)]
pub struct LoadResult {
    pub registry: Option<ModelRegistry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadResult {
    pub fn is_ok(&self) -> bool {
        self.registry.is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }
}

/// Parse, lower and validate a model source.
///
/// Dangling Reference or Relation targets and Reference cycles make the
/// model unusable; they have no single source location and are reported at
/// the start of the file.
pub fn load(source: &str) -> LoadResult {
    let parsed = dsl::parse(source);
    let mut diagnostics = parsed.diagnostics;
    let model = match parsed.model {
        Some(model) if !diagnostics.iter().any(|d| d.severity == Severity::Error) => model,
        _ => {
            return LoadResult {
                registry: None,
                diagnostics,
            }
        }
    };

    let lowered = match lower(&model) {
        Ok(lowered) => lowered,
        Err(e) => {
            diagnostics.push(e.to_diagnostic());
            return LoadResult {
                registry: None,
                diagnostics,
            };
        }
    };
    diagnostics.extend(lowered.warnings);

    let problems = lowered.registry.validate();
    if !problems.is_empty() {
        diagnostics.extend(problems.iter().map(|p| Diagnostic::error(0..0, p.to_string())));
        return LoadResult {
            registry: None,
            diagnostics,
        };
    }
    LoadResult {
        registry: Some(lowered.registry),
        diagnostics,
    }
}

/// Lower a parsed model file.
pub fn lower(model: &ast::Model) -> LowerResult<Lowered> {
    let mut registry = ModelRegistry::new();
    let mut warnings = Vec::new();

    for item in &model.items {
        match &item.value {
            ast::Item::Application(app) => lower_application(app, &mut registry, &mut warnings),
            ast::Item::Translation(def) => {
                let translation = def
                    .terms
                    .iter()
                    .fold(Translation::new(def.language.value.clone()), |t, term| {
                        t.with_label(term.key.value.clone(), term.text.value.clone())
                    });
                if registry.insert_translation(translation).is_some() {
                    warnings.push(Diagnostic::warning(
                        def.language.span.clone(),
                        format!("translation '{}' replaces an earlier one", def.language.value),
                    ));
                }
            }
            ast::Item::Entity(def) => {
                if registry.entity(&def.name.value).is_ok() {
                    return Err(LoweringError::DuplicateEntity {
                        name: def.name.value.clone(),
                        span: def.name.span.clone(),
                    });
                }
                let entity = lower_entity(def, &mut warnings)?;
                registry.insert_entity(entity);
            }
        }
    }

    debug!(
        entities = registry.len(),
        warnings = warnings.len(),
        "lowered model"
    );
    Ok(Lowered { registry, warnings })
}

fn lower_application(
    app: &ast::ApplicationDef,
    registry: &mut ModelRegistry,
    warnings: &mut Vec<Diagnostic>,
) {
    for setting in &app.settings {
        match setting.key.value.as_str() {
            "title" => registry.set_title(setting.text.value.clone()),
            other => warnings.push(Diagnostic::warning(
                setting.key.span.clone(),
                format!("unknown application setting '{other}' ignored"),
            )),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

fn lower_entity(def: &ast::EntityDef, warnings: &mut Vec<Diagnostic>) -> LowerResult<Entity> {
    let entity_name = def.name.value.as_str();
    let mut entity = Entity::new(entity_name);
    let mut seen_computed = false;

    for member in &def.members {
        let member_def = member.def();
        let name = &member_def.name;
        if entity.fields.contains_key(&name.value) || entity.relations.contains_key(&name.value) {
            return Err(LoweringError::DuplicateMember {
                entity: entity_name.to_string(),
                name: name.value.clone(),
                span: name.span.clone(),
            });
        }

        match &member.value {
            ast::Member::Field(field_def) => {
                let field = lower_field(entity_name, field_def, warnings)?;
                if field.is_computed() {
                    seen_computed = true;
                } else if seen_computed {
                    return Err(LoweringError::PersistedAfterComputed {
                        entity: entity_name.to_string(),
                        field: name.value.clone(),
                        span: name.span.clone(),
                    });
                }
                entity = entity.with_field(field);
            }
            ast::Member::Relation(relation_def) => {
                entity = entity.with_relation(lower_relation(entity_name, relation_def, warnings)?);
            }
        }
    }
    Ok(entity)
}

fn lower_field(
    entity: &str,
    def: &ast::MemberDef,
    warnings: &mut Vec<Diagnostic>,
) -> LowerResult<Field> {
    let name = def.name.value.as_str();
    let mut declared: Option<FieldType> = None;
    let mut field = Field::new(name, FieldType::Text);

    for property in &def.properties {
        let property = &property.value;
        let key = property.key.value.as_str();
        let value = &property.value;
        match key {
            "type" => {
                let word = expect_word(property)?;
                let field_type =
                    FieldType::from_keyword(word).ok_or_else(|| LoweringError::UnknownType {
                        name: word.to_string(),
                        span: value.span.clone(),
                    })?;
                declared = Some(field_type);
            }
            "size" => {
                let word = expect_word(property)?;
                field.length = word.parse().map_err(|_| LoweringError::InvalidSize {
                    field: name.to_string(),
                    value: word.to_string(),
                    span: value.span.clone(),
                })?;
            }
            "listed" => field.listed = expect_bool(property)?,
            "hidden" => field.hidden = expect_bool(property)?,
            "format" => field.format = Some(expect_text(property)?.to_string()),
            "ref" => field.reference = Some(expect_path(property)?),
            "sortby" => field.sort = Some(SortOrder::asc(expect_path(property)?)),
            "value" => field.formula = Some(lower_formula(expect_call(property)?)?),
            "filter" => field.filter = Some(lower_filter(expect_call(property)?)?),
            other => warnings.push(Diagnostic::warning(
                property.key.span.clone(),
                format!("unknown field property '{other}' ignored"),
            )),
        }
    }

    let implied = if field.reference.is_some() {
        Some((FieldType::Reference, "its ref"))
    } else if field.formula.is_some() {
        Some((FieldType::Computed, "its value formula"))
    } else {
        None
    };
    field.field_type = match (declared, implied) {
        (Some(declared), Some((implied, implied_by))) if declared != implied => {
            return Err(LoweringError::ConflictingType {
                entity: entity.to_string(),
                field: name.to_string(),
                declared,
                implied,
                implied_by,
                span: def.name.span.clone(),
            });
        }
        (Some(declared), _) => declared,
        (None, Some((implied, _))) => implied,
        (None, None) => FieldType::Text,
    };

    if field.field_type == FieldType::Computed && field.formula.is_none() {
        return Err(LoweringError::MissingValue {
            entity: entity.to_string(),
            field: name.to_string(),
            span: def.name.span.clone(),
        });
    }
    if field.field_type == FieldType::Reference && field.reference.is_none() {
        return Err(LoweringError::MissingReference {
            entity: entity.to_string(),
            field: name.to_string(),
            span: def.name.span.clone(),
        });
    }
    Ok(field)
}

fn lower_relation(
    entity: &str,
    def: &ast::MemberDef,
    warnings: &mut Vec<Diagnostic>,
) -> LowerResult<Relation> {
    let mut target = None;
    let mut order = None;
    for property in &def.properties {
        let property = &property.value;
        match property.key.value.as_str() {
            "ref" => target = Some(expect_path(property)?),
            "orderasc" => order = Some(SortOrder::asc(expect_path(property)?)),
            "orderdesc" => order = Some(SortOrder::desc(expect_path(property)?)),
            other => warnings.push(Diagnostic::warning(
                property.key.span.clone(),
                format!("unknown relation property '{other}' ignored"),
            )),
        }
    }
    let target = target.ok_or_else(|| LoweringError::MissingRelationTarget {
        entity: entity.to_string(),
        relation: def.name.value.clone(),
        span: def.name.span.clone(),
    })?;
    let relation = Relation::new(def.name.value.clone(), target);
    Ok(match order {
        Some(order) => relation.with_order(order),
        None => relation,
    })
}

// ============================================================================
// Property values
// ============================================================================

fn invalid(property: &ast::Property, expected: &'static str) -> LoweringError {
    LoweringError::InvalidValue {
        key: property.key.value.clone(),
        expected,
        found: property.value.describe().to_string(),
        span: property.value.span.clone(),
    }
}

fn expect_word(property: &ast::Property) -> LowerResult<&str> {
    match &property.value.value {
        ast::PropertyValue::Word(word) => Ok(word.as_str()),
        _ => Err(invalid(property, "a word")),
    }
}

fn expect_bool(property: &ast::Property) -> LowerResult<bool> {
    match expect_word(property) {
        Ok("true") => Ok(true),
        Ok("false") => Ok(false),
        _ => Err(invalid(property, "true or false")),
    }
}

fn expect_text(property: &ast::Property) -> LowerResult<&str> {
    match &property.value.value {
        ast::PropertyValue::Text(text) => Ok(text.as_str()),
        _ => Err(invalid(property, "a string")),
    }
}

fn expect_path(property: &ast::Property) -> LowerResult<FieldPath> {
    match &property.value.value {
        ast::PropertyValue::Path(path) => {
            Ok(FieldPath::new(path.left.value.clone(), path.right.value.clone()))
        }
        _ => Err(invalid(property, "an Entity.field path")),
    }
}

fn expect_call(property: &ast::Property) -> LowerResult<&ast::Call> {
    match &property.value.value {
        ast::PropertyValue::Formula(call) => Ok(call),
        _ => Err(invalid(property, "a formula")),
    }
}

// ============================================================================
// Formulas
// ============================================================================

fn lower_arguments(call: &ast::Call) -> LowerResult<Vec<Argument>> {
    call.args
        .iter()
        .map(|arg| match &arg.value {
            ast::CallArg::Call(inner) => lower_formula(inner).map(Argument::call),
            ast::CallArg::Path(path) => Ok(Argument::cross(
                path.left.value.clone(),
                path.right.value.clone(),
            )),
            ast::CallArg::Name(name) => Ok(Argument::field(name.clone())),
        })
        .collect()
}

fn check_arity(call: &ast::Call, expected: usize) -> LowerResult<()> {
    if call.args.len() == expected {
        return Ok(());
    }
    Err(LoweringError::Arity {
        function: call.name.value.clone(),
        expected,
        found: call.args.len(),
        span: call.name.span.clone(),
    })
}

fn lower_formula(call: &ast::Call) -> LowerResult<Function> {
    let kind = FunctionKind::from_name(&call.name.value).ok_or_else(|| {
        LoweringError::UnknownFunction {
            name: call.name.value.clone(),
            span: call.name.span.clone(),
        }
    })?;
    check_arity(call, kind.arity())?;
    Ok(Function::new(call.name.value.clone(), lower_arguments(call)?))
}

fn lower_filter(call: &ast::Call) -> LowerResult<Function> {
    let kind = FilterKind::from_name(&call.name.value).ok_or_else(|| {
        LoweringError::UnknownFilter {
            name: call.name.value.clone(),
            span: call.name.span.clone(),
        }
    })?;
    check_arity(call, kind.arity())?;
    Ok(Function::new(call.name.value.clone(), lower_arguments(call)?))
}
