//! Name lookups over the model.
//!
//! All lookups are exact and case-sensitive. Failures name the entity and the
//! missing field or relation.

use std::collections::HashSet;

use super::{Entity, Field, ModelRegistry, Relation};
use crate::error::{ModelReferenceError, ResolveResult};

/// Find a field of `entity` by name.
pub fn resolve_field<'m>(entity: &'m Entity, name: &str) -> ResolveResult<&'m Field> {
    entity
        .fields
        .get(name)
        .ok_or_else(|| ModelReferenceError::UnknownField {
            entity: entity.name.clone(),
            field: name.to_string(),
        })
}

/// Find a relation of `entity` by name.
pub fn resolve_relation<'m>(entity: &'m Entity, name: &str) -> ResolveResult<&'m Relation> {
    entity
        .relations
        .get(name)
        .ok_or_else(|| ModelReferenceError::UnknownRelation {
            entity: entity.name.clone(),
            relation: name.to_string(),
        })
}

/// One step along a chain of Reference fields: `owner.field` points into
/// `target`.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceHop<'m> {
    pub owner: &'m Entity,
    pub field: &'m Field,
    pub target: &'m Entity,
}

/// Every hop from `field` to the first non-Reference field.
///
/// Empty when `field` is not a Reference. A chain that revisits a field is
/// reported as [`ModelReferenceError::ReferenceCycle`].
pub fn reference_hops<'m>(
    registry: &'m ModelRegistry,
    entity: &'m Entity,
    field: &'m Field,
) -> ResolveResult<Vec<ReferenceHop<'m>>> {
    walk(registry, entity, field).map(|(hops, _, _)| hops)
}

/// Follow Reference fields until a non-Reference field is reached.
///
/// Returns the terminal field and the entity that owns it. A non-Reference
/// field resolves to itself.
pub fn dereference_chain<'m>(
    registry: &'m ModelRegistry,
    entity: &'m Entity,
    field: &'m Field,
) -> ResolveResult<(&'m Entity, &'m Field)> {
    walk(registry, entity, field).map(|(_, owner, terminal)| (owner, terminal))
}

type Walk<'m> = (Vec<ReferenceHop<'m>>, &'m Entity, &'m Field);

fn walk<'m>(
    registry: &'m ModelRegistry,
    entity: &'m Entity,
    field: &'m Field,
) -> ResolveResult<Walk<'m>> {
    let mut hops = Vec::new();
    let mut seen = HashSet::new();
    let mut owner = entity;
    let mut current = field;
    while current.is_reference() {
        if !seen.insert((owner.name.as_str(), current.name.as_str())) {
            return Err(ModelReferenceError::ReferenceCycle {
                entity: owner.name.clone(),
                field: current.name.clone(),
            });
        }
        let path = current
            .reference
            .as_ref()
            .ok_or_else(|| ModelReferenceError::UnknownField {
                entity: owner.name.clone(),
                field: current.name.clone(),
            })?;
        let target = registry.entity(&path.entity)?;
        hops.push(ReferenceHop {
            owner,
            field: current,
            target,
        });
        current = resolve_field(target, &path.field)?;
        owner = target;
    }
    Ok((hops, owner, current))
}

/// How a cross reference leaves its entity.
#[derive(Debug, Clone, Copy)]
pub enum Via<'m> {
    /// Through a Reference field of the entity (many-to-one).
    Reference(&'m Field),
    /// Through a relation of the entity (one-to-many).
    Relation(&'m Relation),
}

/// The far end of a `via.remote` cross reference.
#[derive(Debug, Clone, Copy)]
pub struct CrossTarget<'m> {
    pub via: Via<'m>,
    pub entity: &'m Entity,
    pub field: &'m Field,
}

/// Resolve `via.remote` from `entity`. Fields shadow relations of the same
/// name.
pub fn resolve_cross_ref<'m>(
    registry: &'m ModelRegistry,
    entity: &'m Entity,
    via: &str,
    remote: &str,
) -> ResolveResult<CrossTarget<'m>> {
    let (via, target_name) = if let Some(field) = entity.fields.get(via) {
        let path = field
            .reference
            .as_ref()
            .ok_or_else(|| ModelReferenceError::UnknownPath {
                entity: entity.name.clone(),
                name: via.to_string(),
            })?;
        (Via::Reference(field), path.entity.as_str())
    } else if let Ok(relation) = resolve_relation(entity, via) {
        (Via::Relation(relation), relation.target.entity.as_str())
    } else {
        return Err(ModelReferenceError::UnknownPath {
            entity: entity.name.clone(),
            name: via.to_string(),
        });
    };
    let target = registry.entity(target_name)?;
    let field = resolve_field(target, remote)?;
    Ok(CrossTarget {
        via,
        entity: target,
        field,
    })
}
