//! Polymorphic resource owners.
//!
//! A resource points at its owner with a `(kind, id)` pair. The registry
//! maps each attachable kind to a loader that resolves the pair against the
//! current tables.

use std::collections::HashMap;

use cms_core::entity::{EntityKind, EntityRef};
use cms_core::error::CoreError;
use cms_core::types::DbId;
use serde::Serialize;

use crate::store::Tables;

/// What a resource needs to know about its owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentOwner {
    pub entity: EntityRef,
    pub guid: String,
    pub type_name: Option<String>,
}

/// Resolves an owner id of one kind.
pub type OwnerLoader = fn(&Tables, DbId) -> Option<AttachmentOwner>;

/// Kind-to-loader table for resource owners.
#[derive(Debug, Clone)]
pub struct AttachmentRegistry {
    loaders: HashMap<EntityKind, OwnerLoader>,
}

impl AttachmentRegistry {
    /// A registry with no attachable kinds.
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    pub fn register(mut self, kind: EntityKind, loader: OwnerLoader) -> Self {
        self.loaders.insert(kind, loader);
        self
    }

    pub fn is_attachable(&self, kind: EntityKind) -> bool {
        self.loaders.contains_key(&kind)
    }

    /// Resolve `owner`, failing when its kind cannot own resources or the
    /// row does not exist.
    pub fn resolve(&self, tables: &Tables, owner: EntityRef) -> Result<AttachmentOwner, CoreError> {
        let loader = self.loaders.get(&owner.kind).ok_or_else(|| {
            CoreError::Validation(format!("Resources cannot be attached to a {}", owner.kind))
        })?;
        loader(tables, owner.id).ok_or(CoreError::NotFound {
            entity: owner.kind.as_str(),
            id: owner.id,
        })
    }
}

impl Default for AttachmentRegistry {
    /// Containers and segments can own resources.
    fn default() -> Self {
        Self::empty()
            .register(EntityKind::Container, load_container)
            .register(EntityKind::Segment, load_segment)
    }
}

fn load_container(tables: &Tables, id: DbId) -> Option<AttachmentOwner> {
    let container = tables.container(id)?;
    Some(AttachmentOwner {
        entity: EntityRef::container(id),
        guid: container.guid.clone(),
        type_name: tables.type_name(container.type_id),
    })
}

fn load_segment(tables: &Tables, id: DbId) -> Option<AttachmentOwner> {
    let segment = tables.segment(id)?;
    Some(AttachmentOwner {
        entity: EntityRef::segment(id),
        guid: segment.guid.clone(),
        type_name: Some(segment.segment_type.clone()),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn default_registry_accepts_containers_and_segments_only() {
        let registry = AttachmentRegistry::default();
        assert!(registry.is_attachable(EntityKind::Container));
        assert!(registry.is_attachable(EntityKind::Segment));
        assert!(!registry.is_attachable(EntityKind::Tag));
    }

    #[test]
    fn unattachable_kind_is_a_validation_error() {
        let registry = AttachmentRegistry::default();
        assert_matches!(
            registry.resolve(&Tables::default(), EntityRef::tag(1)),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn missing_owner_is_not_found() {
        let registry = AttachmentRegistry::default();
        assert_matches!(
            registry.resolve(&Tables::default(), EntityRef::container(5)),
            Err(CoreError::NotFound { entity: "container", id: 5 })
        );
    }
}
