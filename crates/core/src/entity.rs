//! Entity kinds and stable `(kind, id)` references.
//!
//! An [`EntityRef`] is the identity carried through the propagation
//! pipeline. It is enough on its own to compute a search document id, which
//! is what lets the synchronizer remove documents for rows that no longer
//! exist.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// EntityKind
// ---------------------------------------------------------------------------

/// Every table in the content graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    EntityType,
    Tag,
    ResourceTag,
    Resource,
    Container,
    ContainerRelationship,
    Segment,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        Self::EntityType,
        Self::Tag,
        Self::ResourceTag,
        Self::Resource,
        Self::Container,
        Self::ContainerRelationship,
        Self::Segment,
    ];

    /// Return the wire-format string for this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityType => "entity_type",
            Self::Tag => "tag",
            Self::ResourceTag => "resource_tag",
            Self::Resource => "resource",
            Self::Container => "container",
            Self::ContainerRelationship => "container_relationship",
            Self::Segment => "segment",
        }
    }

    /// Parse from a wire-format string.
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Invalid entity kind: '{s}'. Must be one of: {}",
                    Self::ALL.map(|k| k.as_str()).join(", ")
                ))
            })
    }

    /// Whether rows of this kind have their own search document.
    ///
    /// Reference data and edges are only ever indexed as part of the
    /// documents that embed them.
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Container | Self::Resource | Self::Segment)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EntityRef
// ---------------------------------------------------------------------------

/// A stable `(kind, id)` identity for any row in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: DbId,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: DbId) -> Self {
        Self { kind, id }
    }

    pub fn container(id: DbId) -> Self {
        Self::new(EntityKind::Container, id)
    }

    pub fn resource(id: DbId) -> Self {
        Self::new(EntityKind::Resource, id)
    }

    pub fn relationship(id: DbId) -> Self {
        Self::new(EntityKind::ContainerRelationship, id)
    }

    pub fn segment(id: DbId) -> Self {
        Self::new(EntityKind::Segment, id)
    }

    pub fn tag(id: DbId) -> Self {
        Self::new(EntityKind::Tag, id)
    }

    pub fn resource_tag(id: DbId) -> Self {
        Self::new(EntityKind::ResourceTag, id)
    }

    pub fn entity_type(id: DbId) -> Self {
        Self::new(EntityKind::EntityType, id)
    }

    /// Search document id for this entity.
    pub fn document_id(&self) -> String {
        document_id(self.kind, self.id)
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.kind, self.id)
    }
}

/// Compute the search document id as a stable function of kind and id.
pub fn document_id(kind: EntityKind, id: DbId) -> String {
    format!("{}.{id}", kind.as_str())
}

/// Parse a document id produced by [`document_id`] back into a reference.
pub fn parse_document_id(doc_id: &str) -> Result<EntityRef, CoreError> {
    let (kind, id) = doc_id
        .rsplit_once('.')
        .ok_or_else(|| CoreError::Validation(format!("Malformed document id: '{doc_id}'")))?;
    let id: DbId = id
        .parse()
        .map_err(|_| CoreError::Validation(format!("Malformed document id: '{doc_id}'")))?;
    Ok(EntityRef::new(EntityKind::from_str(kind)?, id))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_wire_format() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = EntityKind::from_str("widget").unwrap_err();
        assert!(err.to_string().contains("widget"));
    }

    #[test]
    fn only_primary_documents_are_indexed() {
        assert!(EntityKind::Container.is_indexed());
        assert!(EntityKind::Resource.is_indexed());
        assert!(EntityKind::Segment.is_indexed());
        assert!(!EntityKind::Tag.is_indexed());
        assert!(!EntityKind::ContainerRelationship.is_indexed());
    }

    #[test]
    fn document_id_is_kind_dot_id() {
        assert_eq!(EntityRef::container(42).document_id(), "container.42");
        assert_eq!(
            EntityRef::relationship(7).document_id(),
            "container_relationship.7"
        );
    }

    #[test]
    fn document_id_parses_back() {
        let r = parse_document_id("resource.15").unwrap();
        assert_eq!(r, EntityRef::resource(15));
        assert!(parse_document_id("resource").is_err());
        assert!(parse_document_id("resource.x").is_err());
    }
}
