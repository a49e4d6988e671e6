//! Change detection.
//!
//! [`ChangeDetector`] is registered on a store as a mutation observer. For
//! each write it answers with the mutated entity plus every entity whose
//! search document embeds data from it (one hop). It never touches the
//! index itself.

use cms_core::entity::{EntityKind, EntityRef};
use cms_core::propagation::ExclusionPolicy;
use cms_core::types::DbId;
use cms_db::signals::{MutationEvent, MutationObserver};
use cms_db::Tables;

/// Mutation observer computing the dirty set of every store write.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    exclusions: ExclusionPolicy,
}

impl ChangeDetector {
    /// A detector that never suppresses edge targets.
    pub fn new() -> Self {
        Self::default()
    }

    /// A detector suppressing propagation to edge targets whose container
    /// type is listed in `exclusions`.
    pub fn with_exclusions(exclusions: ExclusionPolicy) -> Self {
        Self { exclusions }
    }

    pub fn exclusions(&self) -> &ExclusionPolicy {
        &self.exclusions
    }

    /// The entity itself plus its related set, in discovery order.
    ///
    /// Saves, pre-deletes and many-to-many changes share one rule; for a
    /// pre-delete `tables` still holds the row.
    pub fn dirty_set(&self, tables: &Tables, entity: EntityRef) -> Vec<EntityRef> {
        let mut dirty = vec![entity];
        match entity.kind {
            EntityKind::Container => self.container_related(tables, entity.id, &mut dirty),
            EntityKind::ContainerRelationship => {
                if let Some(edge) = tables.relationship(entity.id) {
                    dirty.push(EntityRef::container(edge.from_id));
                    self.push_edge_target(tables, edge.to_id, &mut dirty);
                }
            }
            EntityKind::Resource => {
                if let Some(resource) = tables.resource(entity.id) {
                    dirty.push(resource.owner);
                }
            }
            EntityKind::Segment => {
                if let Some(segment) = tables.segment(entity.id) {
                    dirty.push(EntityRef::container(segment.parent_id));
                }
            }
            EntityKind::Tag => {
                dirty.extend(
                    tables
                        .containers_with_tag(entity.id)
                        .into_iter()
                        .map(EntityRef::container),
                );
                for edge_id in tables.relationships_with_tag(entity.id) {
                    if let Some(edge) = tables.relationship(edge_id) {
                        self.push_edge_target(tables, edge.to_id, &mut dirty);
                    }
                }
            }
            EntityKind::ResourceTag => {
                for resource_id in tables.resources_with_resource_tag(entity.id) {
                    dirty.push(EntityRef::resource(resource_id));
                    if let Some(resource) = tables.resource(resource_id) {
                        dirty.push(resource.owner);
                    }
                }
            }
            EntityKind::EntityType => {
                dirty.extend(
                    tables
                        .containers_of_type(entity.id)
                        .into_iter()
                        .map(EntityRef::container),
                );
                dirty.extend(
                    tables
                        .resources_of_type(entity.id)
                        .into_iter()
                        .map(EntityRef::resource),
                );
            }
        }
        dirty
    }

    pub fn on_entity_saved(&self, tables: &Tables, entity: EntityRef) -> Vec<EntityRef> {
        self.dirty_set(tables, entity)
    }

    /// Must run while the row is still readable.
    pub fn on_entity_pre_deleted(&self, tables: &Tables, entity: EntityRef) -> Vec<EntityRef> {
        self.dirty_set(tables, entity)
    }

    pub fn on_m2m_changed(
        &self,
        tables: &Tables,
        entity: EntityRef,
        relation: &'static str,
    ) -> Vec<EntityRef> {
        tracing::trace!(entity = %entity, relation, "Relation changed");
        self.dirty_set(tables, entity)
    }

    fn container_related(&self, tables: &Tables, id: DbId, dirty: &mut Vec<EntityRef>) {
        for edge in tables.outbound_edges(id) {
            self.push_edge_target(tables, edge.to_id, dirty);
        }
        dirty.extend(
            tables
                .inbound_edges(id)
                .iter()
                .map(|e| EntityRef::container(e.from_id)),
        );
        dirty.extend(tables.segments_of(id).iter().map(|s| EntityRef::segment(s.id)));
        dirty.extend(
            tables
                .resources_owned_by(EntityRef::container(id))
                .iter()
                .map(|r| EntityRef::resource(r.id)),
        );
    }

    /// Push an edge target unless its current type is excluded.
    fn push_edge_target(&self, tables: &Tables, to_id: DbId, dirty: &mut Vec<EntityRef>) {
        if self.is_excluded_target(tables, to_id) {
            tracing::debug!(container_id = to_id, "Edge target type excluded from propagation");
            return;
        }
        dirty.push(EntityRef::container(to_id));
    }

    fn is_excluded_target(&self, tables: &Tables, to_id: DbId) -> bool {
        if self.exclusions.is_empty() {
            return false;
        }
        tables
            .container_type_name(to_id)
            .is_some_and(|name| self.exclusions.is_excluded(&name))
    }
}

impl MutationObserver for ChangeDetector {
    fn observe(&self, tables: &Tables, event: &MutationEvent) -> Vec<EntityRef> {
        match event {
            MutationEvent::Saved { entity, .. } => self.on_entity_saved(tables, *entity),
            MutationEvent::PreDeleted { entity } => self.on_entity_pre_deleted(tables, *entity),
            MutationEvent::M2mChanged { entity, relation } => {
                self.on_m2m_changed(tables, *entity, relation)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
