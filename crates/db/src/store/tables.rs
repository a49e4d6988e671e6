//! Row storage, unique indexes and read queries.
//!
//! [`Tables`] is plain data. Each table sits behind its own [`Arc`], so a
//! copy shares every table with its source and a write clones only the
//! table it touches (`Arc::make_mut`). Committed snapshots, unit-of-work
//! working copies and savepoints are all such copies.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::sync::Arc;

use cms_core::entity::{EntityKind, EntityRef};
use cms_core::time_code::TimeCode;
use cms_core::types::DbId;

use crate::models::container::Container;
use crate::models::entity_type::EntityType;
use crate::models::history::HistoryRecord;
use crate::models::relationship::ContainerRelationship;
use crate::models::resource::Resource;
use crate::models::segment::Segment;
use crate::models::tag::{Tag, TagTable};

/// Key of the segment range indexes: `(parent, type, bound, id)`.
pub(crate) type SegmentRangeKey = (DbId, String, TimeCode, DbId);

/// Join table of `(owner, tag)` pairs.
pub(crate) type Links = Arc<BTreeSet<(DbId, DbId)>>;

/// Every table of the content graph.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    sequences: BTreeMap<&'static str, DbId>,

    pub(crate) entity_types: Arc<BTreeMap<DbId, EntityType>>,
    pub(crate) tags: Arc<BTreeMap<DbId, Tag>>,
    pub(crate) resource_tags: Arc<BTreeMap<DbId, Tag>>,
    pub(crate) resources: Arc<BTreeMap<DbId, Resource>>,
    pub(crate) containers: Arc<BTreeMap<DbId, Container>>,
    pub(crate) relationships: Arc<BTreeMap<DbId, ContainerRelationship>>,
    pub(crate) segments: Arc<BTreeMap<DbId, Segment>>,

    // Unique indexes.
    pub(crate) tag_values: Arc<HashMap<String, DbId>>,
    pub(crate) resource_tag_values: Arc<HashMap<String, DbId>>,
    pub(crate) container_guids: Arc<HashMap<String, DbId>>,
    pub(crate) segment_guids: Arc<HashMap<String, DbId>>,
    /// `(from, order) -> relationship`.
    pub(crate) edge_orders: Arc<BTreeMap<(DbId, i32), DbId>>,

    // Join tables, `(owner, tag)`.
    pub(crate) container_tag_links: Links,
    pub(crate) relationship_tag_links: Links,
    pub(crate) resource_tag_links: Links,

    // Range indexes.
    pub(crate) segment_starts: Arc<BTreeSet<SegmentRangeKey>>,
    pub(crate) segment_ends: Arc<BTreeSet<SegmentRangeKey>>,

    pub(crate) container_history: HistoryLog,
    pub(crate) resource_history: HistoryLog,
}

/// Rows per frozen history chunk.
const HISTORY_CHUNK: usize = 64;

/// Append-only history rows.
///
/// Full chunks are frozen and shared between copies; only the open tail is
/// copied with the log.
#[derive(Debug, Clone, Default)]
pub(crate) struct HistoryLog {
    frozen: Arc<Vec<Arc<[HistoryRecord]>>>,
    tail: Vec<HistoryRecord>,
}

impl HistoryLog {
    pub(crate) fn push(&mut self, record: HistoryRecord) {
        self.tail.push(record);
        if self.tail.len() == HISTORY_CHUNK {
            let chunk: Arc<[HistoryRecord]> = std::mem::take(&mut self.tail).into();
            Arc::make_mut(&mut self.frozen).push(chunk);
        }
    }

    /// Oldest first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.frozen
            .iter()
            .flat_map(|chunk| chunk.iter())
            .chain(self.tail.iter())
    }
}

impl Tables {
    /// Allocate the next id of a table. Sequences roll back with the
    /// unit-of-work that advanced them.
    pub(crate) fn next_id(&mut self, table: &'static str) -> DbId {
        let next = self.sequences.entry(table).or_insert(0);
        *next += 1;
        *next
    }

    // -----------------------------------------------------------------------
    // Point lookups
    // -----------------------------------------------------------------------

    pub fn entity_type(&self, id: DbId) -> Option<&EntityType> {
        self.entity_types.get(&id)
    }

    pub fn entity_type_by_name(&self, name: &str) -> Option<&EntityType> {
        self.entity_types.values().find(|t| t.name == name)
    }

    /// Name of an optional entity type reference.
    pub fn type_name(&self, type_id: Option<DbId>) -> Option<String> {
        type_id
            .and_then(|id| self.entity_types.get(&id))
            .map(|t| t.name.clone())
    }

    pub fn tag(&self, id: DbId) -> Option<&Tag> {
        self.tags.get(&id)
    }

    pub fn tag_by_value(&self, value: &str) -> Option<&Tag> {
        self.tag_values.get(value).and_then(|id| self.tags.get(id))
    }

    pub fn resource_tag(&self, id: DbId) -> Option<&Tag> {
        self.resource_tags.get(&id)
    }

    pub fn resource_tag_by_value(&self, value: &str) -> Option<&Tag> {
        self.resource_tag_values
            .get(value)
            .and_then(|id| self.resource_tags.get(id))
    }

    pub(crate) fn tag_in(&self, table: TagTable, id: DbId) -> Option<&Tag> {
        match table {
            TagTable::Content => self.tags.get(&id),
            TagTable::Resource => self.resource_tags.get(&id),
        }
    }

    pub(crate) fn tag_by_value_in(&self, table: TagTable, value: &str) -> Option<&Tag> {
        match table {
            TagTable::Content => self.tag_by_value(value),
            TagTable::Resource => self.resource_tag_by_value(value),
        }
    }

    pub fn container(&self, id: DbId) -> Option<&Container> {
        self.containers.get(&id)
    }

    pub fn container_by_guid(&self, guid: &str) -> Option<&Container> {
        self.container_guids
            .get(guid)
            .and_then(|id| self.containers.get(id))
    }

    /// Type name of a container, re-read from the current tables.
    pub fn container_type_name(&self, id: DbId) -> Option<String> {
        self.container(id).and_then(|c| self.type_name(c.type_id))
    }

    pub fn resource(&self, id: DbId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn relationship(&self, id: DbId) -> Option<&ContainerRelationship> {
        self.relationships.get(&id)
    }

    pub fn segment(&self, id: DbId) -> Option<&Segment> {
        self.segments.get(&id)
    }

    pub fn segment_by_guid(&self, guid: &str) -> Option<&Segment> {
        self.segment_guids
            .get(guid)
            .and_then(|id| self.segments.get(id))
    }

    /// Whether the referenced row currently exists.
    pub fn exists(&self, entity: EntityRef) -> bool {
        let id = entity.id;
        match entity.kind {
            EntityKind::EntityType => self.entity_types.contains_key(&id),
            EntityKind::Tag => self.tags.contains_key(&id),
            EntityKind::ResourceTag => self.resource_tags.contains_key(&id),
            EntityKind::Resource => self.resources.contains_key(&id),
            EntityKind::Container => self.containers.contains_key(&id),
            EntityKind::ContainerRelationship => self.relationships.contains_key(&id),
            EntityKind::Segment => self.segments.contains_key(&id),
        }
    }

    // -----------------------------------------------------------------------
    // Scans
    // -----------------------------------------------------------------------

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &ContainerRelationship> {
        self.relationships.values()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn containers_of_type(&self, type_id: DbId) -> Vec<DbId> {
        self.containers
            .values()
            .filter(|c| c.type_id == Some(type_id))
            .map(|c| c.id)
            .collect()
    }

    pub fn resources_of_type(&self, type_id: DbId) -> Vec<DbId> {
        self.resources
            .values()
            .filter(|r| r.type_id == Some(type_id))
            .map(|r| r.id)
            .collect()
    }

    /// Resources attached to `owner`, by id.
    pub fn resources_owned_by(&self, owner: EntityRef) -> Vec<&Resource> {
        self.resources.values().filter(|r| r.owner == owner).collect()
    }

    // -----------------------------------------------------------------------
    // Tag joins
    // -----------------------------------------------------------------------

    pub fn container_tags(&self, container_id: DbId) -> Vec<&Tag> {
        linked(&self.container_tag_links, container_id)
            .filter_map(|tag_id| self.tags.get(&tag_id))
            .collect()
    }

    pub fn relationship_tags(&self, relationship_id: DbId) -> Vec<&Tag> {
        linked(&self.relationship_tag_links, relationship_id)
            .filter_map(|tag_id| self.tags.get(&tag_id))
            .collect()
    }

    pub fn tags_of_resource(&self, resource_id: DbId) -> Vec<&Tag> {
        linked(&self.resource_tag_links, resource_id)
            .filter_map(|tag_id| self.resource_tags.get(&tag_id))
            .collect()
    }

    pub fn containers_with_tag(&self, tag_id: DbId) -> Vec<DbId> {
        carriers(&self.container_tag_links, tag_id)
    }

    pub fn relationships_with_tag(&self, tag_id: DbId) -> Vec<DbId> {
        carriers(&self.relationship_tag_links, tag_id)
    }

    pub fn resources_with_resource_tag(&self, resource_tag_id: DbId) -> Vec<DbId> {
        carriers(&self.resource_tag_links, resource_tag_id)
    }

    pub fn relationship_has_tag_value(&self, relationship_id: DbId, value: &str) -> bool {
        self.relationship_tags(relationship_id)
            .iter()
            .any(|t| t.value == value)
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    /// Edges leaving `from`, by order then most recently created first.
    pub fn outbound_edges(&self, from: DbId) -> Vec<&ContainerRelationship> {
        let mut edges: Vec<&ContainerRelationship> = self
            .edge_orders
            .range((from, i32::MIN)..=(from, i32::MAX))
            .filter_map(|(_, id)| self.relationships.get(id))
            .collect();
        edges.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then(b.created_date.cmp(&a.created_date))
                .then(b.id.cmp(&a.id))
        });
        edges
    }

    /// Edges entering `to`, by parent then order.
    pub fn inbound_edges(&self, to: DbId) -> Vec<&ContainerRelationship> {
        let mut edges: Vec<&ContainerRelationship> = self
            .relationships
            .values()
            .filter(|r| r.to_id == to)
            .collect();
        edges.sort_by(|a, b| {
            a.from_id
                .cmp(&b.from_id)
                .then(a.order.cmp(&b.order))
                .then(b.created_date.cmp(&a.created_date))
        });
        edges
    }

    /// The relationship holding `(from, order)`, if any.
    pub fn edge_at(&self, from: DbId, order: i32) -> Option<&ContainerRelationship> {
        self.edge_orders
            .get(&(from, order))
            .and_then(|id| self.relationships.get(id))
    }

    /// Enabled children of `parent`: by edge order, then newest child first.
    pub fn enabled_children(&self, parent: DbId) -> Vec<&Container> {
        let mut children: Vec<(i32, &Container)> = self
            .outbound_edges(parent)
            .into_iter()
            .filter_map(|e| self.containers.get(&e.to_id).map(|c| (e.order, c)))
            .filter(|(_, c)| c.is_enabled)
            .collect();
        children.sort_by(|(oa, a), (ob, b)| {
            oa.cmp(ob)
                .then(b.created_date.cmp(&a.created_date))
                .then(b.id.cmp(&a.id))
        });
        children.into_iter().map(|(_, c)| c).collect()
    }

    // -----------------------------------------------------------------------
    // Segments
    // -----------------------------------------------------------------------

    /// Segments of `parent`, by start time code then id.
    pub fn segments_of(&self, parent: DbId) -> Vec<&Segment> {
        let mut segments: Vec<&Segment> = self
            .segments
            .values()
            .filter(|s| s.parent_id == parent)
            .collect();
        segments.sort_by(|a, b| a.start_time_code.cmp(&b.start_time_code).then(a.id.cmp(&b.id)));
        segments
    }

    /// Segments of `(parent, type)` whose start falls in `range`, by start.
    pub fn segments_starting_in(
        &self,
        parent: DbId,
        segment_type: &str,
        range: RangeInclusive<TimeCode>,
    ) -> Vec<&Segment> {
        self.segment_range(&self.segment_starts, parent, segment_type, range)
    }

    /// Segments of `(parent, type)` whose end falls in `range`, by end.
    pub fn segments_ending_in(
        &self,
        parent: DbId,
        segment_type: &str,
        range: RangeInclusive<TimeCode>,
    ) -> Vec<&Segment> {
        self.segment_range(&self.segment_ends, parent, segment_type, range)
    }

    fn segment_range(
        &self,
        index: &BTreeSet<SegmentRangeKey>,
        parent: DbId,
        segment_type: &str,
        range: RangeInclusive<TimeCode>,
    ) -> Vec<&Segment> {
        let (lo, hi) = range.into_inner();
        if lo > hi {
            return Vec::new();
        }
        let start = (parent, segment_type.to_string(), lo, DbId::MIN);
        let end = (parent, segment_type.to_string(), hi, DbId::MAX);
        index
            .range(start..=end)
            .filter_map(|(_, _, _, id)| self.segments.get(id))
            .collect()
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// History of a container, oldest first.
    pub fn container_history(&self, id: DbId) -> Vec<&HistoryRecord> {
        self.container_history
            .iter()
            .filter(|h| h.entity_id == id)
            .collect()
    }

    /// History of a resource, oldest first.
    pub fn resource_history(&self, id: DbId) -> Vec<&HistoryRecord> {
        self.resource_history
            .iter()
            .filter(|h| h.entity_id == id)
            .collect()
    }
}

fn linked(links: &BTreeSet<(DbId, DbId)>, owner: DbId) -> impl Iterator<Item = DbId> + '_ {
    links
        .range((owner, DbId::MIN)..=(owner, DbId::MAX))
        .map(|(_, tag_id)| *tag_id)
}

fn carriers(links: &BTreeSet<(DbId, DbId)>, tag_id: DbId) -> Vec<DbId> {
    links
        .iter()
        .filter(|(_, t)| *t == tag_id)
        .map(|(owner, _)| *owner)
        .collect()
}
