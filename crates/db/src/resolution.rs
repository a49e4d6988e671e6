//! Read projections over the content graph.
//!
//! [`with_descendants`] resolves a container forest for serving. The
//! rollups flatten one container's neighbourhood into rows that the search
//! document builder embeds.

use cms_core::entity::EntityRef;
use cms_core::reference::catalog_reference_date;
use cms_core::types::{DbId, Timestamp};
use serde::Serialize;

use crate::models::container::Container;
use crate::models::resource::Resource;
use crate::models::tag::Tag;
use crate::models::PUBLISHED_STATUS;
use crate::store::Tables;

// ---------------------------------------------------------------------------
// with_descendants
// ---------------------------------------------------------------------------

/// Which resources a resolved root carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceFilter {
    /// Keep only `published` resources.
    pub restrict_to_published: bool,
    /// Allow-list of statuses. `Some(vec![])` keeps nothing, which is not
    /// the same as `None`.
    pub statuses: Option<Vec<String>>,
}

impl ResourceFilter {
    /// No filtering.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn published_only() -> Self {
        Self {
            restrict_to_published: true,
            statuses: None,
        }
    }

    pub fn statuses<S: Into<String>>(statuses: impl IntoIterator<Item = S>) -> Self {
        Self {
            restrict_to_published: false,
            statuses: Some(statuses.into_iter().map(Into::into).collect()),
        }
    }

    fn keeps(&self, resource: &Resource) -> bool {
        if self.restrict_to_published && resource.status != PUBLISHED_STATUS {
            return false;
        }
        match &self.statuses {
            Some(allowed) => allowed.iter().any(|s| *s == resource.status),
            None => true,
        }
    }
}

/// A container with its tags, resources and (optionally) enabled children.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerTree {
    pub container: Container,
    pub type_name: Option<String>,
    pub tags: Vec<Tag>,
    pub resources: Vec<Resource>,
    /// `None` when children were not resolved at this depth.
    pub children: Option<Vec<ContainerTree>>,
}

/// Resolve `roots` with nested enabled children.
///
/// `depth` 0 leaves children unresolved, -1 forces an empty child list and
/// `n > 0` resolves children to depth `n - 1`. `filter` applies to the
/// roots only; nested levels carry all their resources. Missing root ids
/// are skipped.
pub fn with_descendants(
    tables: &Tables,
    roots: &[DbId],
    depth: i32,
    filter: &ResourceFilter,
) -> Vec<ContainerTree> {
    roots
        .iter()
        .filter_map(|id| tables.container(*id))
        .map(|c| resolve_tree(tables, c, depth, filter))
        .collect()
}

fn resolve_tree(
    tables: &Tables,
    container: &Container,
    depth: i32,
    filter: &ResourceFilter,
) -> ContainerTree {
    let children = match depth {
        -1 => Some(Vec::new()),
        d if d > 0 => Some(
            tables
                .enabled_children(container.id)
                .into_iter()
                .map(|child| resolve_tree(tables, child, d - 1, &ResourceFilter::all()))
                .collect(),
        ),
        _ => None,
    };

    ContainerTree {
        container: container.clone(),
        type_name: tables.type_name(container.type_id),
        tags: tables
            .container_tags(container.id)
            .into_iter()
            .cloned()
            .collect(),
        resources: tables
            .resources_owned_by(EntityRef::container(container.id))
            .into_iter()
            .filter(|r| filter.keeps(r))
            .cloned()
            .collect(),
        children,
    }
}

// ---------------------------------------------------------------------------
// Rollups
// ---------------------------------------------------------------------------

/// One tag carried by a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagRow {
    #[serde(rename = "type")]
    pub tag_type: String,
    pub value: String,
    pub label: String,
}

/// One published resource, repeated per resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRow {
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub uri: String,
    pub status: String,
    pub tag: Option<String>,
}

/// One inbound edge, repeated per edge tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentRow {
    pub id: DbId,
    pub guid: String,
    #[serde(rename = "type")]
    pub parent_type: Option<String>,
    pub order: i32,
    pub relation_tag_value: Option<String>,
    pub relation_tag_label: Option<String>,
    pub relation_tag_type: Option<String>,
}

/// One outbound edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildRow {
    pub id: DbId,
    pub guid: String,
    #[serde(rename = "type")]
    pub child_type: Option<String>,
    pub order: i32,
    pub is_enabled: bool,
}

pub fn tag_rollup(tables: &Tables, container_id: DbId) -> Vec<TagRow> {
    tables
        .container_tags(container_id)
        .into_iter()
        .map(|t| TagRow {
            tag_type: t.tag_type.clone(),
            value: t.value.clone(),
            label: t.label.clone(),
        })
        .collect()
}

/// Published resources attached to the container, one row per resource
/// tag (a single row with no tag when untagged).
pub fn resource_rollup(tables: &Tables, container_id: DbId) -> Vec<ResourceRow> {
    let owner = EntityRef::container(container_id);
    let mut rows = Vec::new();
    for resource in tables.resources_owned_by(owner) {
        if resource.status != PUBLISHED_STATUS {
            continue;
        }
        let resource_type = tables.type_name(resource.type_id);
        let tags = tables.tags_of_resource(resource.id);
        let row = |tag: Option<String>| ResourceRow {
            resource_type: resource_type.clone(),
            uri: resource.uri.clone(),
            status: resource.status.clone(),
            tag,
        };
        if tags.is_empty() {
            rows.push(row(None));
        } else {
            rows.extend(tags.into_iter().map(|t| row(Some(t.value.clone()))));
        }
    }
    rows
}

/// Inbound edges with their parent, one row per edge tag (a single row
/// with no tag fields when untagged).
pub fn parent_rollup(tables: &Tables, container_id: DbId) -> Vec<ParentRow> {
    let mut rows = Vec::new();
    for edge in tables.inbound_edges(container_id) {
        let Some(parent) = tables.container(edge.from_id) else {
            continue;
        };
        let parent_type = tables.type_name(parent.type_id);
        let row = |tag: Option<&Tag>| ParentRow {
            id: parent.id,
            guid: parent.guid.clone(),
            parent_type: parent_type.clone(),
            order: edge.order,
            relation_tag_value: tag.map(|t| t.value.clone()),
            relation_tag_label: tag.map(|t| t.label.clone()),
            relation_tag_type: tag.map(|t| t.tag_type.clone()),
        };
        let tags = tables.relationship_tags(edge.id);
        if tags.is_empty() {
            rows.push(row(None));
        } else {
            rows.extend(tags.into_iter().map(|t| row(Some(t))));
        }
    }
    rows
}

/// Outbound edges with their child, in edge order.
pub fn child_rollup(tables: &Tables, container_id: DbId) -> Vec<ChildRow> {
    tables
        .outbound_edges(container_id)
        .into_iter()
        .filter_map(|edge| {
            tables.container(edge.to_id).map(|child| ChildRow {
                id: child.id,
                guid: child.guid.clone(),
                child_type: tables.type_name(child.type_id),
                order: edge.order,
                is_enabled: child.is_enabled,
            })
        })
        .collect()
}

/// Reference date for catalog output: the precomputed column, else
/// resolved from the payload.
pub fn reference_date(container: &Container) -> Timestamp {
    catalog_reference_date(
        container.reference_date,
        container.data.as_ref(),
        container.published_date,
        container.created_date,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
