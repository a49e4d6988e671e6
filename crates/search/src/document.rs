//! Index document construction.
//!
//! Documents are built from current table state only. A container
//! document embeds its tag, resource, parent and child rollups, which is
//! why edits to any of those dirty the container.

use cms_core::entity::{EntityKind, EntityRef};
use cms_db::models::container::Container;
use cms_db::models::resource::Resource;
use cms_db::models::segment::Segment;
use cms_db::resolution::{child_rollup, parent_rollup, reference_date, resource_rollup, tag_rollup};
use cms_db::Tables;
use serde_json::json;

use crate::index::IndexDocument;

/// Build the document for `entity`.
///
/// `None` when the row no longer exists or its kind has no document of
/// its own.
pub fn build_document(tables: &Tables, entity: EntityRef) -> Option<IndexDocument> {
    let body = match entity.kind {
        EntityKind::Container => container_body(tables, tables.container(entity.id)?),
        EntityKind::Resource => resource_body(tables, tables.resource(entity.id)?),
        EntityKind::Segment => segment_body(tables, tables.segment(entity.id)?),
        EntityKind::EntityType
        | EntityKind::Tag
        | EntityKind::ResourceTag
        | EntityKind::ContainerRelationship => return None,
    };
    Some(IndexDocument::new(entity, body))
}

fn container_body(tables: &Tables, c: &Container) -> serde_json::Value {
    let segments: Vec<_> = tables
        .segments_of(c.id)
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id,
                "guid": s.guid,
                "type": s.segment_type,
                "start_time_code": s.start_time_code,
                "end_time_code": s.end_time_code,
            })
        })
        .collect();

    json!({
        "id": c.id,
        "guid": c.guid,
        "type": tables.type_name(c.type_id),
        "status": c.status,
        "origin": c.origin,
        "data": c.data,
        "is_enabled": c.is_enabled,
        "created_date": c.created_date,
        "published_date": c.published_date,
        "updated_date": c.updated_date,
        "expiration_date": c.expiration_date,
        "reference_date": reference_date(c),
        "tags": tag_rollup(tables, c.id),
        "resources": resource_rollup(tables, c.id),
        "parents": parent_rollup(tables, c.id),
        "children": child_rollup(tables, c.id),
        "segments": segments,
    })
}

/// Owner identity as embedded in resource documents.
fn owner_summary(tables: &Tables, owner: EntityRef) -> serde_json::Value {
    let guid = match owner.kind {
        EntityKind::Container => tables.container(owner.id).map(|c| c.guid.clone()),
        EntityKind::Segment => tables.segment(owner.id).map(|s| s.guid.clone()),
        _ => None,
    };
    json!({
        "kind": owner.kind,
        "id": owner.id,
        "guid": guid,
    })
}

fn resource_body(tables: &Tables, r: &Resource) -> serde_json::Value {
    let tags: Vec<&str> = tables
        .tags_of_resource(r.id)
        .into_iter()
        .map(|t| t.value.as_str())
        .collect();
    json!({
        "id": r.id,
        "type": tables.type_name(r.type_id),
        "uri": r.uri,
        "status": r.status,
        "origin": r.origin,
        "data": r.data,
        "owner": owner_summary(tables, r.owner),
        "tags": tags,
        "created_date": r.created_date,
        "published_date": r.published_date,
        "updated_date": r.updated_date,
        "expiration_date": r.expiration_date,
    })
}

fn segment_body(tables: &Tables, s: &Segment) -> serde_json::Value {
    let resources: Vec<_> = tables
        .resources_owned_by(EntityRef::segment(s.id))
        .into_iter()
        .map(|r| json!({ "uri": r.uri, "status": r.status }))
        .collect();
    json!({
        "id": s.id,
        "guid": s.guid,
        "parent": {
            "id": s.parent_id,
            "guid": tables.container(s.parent_id).map(|c| c.guid.clone()),
        },
        "type": s.segment_type,
        "namespace": s.namespace,
        "status": s.status,
        "label": s.label,
        "value": s.value,
        "data": s.data,
        "start_time_code": s.start_time_code,
        "end_time_code": s.end_time_code,
        "published_date": s.published_date,
        "expiration_date": s.expiration_date,
        "resources": resources,
    })
}
