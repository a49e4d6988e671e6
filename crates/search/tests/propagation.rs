use std::sync::Arc;

use assert_matches::assert_matches;
use cms_core::entity::EntityRef;
use cms_core::error::CoreError;
use cms_core::propagation::{ExclusionPolicy, FailurePolicy, PropagationConfig, PropagationMode};
use cms_db::models::container::{CreateContainer, UpdateContainer};
use cms_db::models::entity_type::CreateEntityType;
use cms_db::models::relationship::CreateRelationship;
use cms_db::models::resource::{CreateResource, UpdateResource};
use cms_db::models::segment::CreateSegment;
use cms_db::models::tag::CreateTag;
use cms_events::{EventBus, FailurePersistence, IndexEvent};
use cms_search::{IndexWrite, MemoryIndex, PropagationError, Propagator};

fn config(mode: PropagationMode, failure_policy: FailurePolicy) -> PropagationConfig {
    PropagationConfig {
        mode,
        failure_policy,
        exclusions: ExclusionPolicy::none(),
    }
}

fn batched(index: &MemoryIndex) -> Propagator {
    Propagator::from_config(
        &config(PropagationMode::Batched, FailurePolicy::ExactlyOnce),
        Arc::new(index.clone()),
        None,
    )
}

fn upsert(entity: EntityRef) -> IndexWrite {
    IndexWrite::Upsert(entity.document_id())
}

fn delete(entity: EntityRef) -> IndexWrite {
    IndexWrite::Delete(entity.document_id())
}

/// Many writes to one entity in one session produce a single index write.
#[tokio::test]
async fn test_repeated_changes_flush_once() {
    let index = MemoryIndex::new();
    let p = batched(&index);

    let id = p
        .run(|uow| {
            let id = uow.create_container(CreateContainer::new("a", None))?.id;
            for status in ["draft", "review", "approved", "published"] {
                uow.update_container(
                    id,
                    UpdateContainer {
                        status: Some(status.into()),
                        ..Default::default()
                    },
                )?;
            }
            Ok(id)
        })
        .await
        .unwrap();

    assert_eq!(index.writes().await, vec![upsert(EntityRef::container(id))]);
    let doc = index.document(&EntityRef::container(id).document_id()).await.unwrap();
    assert_eq!(doc.body["status"], "published");
}

/// A rolled back batched session never touches the index.
#[tokio::test]
async fn test_rollback_writes_nothing() {
    let index = MemoryIndex::new();
    let p = batched(&index);

    let mut session = p.session().await;
    session
        .apply(|uow| uow.create_container(CreateContainer::new("a", None)))
        .await
        .unwrap();
    let report = session.rollback().await.unwrap();
    assert_eq!(report.attempted(), 0);

    let err = p
        .run(|uow| {
            uow.create_container(CreateContainer::new("b", None))?;
            Err::<(), _>(CoreError::Validation("abort".into()))
        })
        .await
        .unwrap_err();
    assert_matches!(err, PropagationError::Store(CoreError::Validation(_)));

    assert!(index.writes().await.is_empty());
    assert_eq!(p.store().read().containers().count(), 0);
}

/// Deleting a container removes its document and every cascaded one, and
/// refreshes the neighbours that embedded it.
#[tokio::test]
async fn test_cascade_delete_propagates() {
    let index = MemoryIndex::new();
    let p = batched(&index);

    let (parent, target, child, seg, res, seg_res) = p
        .run(|uow| {
            let parent = uow.create_container(CreateContainer::new("p", None))?.id;
            let target = uow.create_container(CreateContainer::new("t", None))?.id;
            let child = uow.create_container(CreateContainer::new("c", None))?.id;
            uow.create_relationship(CreateRelationship::new(parent, target, 0))?;
            uow.create_relationship(CreateRelationship::new(target, child, 0))?;
            let seg = uow
                .create_segment(CreateSegment::new(
                    target,
                    "chapter",
                    "0".parse().unwrap(),
                    "60".parse().unwrap(),
                ))?
                .id;
            let res = uow
                .create_resource(CreateResource::new(EntityRef::container(target), "a.jpg"))?
                .id;
            let seg_res = uow
                .create_resource(CreateResource::new(EntityRef::segment(seg), "b.jpg"))?
                .id;
            Ok((parent, target, child, seg, res, seg_res))
        })
        .await
        .unwrap();
    index.clear_writes().await;

    p.run(|uow| uow.delete_container(target)).await.unwrap();

    let writes = index.writes().await;
    for gone in [
        EntityRef::container(target),
        EntityRef::segment(seg),
        EntityRef::resource(res),
        EntityRef::resource(seg_res),
    ] {
        assert!(writes.contains(&delete(gone)), "{gone} should be deleted");
    }
    assert!(writes.contains(&upsert(EntityRef::container(parent))));
    assert!(writes.contains(&upsert(EntityRef::container(child))));
    assert_eq!(writes.len(), 6);

    let parent_doc = index
        .document(&EntityRef::container(parent).document_id())
        .await
        .unwrap();
    assert_eq!(parent_doc.body["children"], serde_json::json!([]));
}

/// An edge into an excluded container refreshes the parent only, until the
/// target's type changes.
#[tokio::test]
async fn test_excluded_targets_are_not_refreshed() {
    let index = MemoryIndex::new();
    let p = Propagator::from_config(
        &PropagationConfig {
            exclusions: ExclusionPolicy::with_types(["platform"]),
            ..config(PropagationMode::Batched, FailurePolicy::ExactlyOnce)
        },
        Arc::new(index.clone()),
        None,
    );

    let (a, b, edge, series) = p
        .run(|uow| {
            let platform = uow.create_entity_type(CreateEntityType::new("platform"))?.id;
            let series = uow.create_entity_type(CreateEntityType::new("series"))?.id;
            let a = uow.create_container(CreateContainer::new("a", None))?.id;
            let b = uow
                .create_container(CreateContainer::new("b", Some(platform)))?
                .id;
            let edge = uow.create_relationship(CreateRelationship::new(a, b, 0))?.id;
            Ok((a, b, edge, series))
        })
        .await
        .unwrap();
    index.clear_writes().await;

    p.run(|uow| uow.set_relationship_order(edge, 4)).await.unwrap();
    assert_eq!(index.writes().await, vec![upsert(EntityRef::container(a))]);
    index.clear_writes().await;

    p.run(|uow| {
        uow.update_container(
            b,
            UpdateContainer {
                type_id: Some(series),
                ..Default::default()
            },
        )?;
        uow.set_relationship_order(edge, 5)
    })
    .await
    .unwrap();
    assert!(index.writes().await.contains(&upsert(EntityRef::container(b))));
}

/// Deleting the parent of an excluded container deletes the parent's
/// document and leaves the excluded child's alone.
#[tokio::test]
async fn test_deleting_parent_skips_excluded_child() {
    let index = MemoryIndex::new();
    let p = Propagator::from_config(
        &PropagationConfig {
            exclusions: ExclusionPolicy::with_types(["platform"]),
            ..config(PropagationMode::Batched, FailurePolicy::ExactlyOnce)
        },
        Arc::new(index.clone()),
        None,
    );

    let (a, b) = p
        .run(|uow| {
            let platform = uow.create_entity_type(CreateEntityType::new("platform"))?.id;
            let a = uow.create_container(CreateContainer::new("a", None))?.id;
            let b = uow
                .create_container(CreateContainer::new("b", Some(platform)))?
                .id;
            uow.create_relationship(CreateRelationship::new(a, b, 0))?;
            Ok((a, b))
        })
        .await
        .unwrap();
    index.clear_writes().await;

    p.run(|uow| uow.delete_container(a)).await.unwrap();
    assert_eq!(index.writes().await, vec![delete(EntityRef::container(a))]);
    assert!(index
        .document(&EntityRef::container(b).document_id())
        .await
        .is_some());
}

/// Publishing a resource moves it into its owner's resource rollup.
#[tokio::test]
async fn test_published_resource_reaches_owner_document() {
    let index = MemoryIndex::new();
    let p = batched(&index);

    let (c, r) = p
        .run(|uow| {
            uow.create_resource_tag(CreateTag::new("poster"))?;
            let c = uow.create_container(CreateContainer::new("m", None))?.id;
            let r = uow
                .create_resource(CreateResource {
                    status: Some("new".into()),
                    tags: vec!["poster".into()],
                    ..CreateResource::new(EntityRef::container(c), "poster.jpg")
                })?
                .id;
            Ok((c, r))
        })
        .await
        .unwrap();
    let doc_id = EntityRef::container(c).document_id();
    let doc = index.document(&doc_id).await.unwrap();
    assert_eq!(doc.body["resources"], serde_json::json!([]));

    p.run(|uow| {
        uow.update_resource(
            r,
            UpdateResource {
                status: Some("published".into()),
                ..Default::default()
            },
        )
    })
    .await
    .unwrap();
    let doc = index.document(&doc_id).await.unwrap();
    assert_eq!(doc.body["resources"][0]["uri"], "poster.jpg");
    assert_eq!(doc.body["resources"][0]["tag"], "poster");
}

/// Resource tag values are unique; get-or-create hands back the existing row.
#[tokio::test]
async fn test_duplicate_resource_tag_is_rejected() {
    let index = MemoryIndex::new();
    let p = batched(&index);

    let first = p
        .run(|uow| uow.create_resource_tag(CreateTag::new("thumbnail")))
        .await
        .unwrap();
    let err = p
        .run(|uow| uow.create_resource_tag(CreateTag::new("thumbnail")))
        .await
        .unwrap_err();
    assert_matches!(err, PropagationError::Store(CoreError::Conflict(_)));

    let (existing, created) = p
        .run(|uow| uow.get_or_create_resource_tag(CreateTag::new("thumbnail")))
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(existing.id, first.id);
}

/// Exactly-once surfaces failed writes after trying the rest; content stays
/// committed either way.
#[tokio::test]
async fn test_failure_policies() {
    for policy in [FailurePolicy::ExactlyOnce, FailurePolicy::BestEffort] {
        let index = MemoryIndex::new();
        let p = Propagator::from_config(
            &config(PropagationMode::Batched, policy),
            Arc::new(index.clone()),
            None,
        );
        index.fail_document("container.1").await;

        let result = p
            .run(|uow| {
                uow.create_container(CreateContainer::new("a", None))?;
                uow.create_container(CreateContainer::new("b", None))
            })
            .await;

        match policy {
            FailurePolicy::ExactlyOnce => {
                let err = result.unwrap_err();
                assert_eq!(err.failures().len(), 1);
                assert_eq!(err.failures()[0].entity, EntityRef::container(1));
            }
            FailurePolicy::BestEffort => {
                result.unwrap();
            }
        }
        assert_eq!(index.document_ids().await, vec!["container.2"]);
        assert_eq!(p.store().read().containers().count(), 2);
    }
}

/// Failed writes are published for the outbox and can be reconciled later.
#[tokio::test]
async fn test_failures_are_published_and_reconciled() {
    let index = MemoryIndex::new();
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let p = Propagator::from_config(
        &config(PropagationMode::Batched, FailurePolicy::BestEffort),
        Arc::new(index.clone()),
        Some(Arc::clone(&bus)),
    );
    index.set_unavailable(true).await;

    let id = p
        .run(|uow| Ok(uow.create_container(CreateContainer::new("a", None))?.id))
        .await
        .unwrap();

    let event = rx.recv().await.unwrap();
    let record = FailurePersistence::to_record(&event).unwrap();
    assert_eq!(record.entity, EntityRef::container(id));
    assert_eq!(record.operation, "upsert");
    assert_matches!(rx.recv().await.unwrap(), IndexEvent::Flushed { failed: 1, .. });

    index.heal().await;
    let report = p.reconcile(&[record.entity]).await.unwrap();
    assert_eq!(report.upserted, 1);
    assert!(index.document(&record.document_id()).await.is_some());
}
