use std::sync::Arc;

use cms_core::entity::EntityRef;
use cms_core::propagation::{ExclusionPolicy, FailurePolicy, PropagationConfig, PropagationMode};
use cms_db::models::container::CreateContainer;
use cms_db::repositories::IndexFailureRepo;
use cms_events::{EventBus, FailurePersistence};
use cms_search::{MemoryIndex, Propagator};
use sqlx::PgPool;

/// Failures recorded while the index was down are retried from the outbox
/// and resolved once they sync; the ones still failing stay open.
#[sqlx::test(migrations = "../db/migrations")]
async fn test_outbox_drains_after_index_recovers(pool: PgPool) {
    let index = MemoryIndex::new();
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let p = Propagator::from_config(
        &PropagationConfig {
            mode: PropagationMode::Batched,
            failure_policy: FailurePolicy::BestEffort,
            exclusions: ExclusionPolicy::none(),
        },
        Arc::new(index.clone()),
        Some(bus),
    );

    index.set_unavailable(true).await;
    let (a, b) = p
        .run(|uow| {
            let a = uow.create_container(CreateContainer::new("a", None))?.id;
            let b = uow.create_container(CreateContainer::new("b", None))?.id;
            Ok((a, b))
        })
        .await
        .unwrap();
    while let Ok(event) = rx.try_recv() {
        if let Some(record) = FailurePersistence::to_record(&event) {
            IndexFailureRepo::insert(&pool, &record).await.unwrap();
        }
    }
    assert_eq!(IndexFailureRepo::list_unresolved(&pool, 10).await.unwrap().len(), 2);

    index.heal().await;
    index.fail_document(EntityRef::container(b).document_id()).await;

    let report = p.reconcile_outbox(&pool, 10).await.unwrap();
    assert_eq!(report.upserted, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(index
        .document(&EntityRef::container(a).document_id())
        .await
        .is_some());

    let open = IndexFailureRepo::list_unresolved(&pool, 10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].entity().unwrap(), EntityRef::container(b));
    // Retrying does not record the same failure again.
    assert!(rx.try_recv().is_err());

    index.heal().await;
    let report = p.reconcile_outbox(&pool, 10).await.unwrap();
    assert_eq!(report.upserted, 1);
    assert!(IndexFailureRepo::list_unresolved(&pool, 10).await.unwrap().is_empty());
}
