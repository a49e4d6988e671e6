//! Integration tests for the `index_failures` outbox.
//!
//! Exercises [`IndexFailureRepo`] against a real database:
//! - Inserted failures are listed until resolved, oldest first
//! - `list_unresolved` honours its limit
//! - `mark_resolved` only touches the given entity's open rows

use chrono::{Duration, Utc};
use cms_core::entity::EntityRef;
use cms_db::models::index_failure::CreateIndexFailure;
use cms_db::repositories::IndexFailureRepo;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn failure(entity: EntityRef, operation: &str, minutes_ago: i64) -> CreateIndexFailure {
    CreateIndexFailure {
        entity,
        operation: operation.to_string(),
        error: "index unavailable".to_string(),
        attempted_at: Utc::now() - Duration::minutes(minutes_ago),
    }
}

// ---------------------------------------------------------------------------
// Test: insert then list
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_insert_and_list_oldest_first(pool: PgPool) {
    cms_db::health_check(&pool).await.unwrap();

    let newer = IndexFailureRepo::insert(&pool, &failure(EntityRef::container(7), "upsert", 1))
        .await
        .unwrap();
    let older = IndexFailureRepo::insert(&pool, &failure(EntityRef::resource(3), "delete", 10))
        .await
        .unwrap();

    let rows = IndexFailureRepo::list_unresolved(&pool, 10).await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![older, newer]);

    let first = &rows[0];
    assert_eq!(first.entity().unwrap(), EntityRef::resource(3));
    assert_eq!(first.document_id, "resource.3");
    assert_eq!(first.operation, "delete");
    assert!(!first.resolved);
    assert!(first.resolved_at.is_none());
}

// ---------------------------------------------------------------------------
// Test: limit
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_list_unresolved_respects_limit(pool: PgPool) {
    for id in 1..=3 {
        IndexFailureRepo::insert(&pool, &failure(EntityRef::container(id), "upsert", 10 - id))
            .await
            .unwrap();
    }

    let rows = IndexFailureRepo::list_unresolved(&pool, 2).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].entity_id, 1);
}

// ---------------------------------------------------------------------------
// Test: mark_resolved
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_mark_resolved_clears_one_entity(pool: PgPool) {
    let target = EntityRef::container(5);
    IndexFailureRepo::insert(&pool, &failure(target, "upsert", 3))
        .await
        .unwrap();
    IndexFailureRepo::insert(&pool, &failure(target, "upsert", 2))
        .await
        .unwrap();
    IndexFailureRepo::insert(&pool, &failure(EntityRef::segment(5), "upsert", 1))
        .await
        .unwrap();

    let updated = IndexFailureRepo::mark_resolved(&pool, "container", 5)
        .await
        .unwrap();
    assert_eq!(updated, 2, "both open rows of the container should resolve");

    let rows = IndexFailureRepo::list_unresolved(&pool, 10).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].entity().unwrap(), EntityRef::segment(5));

    let again = IndexFailureRepo::mark_resolved(&pool, "container", 5)
        .await
        .unwrap();
    assert_eq!(again, 0, "resolving twice should touch nothing");
}
