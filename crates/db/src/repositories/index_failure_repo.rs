//! Repository for the `index_failures` outbox table.

use cms_core::types::DbId;
use sqlx::PgPool;

use crate::models::index_failure::{CreateIndexFailure, IndexFailure};

/// Column list for `index_failures` queries.
const COLUMNS: &str = "id, entity_kind, entity_id, document_id, operation, error, \
                       attempted_at, resolved, resolved_at";

/// Provides read/write operations for recorded index failures.
pub struct IndexFailureRepo;

impl IndexFailureRepo {
    /// Record a failed index write, returning the generated ID.
    pub async fn insert(pool: &PgPool, input: &CreateIndexFailure) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO index_failures \
                (entity_kind, entity_id, document_id, operation, error, attempted_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id",
        )
        .bind(input.entity.kind.as_str())
        .bind(input.entity.id)
        .bind(input.document_id())
        .bind(&input.operation)
        .bind(&input.error)
        .bind(input.attempted_at)
        .fetch_one(pool)
        .await
    }

    /// List unresolved failures, oldest first.
    pub async fn list_unresolved(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<IndexFailure>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM index_failures \
             WHERE NOT resolved ORDER BY attempted_at, id LIMIT $1"
        );
        sqlx::query_as::<_, IndexFailure>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Mark every unresolved failure of one entity as resolved.
    ///
    /// Returns the number of rows updated.
    pub async fn mark_resolved(
        pool: &PgPool,
        entity_kind: &str,
        entity_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE index_failures SET resolved = true, resolved_at = now() \
             WHERE entity_kind = $1 AND entity_id = $2 AND NOT resolved",
        )
        .bind(entity_kind)
        .bind(entity_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
