//! Durable record of failed index writes.
//!
//! [`FailurePersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and writes every [`IndexEvent::WriteFailed`] to the `index_failures`
//! table so a reconciler can retry it later. It runs as a long-lived
//! background task and stops when the bus is dropped.

use cms_core::types::DbId;
use cms_db::models::index_failure::CreateIndexFailure;
use cms_db::repositories::IndexFailureRepo;
use cms_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::IndexEvent;

/// Background service that persists index write failures.
pub struct FailurePersistence;

impl FailurePersistence {
    /// Run the persistence loop until the bus closes.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<IndexEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let Some(failure) = Self::to_record(&event) else {
                        continue;
                    };
                    if let Err(e) = Self::persist(&pool, &failure).await {
                        tracing::error!(
                            error = %e,
                            entity = %failure.entity,
                            operation = %failure.operation,
                            "Failed to persist index failure"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Index failure persistence lagged, some failures were not recorded"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Index event bus closed, failure persistence shutting down");
                    break;
                }
            }
        }
    }

    /// The row to record for `event`, if it is a failure.
    pub fn to_record(event: &IndexEvent) -> Option<CreateIndexFailure> {
        match event {
            IndexEvent::WriteFailed {
                entity,
                operation,
                error,
                timestamp,
            } => Some(CreateIndexFailure {
                entity: *entity,
                operation: operation.as_str().to_string(),
                error: error.clone(),
                attempted_at: *timestamp,
            }),
            IndexEvent::Flushed { .. } => None,
        }
    }

    async fn persist(pool: &DbPool, failure: &CreateIndexFailure) -> Result<DbId, sqlx::Error> {
        IndexFailureRepo::insert(pool, failure).await
    }
}
