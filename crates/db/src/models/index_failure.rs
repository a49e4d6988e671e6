//! Failed search index writes awaiting reconciliation.

use cms_core::entity::{EntityKind, EntityRef};
use cms_core::error::CoreError;
use cms_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `index_failures` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct IndexFailure {
    pub id: DbId,
    pub entity_kind: String,
    pub entity_id: DbId,
    pub document_id: String,
    /// `"upsert"` or `"delete"`.
    pub operation: String,
    pub error: String,
    pub attempted_at: Timestamp,
    pub resolved: bool,
    pub resolved_at: Option<Timestamp>,
}

impl IndexFailure {
    /// The entity whose write failed.
    pub fn entity(&self) -> Result<EntityRef, CoreError> {
        Ok(EntityRef::new(
            EntityKind::from_str(&self.entity_kind)?,
            self.entity_id,
        ))
    }
}

/// DTO for recording a failure.
#[derive(Debug, Clone)]
pub struct CreateIndexFailure {
    pub entity: EntityRef,
    pub operation: String,
    pub error: String,
    pub attempted_at: Timestamp,
}

impl CreateIndexFailure {
    pub fn document_id(&self) -> String {
        self.entity.document_id()
    }
}
