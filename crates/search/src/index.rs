//! The search index seam.

use async_trait::async_trait;
use cms_core::entity::EntityRef;
use serde::Serialize;

/// A document as written to the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDocument {
    /// `"<kind>.<id>"`, see [`EntityRef::document_id`].
    pub id: String,
    pub entity: EntityRef,
    pub body: serde_json::Value,
}

impl IndexDocument {
    pub fn new(entity: EntityRef, body: serde_json::Value) -> Self {
        Self {
            id: entity.document_id(),
            entity,
            body,
        }
    }
}

/// A rejected index write.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IndexError {
    /// The index could not be reached.
    #[error("Search index unavailable: {0}")]
    Unavailable(String),

    /// The index refused this particular document.
    #[error("Document {doc_id} rejected: {reason}")]
    Rejected { doc_id: String, reason: String },
}

/// A search index accepting whole-document writes.
///
/// Both operations must be idempotent: upserting the same document twice or
/// deleting an absent one succeeds.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    async fn upsert(&self, document: IndexDocument) -> Result<(), IndexError>;

    async fn delete(&self, doc_id: &str) -> Result<(), IndexError>;
}
