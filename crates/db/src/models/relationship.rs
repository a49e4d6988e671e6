//! Directed, ordered container-to-container edges.

use cms_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// A row from the `container_relationships` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerRelationship {
    pub id: DbId,
    pub from_id: DbId,
    pub to_id: DbId,
    pub order: i32,
    pub created_date: Timestamp,
}

/// DTO for creating an edge.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRelationship {
    pub from_id: DbId,
    pub to_id: DbId,
    #[serde(default)]
    pub order: i32,
    /// Tag values; unknown values are skipped.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateRelationship {
    pub fn new(from_id: DbId, to_id: DbId, order: i32) -> Self {
        Self {
            from_id,
            to_id,
            order,
            tags: Vec::new(),
        }
    }

    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// One entry of a bulk reorder request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct EdgeOrder {
    pub relationship_id: DbId,
    pub order: i32,
}
