//! Entity type lookup rows (e.g. "show", "episode").

use serde::{Deserialize, Serialize};
use cms_core::types::{DbId, Timestamp};

/// A named classification referenced by containers and resources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityType {
    pub id: DbId,
    pub name: String,
    pub created_date: Timestamp,
}

/// DTO for creating an entity type.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateEntityType {
    pub name: String,
}

impl CreateEntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
