//! Container models: the central nodes of the content graph.

use cms_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entity structs
// ---------------------------------------------------------------------------

/// A row from the `containers` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    pub id: DbId,
    pub type_id: Option<DbId>,
    pub guid: String,
    pub status: String,
    pub origin: String,
    pub data: Option<serde_json::Value>,
    pub is_enabled: bool,
    pub hard_lock_id: Option<String>,
    pub soft_lock_id: Option<String>,
    pub created_date: Timestamp,
    pub published_date: Option<Timestamp>,
    pub updated_date: Timestamp,
    pub expiration_date: Option<Timestamp>,
    /// Precomputed on every save from `data` and the date columns.
    pub reference_date: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// DTO for creating a container.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateContainer {
    pub guid: String,
    pub type_id: Option<DbId>,
    pub status: Option<String>,
    pub origin: Option<String>,
    pub data: Option<serde_json::Value>,
    pub is_enabled: Option<bool>,
    pub published_date: Option<Timestamp>,
    pub expiration_date: Option<Timestamp>,
    /// Tag values; unknown values are skipped.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateContainer {
    pub fn new(guid: impl Into<String>, type_id: Option<DbId>) -> Self {
        Self {
            guid: guid.into(),
            type_id,
            ..Default::default()
        }
    }
}

/// DTO for updating a container. All fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateContainer {
    pub type_id: Option<DbId>,
    pub guid: Option<String>,
    pub status: Option<String>,
    pub origin: Option<String>,
    pub data: Option<serde_json::Value>,
    pub is_enabled: Option<bool>,
    pub published_date: Option<Timestamp>,
    pub expiration_date: Option<Timestamp>,
    /// Replaces the tag set when present.
    pub tags: Option<Vec<String>>,
}

/// DTO for setting or clearing advisory locks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerLocks {
    pub hard_lock_id: Option<String>,
    pub soft_lock_id: Option<String>,
}
