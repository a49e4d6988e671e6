//! Resource models: media assets attached to an owning entity.

use cms_core::entity::EntityRef;
use cms_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// A row from the `resources` table.
///
/// `owner` is the polymorphic `(kind, id)` attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub id: DbId,
    pub type_id: Option<DbId>,
    pub owner: EntityRef,
    pub uri: String,
    pub status: String,
    pub origin: String,
    pub data: Option<serde_json::Value>,
    pub created_date: Timestamp,
    pub published_date: Option<Timestamp>,
    pub updated_date: Timestamp,
    pub expiration_date: Option<Timestamp>,
}

/// DTO for creating a resource.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateResource {
    pub owner: EntityRef,
    pub type_id: Option<DbId>,
    pub uri: String,
    pub status: Option<String>,
    pub origin: Option<String>,
    pub data: Option<serde_json::Value>,
    pub published_date: Option<Timestamp>,
    pub expiration_date: Option<Timestamp>,
    /// Resource tag values; unknown values are skipped.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateResource {
    pub fn new(owner: EntityRef, uri: impl Into<String>) -> Self {
        Self {
            owner,
            type_id: None,
            uri: uri.into(),
            status: None,
            origin: None,
            data: None,
            published_date: None,
            expiration_date: None,
            tags: Vec::new(),
        }
    }
}

/// DTO for updating a resource. `origin` may only be restated, never changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateResource {
    pub type_id: Option<DbId>,
    pub uri: Option<String>,
    pub status: Option<String>,
    pub origin: Option<String>,
    pub data: Option<serde_json::Value>,
    pub published_date: Option<Timestamp>,
    pub expiration_date: Option<Timestamp>,
    /// Replaces the tag set when present.
    pub tags: Option<Vec<String>>,
}
