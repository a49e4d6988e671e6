//! Tag models shared by the container tag table and the resource tag table.
//!
//! Both tables have the same shape but separate `value` uniqueness domains.

use serde::{Deserialize, Serialize};
use cms_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Entity structs
// ---------------------------------------------------------------------------

/// A row from either the `tags` or the `resource_tags` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub id: DbId,
    #[serde(rename = "type")]
    pub tag_type: String,
    pub origin: String,
    pub label: String,
    pub value: String,
    pub data: Option<serde_json::Value>,
    pub created_date: Timestamp,
    pub updated_date: Timestamp,
}

/// Which tag table a row lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagTable {
    /// Tags on containers and relationships.
    Content,
    /// Tags on resources.
    Resource,
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// DTO for creating a tag. `origin` defaults to `"system"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTag {
    pub value: String,
    #[serde(rename = "type", default)]
    pub tag_type: String,
    pub origin: Option<String>,
    #[serde(default)]
    pub label: String,
    pub data: Option<serde_json::Value>,
}

impl CreateTag {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, tag_type: impl Into<String>) -> Self {
        self.tag_type = tag_type.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// DTO for updating a tag. All fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTag {
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub tag_type: Option<String>,
    pub origin: Option<String>,
    pub label: Option<String>,
    pub data: Option<serde_json::Value>,
}
