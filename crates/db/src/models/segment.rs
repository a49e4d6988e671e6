//! Timeline segments within a parent container.

use cms_core::time_code::TimeCode;
use cms_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// A row from the `segments` table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub id: DbId,
    pub parent_id: DbId,
    pub guid: String,
    #[serde(rename = "type")]
    pub segment_type: String,
    pub namespace: String,
    pub status: String,
    pub origin: String,
    pub label: String,
    pub value: String,
    pub data: serde_json::Value,
    pub start_time_code: TimeCode,
    pub end_time_code: TimeCode,
    pub created_date: Timestamp,
    pub updated_date: Timestamp,
    pub published_date: Option<Timestamp>,
    pub expiration_date: Option<Timestamp>,
}

/// DTO for creating a segment. `guid` defaults to a random UUID.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSegment {
    pub parent_id: DbId,
    pub guid: Option<String>,
    #[serde(rename = "type")]
    pub segment_type: String,
    #[serde(default)]
    pub namespace: String,
    pub status: Option<String>,
    pub origin: Option<String>,
    pub label: String,
    pub value: String,
    pub data: Option<serde_json::Value>,
    pub start_time_code: TimeCode,
    pub end_time_code: TimeCode,
    pub published_date: Option<Timestamp>,
    pub expiration_date: Option<Timestamp>,
}

impl CreateSegment {
    pub fn new(
        parent_id: DbId,
        segment_type: impl Into<String>,
        start_time_code: TimeCode,
        end_time_code: TimeCode,
    ) -> Self {
        Self {
            parent_id,
            guid: None,
            segment_type: segment_type.into(),
            namespace: String::new(),
            status: None,
            origin: None,
            label: String::new(),
            value: String::new(),
            data: None,
            start_time_code,
            end_time_code,
            published_date: None,
            expiration_date: None,
        }
    }
}

/// DTO for updating a segment. The parent cannot change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSegment {
    #[serde(rename = "type")]
    pub segment_type: Option<String>,
    pub namespace: Option<String>,
    pub status: Option<String>,
    pub label: Option<String>,
    pub value: Option<String>,
    pub data: Option<serde_json::Value>,
    pub start_time_code: Option<TimeCode>,
    pub end_time_code: Option<TimeCode>,
    pub published_date: Option<Timestamp>,
    pub expiration_date: Option<Timestamp>,
}
