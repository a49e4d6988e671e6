//! Version history records for containers and resources.

use cms_core::history::{diff_snapshots, display_user, FieldChange, HistoryType};
use cms_core::types::{DbId, Timestamp};
use serde::Serialize;

/// One immutable history record: who did what, when, and the row as it was.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRecord {
    pub history_id: DbId,
    pub entity_id: DbId,
    pub history_date: Timestamp,
    pub history_type: HistoryType,
    pub history_user: Option<String>,
    pub history_change_reason: Option<String>,
    pub snapshot: serde_json::Value,
}

impl HistoryRecord {
    /// Acting user for display, `"System"` when absent.
    pub fn user_display(&self) -> &str {
        display_user(self.history_user.as_deref())
    }

    /// Change reason for display, empty when absent.
    pub fn change_reason_display(&self) -> &str {
        self.history_change_reason.as_deref().unwrap_or("")
    }
}

/// Field-level delta between two history records of the same entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryDelta {
    pub old_history_id: DbId,
    pub old_history_date: Timestamp,
    pub new_history_id: DbId,
    pub new_history_date: Timestamp,
    pub changes: Vec<FieldChange>,
}

impl HistoryDelta {
    pub fn between(old: &HistoryRecord, new: &HistoryRecord) -> Self {
        Self {
            old_history_id: old.history_id,
            old_history_date: old.history_date,
            new_history_id: new.history_id,
            new_history_date: new.history_date,
            changes: diff_snapshots(&old.snapshot, &new.snapshot),
        }
    }
}
