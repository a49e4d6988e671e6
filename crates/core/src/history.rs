//! Version history types and snapshot diffing.
//!
//! Containers and resources keep an immutable history record per save. A
//! delta between two records is a per-field comparison of their JSON
//! snapshots, ignoring audit-only fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Fields that never participate in history diffs.
pub const EXCLUDED_HISTORY_FIELDS: &[&str] = &["updated_date"];

/// Shown for history records with no acting user.
pub const SYSTEM_USER: &str = "System";

// ---------------------------------------------------------------------------
// HistoryType
// ---------------------------------------------------------------------------

/// What kind of write produced a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryType {
    Created,
    Changed,
    Deleted,
}

impl HistoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Changed => "changed",
            Self::Deleted => "deleted",
        }
    }

    /// Single-character marker used in compact audit output.
    pub fn symbol(&self) -> char {
        match self {
            Self::Created => '+',
            Self::Changed => '~',
            Self::Deleted => '-',
        }
    }

    pub fn from_symbol(c: char) -> Result<Self, CoreError> {
        match c {
            '+' => Ok(Self::Created),
            '~' => Ok(Self::Changed),
            '-' => Ok(Self::Deleted),
            _ => Err(CoreError::Validation(format!(
                "Invalid history type marker: '{c}'. Must be one of: +, ~, -"
            ))),
        }
    }
}

impl std::fmt::Display for HistoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display name for a history record's acting user.
pub fn display_user(user: Option<&str>) -> &str {
    match user {
        Some(u) if !u.is_empty() => u,
        _ => SYSTEM_USER,
    }
}

// ---------------------------------------------------------------------------
// Diffing
// ---------------------------------------------------------------------------

/// The status of a field in a snapshot comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffStatus {
    Added,
    Removed,
    Changed,
}

impl DiffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Changed => "changed",
        }
    }
}

/// One differing field between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub status: DiffStatus,
    pub old: Value,
    pub new: Value,
}

/// Compare two object snapshots key by key.
///
/// Keys are reported in sorted order. Non-object snapshots are compared as
/// a whole under the empty field name.
pub fn diff_snapshots(old: &Value, new: &Value) -> Vec<FieldChange> {
    let (Some(old_map), Some(new_map)) = (old.as_object(), new.as_object()) else {
        if old == new {
            return Vec::new();
        }
        return vec![FieldChange {
            field: String::new(),
            status: DiffStatus::Changed,
            old: old.clone(),
            new: new.clone(),
        }];
    };

    let mut keys: Vec<&String> = old_map.keys().chain(new_map.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|k| !EXCLUDED_HISTORY_FIELDS.contains(&k.as_str()))
        .filter_map(|k| {
            let (status, o, n) = match (old_map.get(k), new_map.get(k)) {
                (Some(o), Some(n)) if o == n => return None,
                (Some(o), Some(n)) => (DiffStatus::Changed, o.clone(), n.clone()),
                (None, Some(n)) => (DiffStatus::Added, Value::Null, n.clone()),
                (Some(o), None) => (DiffStatus::Removed, o.clone(), Value::Null),
                (None, None) => return None,
            };
            Some(FieldChange {
                field: k.clone(),
                status,
                old: o,
                new: n,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_type_strings_and_symbols() {
        assert_eq!(HistoryType::Created.as_str(), "created");
        assert_eq!(HistoryType::Changed.symbol(), '~');
        assert_eq!(HistoryType::from_symbol('-').unwrap(), HistoryType::Deleted);
        assert!(HistoryType::from_symbol('?').is_err());
    }

    #[test]
    fn missing_user_is_system() {
        assert_eq!(display_user(None), "System");
        assert_eq!(display_user(Some("")), "System");
        assert_eq!(display_user(Some("editor@example.com")), "editor@example.com");
    }

    #[test]
    fn diff_reports_changed_added_and_removed() {
        let old = json!({"status": "new", "uri": "a", "gone": 1});
        let new = json!({"status": "published", "uri": "a", "fresh": true});
        let changes = diff_snapshots(&old, &new);

        let fields: Vec<(&str, DiffStatus)> = changes
            .iter()
            .map(|c| (c.field.as_str(), c.status))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("fresh", DiffStatus::Added),
                ("gone", DiffStatus::Removed),
                ("status", DiffStatus::Changed),
            ]
        );
        assert_eq!(changes[2].old, json!("new"));
        assert_eq!(changes[2].new, json!("published"));
    }

    #[test]
    fn updated_date_is_never_diffed() {
        let old = json!({"updated_date": "2020-01-01", "status": "new"});
        let new = json!({"updated_date": "2021-01-01", "status": "new"});
        assert!(diff_snapshots(&old, &new).is_empty());
    }

    #[test]
    fn non_object_snapshots_compare_whole() {
        assert!(diff_snapshots(&json!(1), &json!(1)).is_empty());
        assert_eq!(diff_snapshots(&json!(1), &json!(2)).len(), 1);
    }
}
