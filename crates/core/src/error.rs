use crate::types::DbId;

/// Errors raised by content graph writes and the helpers around them.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The referenced row does not exist. At flush time this means the
    /// document should be absent from the index.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Input breaks a write rule; nothing was applied.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A unique key is taken, a protected row is still referenced, or an
    /// advisory lock is held by someone else.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A field that may not change after it is set, or once the row is in
    /// use, was given a new value.
    #[error("{entity} {id}: {field} is immutable ({reason})")]
    Immutable {
        entity: &'static str,
        id: DbId,
        field: &'static str,
        reason: String,
    },

    /// A row could not be captured as a history snapshot.
    #[error("History snapshot failed: {0}")]
    Snapshot(#[from] serde_json::Error),
}
