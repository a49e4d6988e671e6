//! Advisory lock tokens on containers.
//!
//! The store never enforces `hard_lock_id` / `soft_lock_id`. Callers that
//! make structural edits check their token here first.

use crate::error::CoreError;

/// Outcome of checking a caller's token against a container's locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCheck {
    /// No lock is held.
    Free,
    /// The caller holds the hard lock (or the only soft lock).
    HeldByCaller,
    /// Someone else holds a soft lock. Editing is allowed but contended.
    SoftHeldByOther,
}

/// Check `token` against a container's advisory lock fields.
///
/// A hard lock held by another token is a [`CoreError::Conflict`].
pub fn check_advisory_lock(
    hard_lock_id: Option<&str>,
    soft_lock_id: Option<&str>,
    token: Option<&str>,
) -> Result<LockCheck, CoreError> {
    if let Some(hard) = hard_lock_id {
        return if token == Some(hard) {
            Ok(LockCheck::HeldByCaller)
        } else {
            Err(CoreError::Conflict(format!(
                "Container is hard-locked by '{hard}'"
            )))
        };
    }
    match soft_lock_id {
        None => Ok(LockCheck::Free),
        Some(soft) if token == Some(soft) => Ok(LockCheck::HeldByCaller),
        Some(_) => Ok(LockCheck::SoftHeldByOther),
    }
}
