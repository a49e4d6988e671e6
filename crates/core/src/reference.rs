//! Reference and expiration date resolution for containers.
//!
//! Pure functions over a container's `data` payload and its date columns.
//! The store calls these on every container save to precompute
//! `reference_date` and `expiration_date`.

use serde_json::Value;

use crate::dates::{is_epoch_sentinel, parse_instant};
use crate::types::Timestamp;

/// Metadata keys consulted for the reference date, highest priority first.
pub const REFERENCE_DATE_KEYS: [&str; 3] = ["pub_date", "local_air_date", "available_date"];

/// Metadata key consulted for the expiration date.
pub const EXPIRATION_DATE_KEY: &str = "expiration_date";

/// The raw text of `key` when it counts as set: a non-empty, non-sentinel
/// string.
fn metadata_text<'a>(data: Option<&'a Value>, key: &str) -> Option<&'a str> {
    let raw = data?.get(key)?.as_str()?;
    if raw.trim().is_empty() || is_epoch_sentinel(raw) {
        return None;
    }
    Some(raw)
}

/// Read `key` from `data` as an instant.
///
/// Absent, non-string, empty and sentinel values are all "unset". A value
/// that fails to parse is also unset; it never aborts resolution.
pub fn metadata_date(data: Option<&Value>, key: &str) -> Option<Timestamp> {
    let raw = metadata_text(data, key)?;
    match parse_instant(raw, chrono_tz::UTC) {
        Ok(ts) => Some(ts),
        Err(e) => {
            tracing::debug!(key, error = %e, "Ignoring unparseable metadata date");
            None
        }
    }
}

/// Resolve the effective date of a container.
///
/// The first set key of `data.pub_date`, `data.local_air_date`,
/// `data.available_date` decides. If none is set, or the deciding value
/// does not parse, `published_date` is used, then `created_date`.
pub fn resolve_reference_date(
    data: Option<&Value>,
    published_date: Option<Timestamp>,
    created_date: Timestamp,
) -> Timestamp {
    REFERENCE_DATE_KEYS
        .iter()
        .find(|key| metadata_text(data, key).is_some())
        .and_then(|key| metadata_date(data, key))
        .or(published_date)
        .unwrap_or(created_date)
}

/// Resolve the expiration date of a container from `data.expiration_date`.
pub fn resolve_expiration_date(data: Option<&Value>) -> Option<Timestamp> {
    metadata_date(data, EXPIRATION_DATE_KEY)
}

/// Reference date for catalog output: the precomputed value when present,
/// otherwise resolved from the payload.
pub fn catalog_reference_date(
    precomputed: Option<Timestamp>,
    data: Option<&Value>,
    published_date: Option<Timestamp>,
    created_date: Timestamp,
) -> Timestamp {
    precomputed.unwrap_or_else(|| resolve_reference_date(data, published_date, created_date))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
