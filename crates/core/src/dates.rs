//! Date normalization and catalog availability helpers.
//!
//! Free-form date strings arrive inside container and resource payloads.
//! Everything here turns them into UTC instants, treating the sentinel epoch
//! date (`1970-01-01...`) as "unset".

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Prefix of any value that means "no date".
pub const EPOCH_SENTINEL_PREFIX: &str = "1970-01-01";

/// Default used when a catalog date cannot be parsed.
pub const DEFAULT_CATALOG_DATE: &str = "1970-01-01T00:00:00+00:00";

/// Timezone catalog availability is evaluated in.
pub const REFERENCE_TZ: Tz = chrono_tz::America::Toronto;

/// Offset-carrying formats tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

/// Naive formats, interpreted in the caller-supplied timezone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Returns `true` if `text` is the sentinel epoch date.
pub fn is_epoch_sentinel(text: &str) -> bool {
    text.trim_start().starts_with(EPOCH_SENTINEL_PREFIX)
}

/// The sentinel epoch as an instant.
pub fn epoch() -> Timestamp {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Parse free-form date text into a UTC instant.
///
/// Text without an offset is interpreted in `assume_tz`. Date-only text is
/// taken as midnight. Returns [`CoreError::Validation`] when nothing matches
/// or the local time does not exist in `assume_tz`.
pub fn parse_instant(text: &str, assume_tz: Tz) -> Result<Timestamp, CoreError> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| CoreError::Validation(format!("Unparseable date: '{text}'")))?;

    assume_tz
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "Date '{text}' does not exist in timezone {}",
                assume_tz.name()
            ))
        })
}

/// Parse catalog date text, falling back to the sentinel epoch on failure.
///
/// Naive values are read as UTC.
pub fn parse_catalog_date(text: &str) -> Timestamp {
    match parse_instant(text, chrono_tz::UTC) {
        Ok(ts) => ts,
        Err(e) => {
            tracing::debug!(error = %e, "Catalog date unparseable, using epoch default");
            epoch()
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog helpers
// ---------------------------------------------------------------------------

/// Whether an item with the given expiration text is available at `now`.
///
/// The sentinel epoch, and anything unparseable, means "never expires".
/// `now` is truncated to whole seconds before comparing.
pub fn is_available(expiration_text: &str, now: Timestamp) -> bool {
    let expiration = parse_catalog_date(expiration_text);
    if expiration == epoch() {
        return true;
    }
    let now = now.with_nanosecond(0).unwrap_or(now);
    now <= expiration
}

/// Format an instant the way catalog feeds expect, in [`REFERENCE_TZ`].
pub fn format_catalog_instant(ts: Timestamp) -> String {
    ts.with_timezone(&REFERENCE_TZ)
        .format("%Y-%m-%dT%H:%M:%S%:z")
        .to_string()
}

/// Build a W3C-DTF validity period (`start=...; end=...; scheme=W3C-DTF`).
///
/// The `end` term is omitted when the expiration is the sentinel epoch.
pub fn valid_date_terms(available_text: &str, expiration_text: &str) -> String {
    let start = format_catalog_instant(parse_catalog_date(available_text));
    let expiration = parse_catalog_date(expiration_text);
    if expiration == epoch() {
        format!("start={start}; scheme=W3C-DTF")
    } else {
        format!(
            "start={start}; end={}; scheme=W3C-DTF",
            format_catalog_instant(expiration)
        )
    }
}

/// Convert `h:m:s` text to a whole number of seconds.
///
/// Non-numeric components are ignored; overflow yields `"0"`.
pub fn time_in_seconds(text: &str) -> String {
    let mut total: u64 = 0;
    for (i, item) in text.split(':').enumerate() {
        if item.is_empty() || !item.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let Ok(value) = item.parse::<u64>() else {
            return "0".to_string();
        };
        let scaled = match i {
            0 => value.checked_mul(3600),
            1 => value.checked_mul(60),
            _ => Some(value),
        };
        let next = match (i, scaled) {
            (0, Some(v)) => Some(v),
            (_, Some(v)) => total.checked_add(v),
            (_, None) => None,
        };
        match next {
            Some(v) => total = v,
            None => return "0".to_string(),
        }
    }
    total.to_string()
}

/// Convert a comma-separated list of `h:m:s` cue points to seconds,
/// always led by a `0` cue point.
pub fn cuepoints(text: &str) -> String {
    let mut out = String::from("0");
    for item in text.trim().split(',') {
        out.push(',');
        out.push_str(&time_in_seconds(item));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
