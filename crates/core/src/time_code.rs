//! Fixed-point segment time codes.
//!
//! Stored as an integer count of 1/100000 seconds: five decimal places and
//! at most fifteen digits in total, matching the segment range columns.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Decimal places kept after the point.
pub const TIME_CODE_SCALE: u32 = 5;

/// Maximum total digits.
pub const TIME_CODE_DIGITS: u32 = 15;

const UNITS_PER_SECOND: i64 = 10i64.pow(TIME_CODE_SCALE);
const MAX_UNITS: i64 = 10i64.pow(TIME_CODE_DIGITS) - 1;

/// A point on a container's timeline, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeCode(i64);

impl TimeCode {
    pub const ZERO: TimeCode = TimeCode(0);

    /// Build from raw 1/100000-second units.
    pub fn from_units(units: i64) -> Result<Self, CoreError> {
        if units.abs() > MAX_UNITS {
            return Err(CoreError::Validation(format!(
                "Time code exceeds {TIME_CODE_DIGITS} digits"
            )));
        }
        Ok(Self(units))
    }

    pub fn from_seconds(seconds: i64) -> Result<Self, CoreError> {
        seconds
            .checked_mul(UNITS_PER_SECOND)
            .ok_or_else(|| CoreError::Validation("Time code out of range".to_string()))
            .and_then(Self::from_units)
    }

    pub fn units(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / UNITS_PER_SECOND as f64
    }
}

impl FromStr for TimeCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::Validation(format!("Invalid time code: '{s}'"));
        let text = s.trim();
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac.len() > TIME_CODE_SCALE as usize {
            return Err(CoreError::Validation(format!(
                "Time code '{s}' has more than {TIME_CODE_SCALE} decimal places"
            )));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut frac_units: i64 = if frac.is_empty() {
            0
        } else {
            frac.parse().map_err(|_| invalid())?
        };
        for _ in frac.len()..TIME_CODE_SCALE as usize {
            frac_units *= 10;
        }

        let units = whole
            .checked_mul(UNITS_PER_SECOND)
            .and_then(|w| w.checked_add(frac_units))
            .ok_or_else(invalid)?;
        Self::from_units(if negative { -units } else { units })
    }
}

impl std::fmt::Display for TimeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = UNITS_PER_SECOND as u64;
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / per,
            abs % per,
            width = TIME_CODE_SCALE as usize
        )
    }
}

impl Serialize for TimeCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TimeCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
