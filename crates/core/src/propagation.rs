//! Propagation configuration: mode, index failure policy and the excluded
//! relationship target types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Target container types excluded from edge propagation in legacy mode.
///
/// These types sit behind very high fan-out relationships, where refreshing
/// the target on every edge write causes reindex storms.
pub const LEGACY_EXCLUDED_TYPES: &[&str] = &["platform", "network", "channel"];

// ---------------------------------------------------------------------------
// PropagationMode
// ---------------------------------------------------------------------------

/// When dirty entities reach the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// Push each mutation's updates as it happens; deletions wait for commit.
    Immediate,
    /// Collect for the whole unit-of-work and flush once after commit.
    #[default]
    Batched,
}

impl PropagationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Batched => "batched",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "immediate" => Ok(Self::Immediate),
            "batched" => Ok(Self::Batched),
            _ => Err(CoreError::Validation(format!(
                "Invalid propagation mode: '{s}'. Must be one of: immediate, batched"
            ))),
        }
    }
}

impl std::fmt::Display for PropagationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FailurePolicy
// ---------------------------------------------------------------------------

/// What a flush does when the index rejects a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Attempt the whole batch, then surface every failure to the caller.
    #[default]
    ExactlyOnce,
    /// Log failures and report success.
    BestEffort,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactlyOnce => "exactly_once",
            Self::BestEffort => "best_effort",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        match s {
            "exactly_once" => Ok(Self::ExactlyOnce),
            "best_effort" => Ok(Self::BestEffort),
            _ => Err(CoreError::Validation(format!(
                "Invalid failure policy: '{s}'. Must be one of: exactly_once, best_effort"
            ))),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExclusionPolicy
// ---------------------------------------------------------------------------

/// Container type names whose inbound edges do not propagate to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionPolicy {
    excluded_types: BTreeSet<String>,
}

impl ExclusionPolicy {
    /// No exclusions.
    pub fn none() -> Self {
        Self::default()
    }

    /// The fixed legacy set, see [`LEGACY_EXCLUDED_TYPES`].
    pub fn legacy() -> Self {
        Self::with_types(LEGACY_EXCLUDED_TYPES.iter().copied())
    }

    pub fn with_types<S: Into<String>>(types: impl IntoIterator<Item = S>) -> Self {
        Self {
            excluded_types: types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_excluded(&self, type_name: &str) -> bool {
        self.excluded_types.contains(type_name)
    }

    pub fn is_empty(&self) -> bool {
        self.excluded_types.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.excluded_types.iter().map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// PropagationConfig
// ---------------------------------------------------------------------------

/// Complete propagation configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationConfig {
    pub mode: PropagationMode,
    pub failure_policy: FailurePolicy,
    pub exclusions: ExclusionPolicy,
}

impl PropagationConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default        |
    /// |----------------------------|----------------|
    /// | `CMS_PROPAGATION_MODE`     | `batched`      |
    /// | `CMS_INDEX_FAILURE_POLICY` | `exactly_once` |
    /// | `CMS_EXCLUDED_TYPES`       | (empty)        |
    /// | `CMS_LEGACY_EXCLUSIONS`    | `false`        |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let mode = match lookup("CMS_PROPAGATION_MODE") {
            Some(v) => PropagationMode::from_str(v.trim())?,
            None => PropagationMode::default(),
        };

        let failure_policy = match lookup("CMS_INDEX_FAILURE_POLICY") {
            Some(v) => FailurePolicy::from_str(v.trim())?,
            None => FailurePolicy::default(),
        };

        let legacy = match lookup("CMS_LEGACY_EXCLUSIONS") {
            Some(v) => parse_bool("CMS_LEGACY_EXCLUSIONS", &v)?,
            None => false,
        };

        let mut types: Vec<String> = lookup("CMS_EXCLUDED_TYPES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if legacy {
            types.extend(LEGACY_EXCLUDED_TYPES.iter().map(|s| s.to_string()));
        }

        Ok(Self {
            mode,
            failure_policy,
            exclusions: ExclusionPolicy::with_types(types),
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, CoreError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(CoreError::Validation(format!(
            "{key} must be a boolean, got '{other}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
