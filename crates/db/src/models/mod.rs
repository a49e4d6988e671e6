//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `Serialize` entity struct matching a store row
//! - A `Deserialize` create DTO for inserts
//! - A `Deserialize` update DTO (all `Option` fields) for patches
//!
//! [`index_failure`] is the exception: it maps a Postgres row via `FromRow`.

pub mod container;
pub mod entity_type;
pub mod history;
pub mod index_failure;
pub mod relationship;
pub mod resource;
pub mod segment;
pub mod tag;

/// Default `origin` for every originated row.
pub const DEFAULT_ORIGIN: &str = "system";

/// Default `status` for containers and segments.
pub const DEFAULT_STATUS: &str = "new";

/// Status that makes a resource visible in rollups.
pub const PUBLISHED_STATUS: &str = "published";

/// Maximum length of ordinary text columns.
pub const MAX_TEXT_LEN: usize = 256;

/// Maximum length of a resource `uri`.
pub const MAX_URI_LEN: usize = 2048;
