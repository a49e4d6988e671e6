//! Domain logic for the content graph: identifiers, errors, entity
//! references, the pending dirty set, date normalization, reference-date
//! resolution, history diffing and propagation configuration.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! store, the change detector and the index synchronizer alike.

pub mod dates;
pub mod entity;
pub mod error;
pub mod history;
pub mod locks;
pub mod pending;
pub mod propagation;
pub mod reference;
pub mod time_code;
pub mod types;
