//! Change detection and index event infrastructure.
//!
//! - [`ChangeDetector`] is the mutation observer that works out which
//!   search documents a store write made stale.
//! - [`EventBus`] fans [`IndexEvent`]s out to any number of subscribers.
//! - [`FailurePersistence`] is the background task that records failed
//!   index writes in the `index_failures` table.

pub mod bus;
pub mod detector;
pub mod persistence;

pub use bus::{EventBus, IndexEvent, IndexOperation};
pub use detector::ChangeDetector;
pub use persistence::FailurePersistence;
