//! Search index propagation.
//!
//! - [`index`] defines the [`SearchIndex`] seam and its document type;
//!   [`memory`] is an in-process backend.
//! - [`document`] turns a stored entity into its index document.
//! - [`synchronizer`] plans and applies index writes for a dirty set.
//! - [`propagator`] ties a store, a synchronizer and the configured mode
//!   together into sessions and request scopes.

pub mod document;
pub mod index;
pub mod memory;
pub mod propagator;
pub mod synchronizer;

pub use index::{IndexDocument, IndexError, SearchIndex};
pub use memory::{IndexWrite, MemoryIndex};
pub use propagator::{Propagator, RequestScope, Session};
pub use synchronizer::{FailedWrite, IndexOp, IndexSynchronizer, PropagationError, SyncReport};
