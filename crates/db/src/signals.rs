//! Mutation signals.
//!
//! Every write a [`UnitOfWork`](crate::store::UnitOfWork) performs is
//! announced to the observers registered on the store. Observers see the
//! in-transaction table state and answer with the entities the mutation
//! made dirty; the unit-of-work collects those into its pending set.

use std::sync::Arc;

use cms_core::entity::EntityRef;

use crate::store::Tables;

// ---------------------------------------------------------------------------
// MutationEvent
// ---------------------------------------------------------------------------

/// A single store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationEvent {
    /// A row was inserted (`created`) or updated. Emitted after the write.
    Saved { entity: EntityRef, created: bool },
    /// A row is about to be removed. Emitted while it is still readable.
    PreDeleted { entity: EntityRef },
    /// A many-to-many relation of `entity` was replaced. Emitted after the
    /// write.
    M2mChanged {
        entity: EntityRef,
        relation: &'static str,
    },
}

impl MutationEvent {
    pub fn entity(&self) -> EntityRef {
        match self {
            Self::Saved { entity, .. }
            | Self::PreDeleted { entity }
            | Self::M2mChanged { entity, .. } => *entity,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Saved { .. } => "saved",
            Self::PreDeleted { .. } => "pre_deleted",
            Self::M2mChanged { .. } => "m2m_changed",
        }
    }
}

/// Relation names carried by [`MutationEvent::M2mChanged`].
pub mod relations {
    pub const CONTAINER_TAGS: &str = "container.tags";
    pub const RELATIONSHIP_TAGS: &str = "container_relationship.tags";
    pub const RESOURCE_TAGS: &str = "resource.tags";
}

// ---------------------------------------------------------------------------
// MutationObserver
// ---------------------------------------------------------------------------

/// Receives every mutation and reports the entities it dirtied.
///
/// Implementations must not write to the store.
pub trait MutationObserver: Send + Sync {
    fn observe(&self, tables: &Tables, event: &MutationEvent) -> Vec<EntityRef>;
}

/// Closures work as observers, which keeps tests short.
impl<F> MutationObserver for F
where
    F: Fn(&Tables, &MutationEvent) -> Vec<EntityRef> + Send + Sync,
{
    fn observe(&self, tables: &Tables, event: &MutationEvent) -> Vec<EntityRef> {
        self(tables, event)
    }
}

// ---------------------------------------------------------------------------
// SignalDispatcher
// ---------------------------------------------------------------------------

/// The observer list attached to a store, fixed at construction.
#[derive(Clone, Default)]
pub struct SignalDispatcher {
    observers: Vec<Arc<dyn MutationObserver>>,
}

impl SignalDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn MutationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Notify every observer in registration order and concatenate their
    /// answers.
    pub fn dispatch(&self, tables: &Tables, event: &MutationEvent) -> Vec<EntityRef> {
        let dirty: Vec<EntityRef> = self
            .observers
            .iter()
            .flat_map(|o| o.observe(tables, event))
            .collect();
        tracing::trace!(
            signal = event.name(),
            entity = %event.entity(),
            dirty = dirty.len(),
            "Mutation dispatched"
        );
        dirty
    }
}

impl std::fmt::Debug for SignalDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalDispatcher")
            .field("observers", &self.observers.len())
            .finish()
    }
}
