//! The pending dirty set owned by a unit-of-work.
//!
//! Entries are kept in first-enqueue order and collapse by identity, so
//! enqueuing the same entity many times yields a single flush item.

use indexmap::IndexSet;

use crate::entity::EntityRef;

/// Insertion-ordered, identity-deduplicated set of dirty entities.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    entries: IndexSet<EntityRef>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity. Returns `true` if it was not already pending.
    pub fn enqueue(&mut self, entity: EntityRef) -> bool {
        self.entries.insert(entity)
    }

    /// Add every entity from `entities`, returning how many were new.
    pub fn enqueue_all(&mut self, entities: impl IntoIterator<Item = EntityRef>) -> usize {
        entities
            .into_iter()
            .filter(|e| self.entries.insert(*e))
            .count()
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.entries.contains(entity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityRef> {
        self.entries.iter()
    }

    /// Take every pending entity, leaving the set empty.
    pub fn drain(&mut self) -> Vec<EntityRef> {
        self.entries.drain(..).collect()
    }

    /// Drop everything without returning it (rollback).
    pub fn discard(&mut self) {
        self.entries.clear();
    }
}

impl Extend<EntityRef> for PendingSet {
    fn extend<T: IntoIterator<Item = EntityRef>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

impl FromIterator<EntityRef> for PendingSet {
    fn from_iter<T: IntoIterator<Item = EntityRef>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
