//! The content graph store.
//!
//! [`GraphStore`] publishes committed state as an immutable [`Snapshot`].
//! Readers clone the current snapshot and never wait for writers. Writers
//! open a [`UnitOfWork`], one at a time; it mutates a private copy of the
//! latest snapshot and swaps it in on [`commit`](UnitOfWork::commit).
//! Dropping a unit-of-work without committing discards the copy, its
//! pending dirty set and its post-commit hooks.

mod containers;
mod entity_types;
mod relationships;
mod resources;
mod segments;
mod tables;
mod tags;
mod unit_of_work;

use std::sync::Arc;

use cms_core::entity::EntityRef;
use cms_core::error::CoreError;
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::attachment::AttachmentRegistry;
use crate::signals::SignalDispatcher;

pub use tables::Tables;
pub use unit_of_work::{CommitHook, Savepoint, UnitOfWork};

/// Committed state as of one commit. Holding it blocks nobody.
pub type Snapshot = Arc<Tables>;

/// Shared handle to one content graph.
#[derive(Clone)]
pub struct GraphStore {
    committed: Arc<RwLock<Snapshot>>,
    /// Held by the open unit-of-work.
    writer: Arc<Mutex<()>>,
    signals: Arc<SignalDispatcher>,
    attachments: Arc<AttachmentRegistry>,
}

impl GraphStore {
    /// An empty store with no observers.
    pub fn new() -> Self {
        Self::with_signals(SignalDispatcher::new())
    }

    /// An empty store notifying `signals` on every mutation.
    pub fn with_signals(signals: SignalDispatcher) -> Self {
        Self {
            committed: Arc::new(RwLock::new(Arc::new(Tables::default()))),
            writer: Arc::new(Mutex::new(())),
            signals: Arc::new(signals),
            attachments: Arc::new(AttachmentRegistry::default()),
        }
    }

    /// Replace the resource owner registry.
    pub fn with_attachments(mut self, attachments: AttachmentRegistry) -> Self {
        self.attachments = Arc::new(attachments);
        self
    }

    pub fn attachments(&self) -> &AttachmentRegistry {
        &self.attachments
    }

    /// Open a unit-of-work. Waits for any other open unit to finish;
    /// readers are never blocked.
    pub async fn begin(&self) -> UnitOfWork {
        let writer = Arc::clone(&self.writer).lock_owned().await;
        UnitOfWork::new(
            writer,
            Arc::clone(&self.committed),
            Arc::clone(&self.signals),
            Arc::clone(&self.attachments),
        )
    }

    /// The latest committed snapshot.
    pub fn read(&self) -> Snapshot {
        Arc::clone(&self.committed.read())
    }

    /// Run `f` in a fresh unit-of-work, committing on `Ok` and rolling back
    /// on `Err`. Returns the value and the dirty entities of the commit.
    pub async fn transaction<T, F>(&self, f: F) -> Result<(T, Vec<EntityRef>), CoreError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, CoreError>,
    {
        let mut uow = self.begin().await;
        match f(&mut uow) {
            Ok(value) => Ok((value, uow.commit())),
            Err(e) => {
                uow.rollback();
                Err(e)
            }
        }
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("signals", &self.signals)
            .finish_non_exhaustive()
    }
}
