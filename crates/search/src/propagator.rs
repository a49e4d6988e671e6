//! Propagation of committed content changes to the search index.
//!
//! A [`Propagator`] owns a store wired with a [`ChangeDetector`] and an
//! [`IndexSynchronizer`]. Writes go through a [`Session`] (one
//! unit-of-work) or a [`RequestScope`] (several units flushed together).
//!
//! In batched mode nothing reaches the index before commit, and a rolled
//! back session writes nothing. In immediate mode each
//! [`Session::apply`] pushes its upserts at once and defers deletions to
//! commit; rolling back re-syncs everything already pushed against the
//! committed store. Failures of an immediate push are only published once
//! the commit-time retry has settled them.

use std::sync::Arc;

use cms_core::entity::EntityRef;
use cms_core::error::CoreError;
use cms_core::pending::PendingSet;
use cms_core::propagation::{PropagationConfig, PropagationMode};
use cms_db::repositories::IndexFailureRepo;
use cms_db::signals::SignalDispatcher;
use cms_db::{DbPool, GraphStore, Tables, UnitOfWork};
use cms_events::{ChangeDetector, EventBus};
use parking_lot::Mutex;

use crate::index::SearchIndex;
use crate::synchronizer::{IndexOp, IndexSynchronizer, PropagationError, SyncReport};

// ---------------------------------------------------------------------------
// Propagator
// ---------------------------------------------------------------------------

/// Store plus index plus the configured propagation mode.
#[derive(Debug, Clone)]
pub struct Propagator {
    store: GraphStore,
    synchronizer: Arc<IndexSynchronizer>,
    mode: PropagationMode,
}

impl Propagator {
    /// Use an existing store. It should carry a [`ChangeDetector`], or
    /// nothing is ever dirtied.
    pub fn new(store: GraphStore, synchronizer: IndexSynchronizer, mode: PropagationMode) -> Self {
        Self {
            store,
            synchronizer: Arc::new(synchronizer),
            mode,
        }
    }

    /// A fresh store and synchronizer set up from `config`.
    pub fn from_config(
        config: &PropagationConfig,
        index: Arc<dyn SearchIndex>,
        bus: Option<Arc<EventBus>>,
    ) -> Self {
        let detector = ChangeDetector::with_exclusions(config.exclusions.clone());
        let store =
            GraphStore::with_signals(SignalDispatcher::new().with_observer(Arc::new(detector)));
        let mut synchronizer = IndexSynchronizer::new(index, config.failure_policy);
        if let Some(bus) = bus {
            synchronizer = synchronizer.with_bus(bus);
        }
        tracing::info!(
            mode = %config.mode,
            failure_policy = %config.failure_policy,
            excluded_types = config.exclusions.types().count(),
            "Propagator configured"
        );
        Self::new(store, synchronizer, config.mode)
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn synchronizer(&self) -> &IndexSynchronizer {
        &self.synchronizer
    }

    pub fn mode(&self) -> PropagationMode {
        self.mode
    }

    /// Open a session. Waits for any other open unit-of-work on the store.
    pub async fn session(&self) -> Session<'_> {
        Session {
            propagator: self,
            uow: self.store.begin().await,
            pushed: PendingSet::new(),
            deferred: PendingSet::new(),
        }
    }

    /// Run `f` in its own session: commit and propagate on `Ok`, roll back
    /// on `Err`.
    pub async fn run<T, F>(&self, f: F) -> Result<T, PropagationError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, CoreError>,
    {
        let mut session = self.session().await;
        match session.apply(f).await {
            Ok(value) => {
                session.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(resync) = session.rollback().await {
                    tracing::error!(error = %resync, "Re-sync after rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Collect several units-of-work and flush them together at
    /// [`RequestScope::finish`].
    pub fn request_scope(&self) -> RequestScope<'_> {
        RequestScope {
            propagator: self,
            pending: Arc::new(Mutex::new(PendingSet::new())),
        }
    }

    /// Re-sync `refs` against committed state.
    pub async fn reconcile(&self, refs: &[EntityRef]) -> Result<SyncReport, PropagationError> {
        self.synchronizer.reconcile(&self.store, refs).await
    }

    /// Retry up to `limit` unresolved failures from the outbox, oldest
    /// first. Entities that sync now are marked resolved; the rest stay
    /// unresolved and are not recorded again.
    pub async fn reconcile_outbox(
        &self,
        pool: &DbPool,
        limit: i64,
    ) -> Result<SyncReport, PropagationError> {
        let rows = IndexFailureRepo::list_unresolved(pool, limit).await?;
        let mut refs = PendingSet::new();
        for row in &rows {
            match row.entity() {
                Ok(entity) => {
                    refs.enqueue(entity);
                }
                Err(e) => tracing::warn!(
                    failure_id = row.id,
                    error = %e,
                    "Skipping outbox row with unknown entity kind"
                ),
            }
        }
        let refs = refs.drain();
        if refs.is_empty() {
            return Ok(SyncReport::default());
        }

        let ops = IndexSynchronizer::plan(&self.store.read(), &refs);
        let report = self.synchronizer.write(ops).await;

        let mut resolved = 0;
        for entity in &refs {
            if report.failures.iter().any(|f| f.entity == *entity) {
                continue;
            }
            resolved += IndexFailureRepo::mark_resolved(pool, entity.kind.as_str(), entity.id).await?;
        }
        tracing::info!(
            entities = refs.len(),
            resolved,
            still_failing = report.failures.len(),
            "Outbox reconciled"
        );
        self.synchronizer.settle(report)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One unit-of-work with propagation attached.
///
/// Dropping a session without [`commit`](Self::commit) discards its writes
/// like [`rollback`](Self::rollback) does, but cannot re-sync immediate
/// pushes.
pub struct Session<'a> {
    propagator: &'a Propagator,
    uow: UnitOfWork,
    /// Entities upserted before commit (immediate mode).
    pushed: PendingSet,
    /// Deletions and failed pushes waiting for commit (immediate mode).
    deferred: PendingSet,
}

impl Session<'_> {
    /// In-session state, including uncommitted writes.
    pub fn tables(&self) -> &Tables {
        self.uow.tables()
    }

    /// Everything this session has dirtied so far.
    pub fn pending(&self) -> &PendingSet {
        self.uow.pending()
    }

    /// Run one step of writes. A failing step is undone on its own and the
    /// session stays usable.
    pub async fn apply<T, F>(&mut self, f: F) -> Result<T, PropagationError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, CoreError>,
    {
        let savepoint = self.uow.savepoint();
        let value = match f(&mut self.uow) {
            Ok(value) => value,
            Err(e) => {
                self.uow.rollback_to(savepoint);
                return Err(e.into());
            }
        };
        if self.propagator.mode == PropagationMode::Immediate {
            self.push_step().await;
        }
        Ok(value)
    }

    /// Push the current step's upserts and defer its deletions.
    async fn push_step(&mut self) {
        let step = self.uow.take_step();
        if step.is_empty() {
            return;
        }
        let (upserts, deletes): (Vec<IndexOp>, Vec<IndexOp>) =
            IndexSynchronizer::plan(self.uow.tables(), &step)
                .into_iter()
                .partition(|op| matches!(op, IndexOp::Upsert(_)));

        self.deferred.enqueue_all(deletes.iter().map(IndexOp::entity));
        self.pushed.enqueue_all(upserts.iter().map(IndexOp::entity));

        let report = self.propagator.synchronizer.write(upserts).await;
        for failed in &report.failures {
            tracing::warn!(
                entity = %failed.entity,
                error = %failed.error,
                "Immediate index write failed, retrying at commit"
            );
            self.deferred.enqueue(failed.entity);
        }
        tracing::debug!(
            pushed = report.upserted,
            deferred = self.deferred.len(),
            "Immediate step propagated"
        );
    }

    /// Commit and flush. In batched mode the whole dirty set is flushed;
    /// in immediate mode only what was deferred.
    pub async fn commit(self) -> Result<SyncReport, PropagationError> {
        let Session {
            propagator,
            uow,
            pushed: _,
            mut deferred,
        } = self;
        let dirty = uow.commit();
        let refs = match propagator.mode {
            PropagationMode::Batched => dirty,
            PropagationMode::Immediate => deferred.drain(),
        };
        propagator
            .synchronizer
            .flush(&propagator.store, &refs)
            .await
    }

    /// Discard every write. In immediate mode, entities already pushed are
    /// re-synced against committed state.
    pub async fn rollback(self) -> Result<SyncReport, PropagationError> {
        let Session {
            propagator,
            uow,
            mut pushed,
            deferred: _,
        } = self;
        uow.rollback();
        if pushed.is_empty() {
            return Ok(SyncReport::default());
        }
        tracing::info!(
            entities = pushed.len(),
            "Re-syncing entities pushed before rollback"
        );
        let refs = pushed.drain();
        propagator
            .synchronizer
            .flush(&propagator.store, &refs)
            .await
    }
}

// ---------------------------------------------------------------------------
// RequestScope
// ---------------------------------------------------------------------------

/// Accumulates the dirty sets of several committed units-of-work and
/// flushes them once.
///
/// Each unit hands its dirty set over in a post-commit hook, so a unit that
/// rolls back contributes nothing. Scopes always defer to
/// [`finish`](Self::finish), whatever the propagator's mode.
pub struct RequestScope<'a> {
    propagator: &'a Propagator,
    pending: Arc<Mutex<PendingSet>>,
}

impl RequestScope<'_> {
    /// Run `f` in its own unit-of-work. On commit its dirty set joins the
    /// scope; on error nothing does.
    pub async fn transaction<T, F>(&mut self, f: F) -> Result<T, PropagationError>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, CoreError>,
    {
        let mut uow = self.propagator.store.begin().await;
        let value = match f(&mut uow) {
            Ok(value) => value,
            Err(e) => {
                uow.rollback();
                return Err(e.into());
            }
        };
        let pending = Arc::clone(&self.pending);
        uow.on_commit(move |dirty| {
            let mut pending = pending.lock();
            let added = pending.enqueue_all(dirty.iter().copied());
            tracing::debug!(added, pending = pending.len(), "Request scope collected changes");
        });
        uow.commit();
        Ok(value)
    }

    /// Number of distinct entities waiting for [`finish`](Self::finish).
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Flush everything collected.
    pub async fn finish(self) -> Result<SyncReport, PropagationError> {
        let refs = self.pending.lock().drain();
        self.propagator
            .synchronizer
            .flush(&self.propagator.store, &refs)
            .await
    }
}

impl Drop for RequestScope<'_> {
    fn drop(&mut self) {
        let pending = self.pending.lock().len();
        if pending > 0 {
            tracing::warn!(pending, "Request scope dropped without finish, index not updated");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
