//! Index synchronization.
//!
//! [`IndexSynchronizer::plan`] turns a dirty set into index writes by
//! re-reading current state: entities that still exist are upserted,
//! entities that are gone are deleted by the document id derived from their
//! `(kind, id)`, and kinds without a document of their own are skipped.
//! [`IndexSynchronizer::apply`] performs the writes one by one so a failing
//! item never stops the rest of the batch, then publishes the outcome.
//! [`IndexSynchronizer::write`] does the same without publishing, for
//! attempts whose outcome is not final yet.

use std::sync::Arc;

use cms_core::entity::EntityRef;
use cms_core::error::CoreError;
use cms_core::propagation::FailurePolicy;
use cms_db::{GraphStore, Tables};
use cms_events::{EventBus, IndexEvent, IndexOperation};

use crate::document::build_document;
use crate::index::{IndexDocument, IndexError, SearchIndex};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// One failed write of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedWrite {
    pub entity: EntityRef,
    pub operation: IndexOperation,
    pub error: IndexError,
}

/// Errors surfaced by propagation.
#[derive(Debug, thiserror::Error)]
pub enum PropagationError {
    /// The unit-of-work itself failed; nothing was committed.
    #[error(transparent)]
    Store(#[from] CoreError),

    /// The failure outbox could not be read or updated.
    #[error("Failure outbox: {0}")]
    Outbox(#[from] sqlx::Error),

    /// Content committed, but some index writes failed after the whole
    /// batch was attempted.
    #[error("{} index write(s) failed", .0.len())]
    IndexWrite(Vec<FailedWrite>),
}

impl PropagationError {
    /// The failed writes, when this is an index error.
    pub fn failures(&self) -> &[FailedWrite] {
        match self {
            Self::IndexWrite(failures) => failures,
            Self::Store(_) | Self::Outbox(_) => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A planned index write.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexOp {
    Upsert(IndexDocument),
    Delete { entity: EntityRef, doc_id: String },
}

impl IndexOp {
    pub fn entity(&self) -> EntityRef {
        match self {
            Self::Upsert(doc) => doc.entity,
            Self::Delete { entity, .. } => *entity,
        }
    }

    pub fn operation(&self) -> IndexOperation {
        match self {
            Self::Upsert(_) => IndexOperation::Upsert,
            Self::Delete { .. } => IndexOperation::Delete,
        }
    }
}

/// Outcome of applying a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub upserted: usize,
    pub deleted: usize,
    pub failures: Vec<FailedWrite>,
}

impl SyncReport {
    pub fn attempted(&self) -> usize {
        self.upserted + self.deleted + self.failures.len()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: SyncReport) {
        self.upserted += other.upserted;
        self.deleted += other.deleted;
        self.failures.extend(other.failures);
    }
}

// ---------------------------------------------------------------------------
// IndexSynchronizer
// ---------------------------------------------------------------------------

/// Applies dirty sets to a [`SearchIndex`].
pub struct IndexSynchronizer {
    index: Arc<dyn SearchIndex>,
    bus: Option<Arc<EventBus>>,
    policy: FailurePolicy,
}

impl IndexSynchronizer {
    pub fn new(index: Arc<dyn SearchIndex>, policy: FailurePolicy) -> Self {
        Self {
            index,
            bus: None,
            policy,
        }
    }

    /// Publish failures and flush summaries on `bus`.
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Plan writes for `refs` against `tables`. Order follows `refs`.
    pub fn plan(tables: &Tables, refs: &[EntityRef]) -> Vec<IndexOp> {
        refs.iter()
            .filter(|r| r.kind.is_indexed())
            .map(|r| match build_document(tables, *r) {
                Some(doc) => IndexOp::Upsert(doc),
                None => IndexOp::Delete {
                    entity: *r,
                    doc_id: r.document_id(),
                },
            })
            .collect()
    }

    /// Attempt every write, collecting failures instead of stopping.
    /// Publishes nothing.
    pub async fn write(&self, ops: Vec<IndexOp>) -> SyncReport {
        let mut report = SyncReport::default();
        for op in ops {
            let entity = op.entity();
            let operation = op.operation();
            let result = match op {
                IndexOp::Upsert(doc) => self.index.upsert(doc).await,
                IndexOp::Delete { doc_id, .. } => self.index.delete(&doc_id).await,
            };
            match result {
                Ok(()) => match operation {
                    IndexOperation::Upsert => report.upserted += 1,
                    IndexOperation::Delete => report.deleted += 1,
                },
                Err(error) => report.failures.push(FailedWrite {
                    entity,
                    operation,
                    error,
                }),
            }
        }
        report
    }

    /// [`write`](Self::write), then publish every failure and a summary.
    pub async fn apply(&self, ops: Vec<IndexOp>) -> SyncReport {
        let report = self.write(ops).await;
        self.publish(&report);
        report
    }

    fn publish(&self, report: &SyncReport) {
        let Some(bus) = &self.bus else {
            return;
        };
        for f in &report.failures {
            bus.publish(IndexEvent::write_failed(f.entity, f.operation, f.error.to_string()));
        }
        bus.publish(IndexEvent::flushed(
            report.upserted,
            report.deleted,
            report.failures.len(),
        ));
    }

    /// Apply the failure policy to a finished batch.
    pub fn settle(&self, report: SyncReport) -> Result<SyncReport, PropagationError> {
        if report.failures.is_empty() {
            return Ok(report);
        }
        match self.policy {
            FailurePolicy::ExactlyOnce => {
                for f in &report.failures {
                    tracing::error!(
                        entity = %f.entity,
                        operation = %f.operation,
                        error = %f.error,
                        index = self.index.name(),
                        "Index write failed"
                    );
                }
                Err(PropagationError::IndexWrite(report.failures))
            }
            FailurePolicy::BestEffort => {
                for f in &report.failures {
                    tracing::warn!(
                        entity = %f.entity,
                        operation = %f.operation,
                        error = %f.error,
                        index = self.index.name(),
                        "Index write failed, continuing"
                    );
                }
                Ok(report)
            }
        }
    }

    /// Bring the index in line with committed state for `refs`.
    ///
    /// A no-op for an empty set. Plans against the latest committed
    /// snapshot, so no store lock is held while the index is written.
    pub async fn flush(
        &self,
        store: &GraphStore,
        refs: &[EntityRef],
    ) -> Result<SyncReport, PropagationError> {
        if refs.is_empty() {
            return Ok(SyncReport::default());
        }
        let ops = {
            let tables = store.read();
            Self::plan(&tables, refs)
        };
        tracing::debug!(dirty = refs.len(), writes = ops.len(), "Flushing index writes");
        let report = self.apply(ops).await;
        tracing::info!(
            upserted = report.upserted,
            deleted = report.deleted,
            failed = report.failures.len(),
            index = self.index.name(),
            "Index flush complete"
        );
        self.settle(report)
    }

    /// Retry a list of identities, typically read back from the failure
    /// outbox.
    pub async fn reconcile(
        &self,
        store: &GraphStore,
        refs: &[EntityRef],
    ) -> Result<SyncReport, PropagationError> {
        tracing::info!(entities = refs.len(), "Reconciling index entries");
        self.flush(store, refs).await
    }
}

impl std::fmt::Debug for IndexSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSynchronizer")
            .field("index", &self.index.name())
            .field("policy", &self.policy)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
