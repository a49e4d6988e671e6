//! Unit-of-work: the single write path into a [`GraphStore`](super::GraphStore).

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use cms_core::entity::EntityRef;
use cms_core::error::CoreError;
use cms_core::history::HistoryType;
use cms_core::pending::PendingSet;
use cms_core::types::{DbId, Timestamp};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;

use super::tables::Tables;
use super::Snapshot;
use crate::attachment::AttachmentRegistry;
use crate::models::history::HistoryRecord;
use crate::models::tag::TagTable;
use crate::signals::{MutationEvent, SignalDispatcher};

/// Side effect run once after a successful commit, given the committed
/// dirty set.
pub type CommitHook = Box<dyn FnOnce(&[EntityRef]) + Send>;

/// Which history table a record goes to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum HistoryTable {
    Container,
    Resource,
}

/// An open write transaction.
///
/// Every mutation validates first, then writes to the working copy, then
/// announces itself to the store's observers. Dirty entities reported by
/// observers accumulate in the unit's own [`PendingSet`].
pub struct UnitOfWork {
    writer: OwnedMutexGuard<()>,
    published: Arc<RwLock<Snapshot>>,
    base: Snapshot,
    pub(crate) working: Tables,
    signals: Arc<SignalDispatcher>,
    pub(crate) attachments: Arc<AttachmentRegistry>,
    pending: PendingSet,
    step: PendingSet,
    hooks: Vec<CommitHook>,
    actor: Option<String>,
    change_reason: Option<String>,
}

/// A point inside a unit-of-work that [`UnitOfWork::rollback_to`] can
/// return to. Its copy of the tables shares every table with the unit
/// until one is written.
pub struct Savepoint {
    working: Tables,
    pending: PendingSet,
    step: PendingSet,
    hooks_len: usize,
}

impl UnitOfWork {
    pub(super) fn new(
        writer: OwnedMutexGuard<()>,
        published: Arc<RwLock<Snapshot>>,
        signals: Arc<SignalDispatcher>,
        attachments: Arc<AttachmentRegistry>,
    ) -> Self {
        let base = Arc::clone(&published.read());
        let working = Tables::clone(&base);
        Self {
            writer,
            published,
            base,
            working,
            signals,
            attachments,
            pending: PendingSet::new(),
            step: PendingSet::new(),
            hooks: Vec::new(),
            actor: None,
            change_reason: None,
        }
    }

    /// In-transaction state, including uncommitted writes.
    pub fn tables(&self) -> &Tables {
        &self.working
    }

    /// State as of the last commit.
    pub fn committed(&self) -> &Tables {
        &self.base
    }

    /// Everything dirtied so far in this unit.
    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    /// Take the entities dirtied since the previous call.
    pub fn take_step(&mut self) -> Vec<EntityRef> {
        self.step.drain()
    }

    /// User recorded on history rows written from now on.
    pub fn set_actor(&mut self, actor: impl Into<String>) {
        self.actor = Some(actor.into());
    }

    /// Change reason recorded on history rows written from now on.
    pub fn set_change_reason(&mut self, reason: impl Into<String>) {
        self.change_reason = Some(reason.into());
    }

    /// Register a side effect to run once, after a successful commit. A
    /// rollback, or a rollback to an earlier savepoint, discards it.
    pub fn on_commit(&mut self, hook: impl FnOnce(&[EntityRef]) + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn savepoint(&self) -> Savepoint {
        Savepoint {
            working: self.working.clone(),
            pending: self.pending.clone(),
            step: self.step.clone(),
            hooks_len: self.hooks.len(),
        }
    }

    /// Undo everything written since `savepoint`, including dirty marks and
    /// hooks registered after it.
    pub fn rollback_to(&mut self, savepoint: Savepoint) {
        self.working = savepoint.working;
        self.pending = savepoint.pending;
        self.step = savepoint.step;
        self.hooks.truncate(savepoint.hooks_len);
    }

    /// Publish the working copy, run post-commit hooks and return the
    /// pending dirty set in first-enqueue order.
    pub fn commit(self) -> Vec<EntityRef> {
        let Self {
            writer,
            published,
            working,
            mut pending,
            hooks,
            ..
        } = self;
        *published.write() = Arc::new(working);
        drop(writer);

        let dirty = pending.drain();
        for hook in hooks {
            hook(&dirty);
        }
        tracing::debug!(dirty = dirty.len(), "Unit of work committed");
        dirty
    }

    /// Discard every write, dirty mark and hook.
    pub fn rollback(self) {
        tracing::debug!(
            discarded = self.pending.len(),
            "Unit of work rolled back"
        );
    }

    // -----------------------------------------------------------------------
    // Shared write helpers
    // -----------------------------------------------------------------------

    pub(crate) fn now(&self) -> Timestamp {
        Utc::now()
    }

    /// Announce a mutation and record what it dirtied.
    pub(crate) fn emit(&mut self, event: MutationEvent) {
        let dirty = self.signals.dispatch(&self.working, &event);
        for entity in dirty {
            self.pending.enqueue(entity);
            self.step.enqueue(entity);
        }
    }

    pub(crate) fn record_history<T: Serialize>(
        &mut self,
        table: HistoryTable,
        entity_id: DbId,
        history_type: HistoryType,
        row: &T,
    ) -> Result<(), CoreError> {
        let snapshot = serde_json::to_value(row)?;
        let sequence = match table {
            HistoryTable::Container => "container_history",
            HistoryTable::Resource => "resource_history",
        };
        let history_id = self.working.next_id(sequence);
        let record = HistoryRecord {
            history_id,
            entity_id,
            history_date: Utc::now(),
            history_type,
            history_user: self.actor.clone(),
            history_change_reason: self.change_reason.clone(),
            snapshot,
        };
        match table {
            HistoryTable::Container => self.working.container_history.push(record),
            HistoryTable::Resource => self.working.resource_history.push(record),
        }
        Ok(())
    }

    /// Resolve tag values to ids in `table`. Unknown values are skipped.
    pub(crate) fn resolve_tag_values(&self, table: TagTable, values: &[String]) -> Vec<DbId> {
        let mut ids = BTreeSet::new();
        for value in values {
            match self.working.tag_by_value_in(table, value) {
                Some(tag) => {
                    ids.insert(tag.id);
                }
                None => tracing::warn!(tag_value = %value, "Skipping unknown tag value"),
            }
        }
        ids.into_iter().collect()
    }
}

/// Replace every `(owner, _)` link with `(owner, tag)` for `tag_ids`.
pub(crate) fn replace_links(links: &mut BTreeSet<(DbId, DbId)>, owner: DbId, tag_ids: &[DbId]) {
    remove_links(links, owner);
    links.extend(tag_ids.iter().map(|t| (owner, *t)));
}

/// Remove every `(owner, _)` link.
pub(crate) fn remove_links(links: &mut BTreeSet<(DbId, DbId)>, owner: DbId) {
    let existing: Vec<(DbId, DbId)> = links
        .range((owner, DbId::MIN)..=(owner, DbId::MAX))
        .copied()
        .collect();
    for link in existing {
        links.remove(&link);
    }
}

/// Remove every `(_, tag)` link.
pub(crate) fn remove_tag_links(links: &mut BTreeSet<(DbId, DbId)>, tag_id: DbId) {
    links.retain(|(_, t)| *t != tag_id);
}

/// Reject text longer than `max` characters.
pub(crate) fn check_len(field: &str, value: &str, max: usize) -> Result<(), CoreError> {
    if value.chars().count() > max {
        return Err(CoreError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

/// Reject empty or over-long text.
pub(crate) fn check_required(field: &str, value: &str, max: usize) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    check_len(field, value, max)
}

/// Reject an attempt to change the `origin` of row `id`.
pub(crate) fn check_origin_unchanged(
    entity: &'static str,
    id: DbId,
    current: &str,
    requested: Option<&str>,
) -> Result<(), CoreError> {
    match requested {
        Some(origin) if origin != current => Err(CoreError::Immutable {
            entity,
            id,
            field: "origin",
            reason: format!("is '{current}', got '{origin}'"),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    use super::*;
    use crate::models::entity_type::CreateEntityType;
    use crate::store::GraphStore;

    #[tokio::test]
    async fn commit_publishes_working_copy() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let show = uow.create_entity_type(CreateEntityType::new("show")).unwrap();
        assert!(uow.committed().entity_type(show.id).is_none());
        uow.commit();

        assert!(store.read().entity_type(show.id).is_some());
    }

    #[tokio::test]
    async fn drop_without_commit_discards_writes() {
        let store = GraphStore::new();
        {
            let mut uow = store.begin().await;
            uow.create_entity_type(CreateEntityType::new("show")).unwrap();
        }
        assert!(store.read().entity_type_by_name("show").is_none());
    }

    #[tokio::test]
    async fn hooks_run_on_commit_only() {
        let store = GraphStore::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let mut uow = store.begin().await;
        let counter = Arc::clone(&runs);
        uow.on_commit(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        uow.rollback();
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        let mut uow = store.begin().await;
        let counter = Arc::clone(&runs);
        uow.on_commit(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        uow.commit();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hooks_see_the_committed_dirty_set() {
        let dirty_seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let store = GraphStore::with_signals(
            SignalDispatcher::new().with_observer(Arc::new(|_: &Tables, e: &MutationEvent| {
                vec![e.entity()]
            })),
        );

        let mut uow = store.begin().await;
        let show = uow.create_entity_type(CreateEntityType::new("show")).unwrap();
        let seen = Arc::clone(&dirty_seen);
        uow.on_commit(move |dirty| seen.lock().extend_from_slice(dirty));
        let returned = uow.commit();

        assert_eq!(returned, vec![EntityRef::entity_type(show.id)]);
        assert_eq!(*dirty_seen.lock(), returned);
    }

    #[tokio::test]
    async fn readers_do_not_wait_for_an_open_unit() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        uow.create_entity_type(CreateEntityType::new("show")).unwrap();

        // The unit is still open; committed state is readable and unchanged.
        let before = store.read();
        assert!(before.entity_type_by_name("show").is_none());

        uow.commit();
        assert!(before.entity_type_by_name("show").is_none());
        assert!(store.read().entity_type_by_name("show").is_some());
    }

    #[tokio::test]
    async fn savepoint_restores_rows_and_hooks() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        uow.create_entity_type(CreateEntityType::new("show")).unwrap();
        let sp = uow.savepoint();
        uow.create_entity_type(CreateEntityType::new("episode")).unwrap();
        uow.on_commit(|_| {});
        uow.rollback_to(sp);

        assert!(uow.tables().entity_type_by_name("episode").is_none());
        assert!(uow.tables().entity_type_by_name("show").is_some());
        assert!(uow.hooks.is_empty());
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_error() {
        let store = GraphStore::new();
        let result: Result<((), _), _> = store
            .transaction(|uow| {
                uow.create_entity_type(CreateEntityType::new("show"))?;
                Err(CoreError::Validation("boom".into()))
            })
            .await;
        assert_matches!(result, Err(CoreError::Validation(_)));
        assert!(store.read().entity_type_by_name("show").is_none());
    }

    #[test]
    fn text_checks() {
        assert!(check_required("guid", "  ", 256).is_err());
        assert!(check_len("label", &"x".repeat(257), 256).is_err());
        assert!(check_len("label", &"x".repeat(256), 256).is_ok());
        assert_matches!(
            check_origin_unchanged("container", 1, "system", Some("import")),
            Err(CoreError::Immutable { field: "origin", .. })
        );
        assert!(check_origin_unchanged("container", 1, "system", Some("system")).is_ok());
        assert!(check_origin_unchanged("container", 1, "system", None).is_ok());
    }

    #[test]
    fn link_replacement_touches_only_the_owner() {
        let mut links = BTreeSet::from([(1, 10), (1, 11), (2, 10)]);
        replace_links(&mut links, 1, &[12]);
        assert_eq!(links, BTreeSet::from([(1, 12), (2, 10)]));
        remove_tag_links(&mut links, 10);
        assert_eq!(links, BTreeSet::from([(1, 12)]));
    }
}
