//! Container writes, including the delete cascade.

use std::sync::Arc;

use cms_core::entity::{EntityKind, EntityRef};
use cms_core::error::CoreError;
use cms_core::history::HistoryType;
use cms_core::reference::{resolve_expiration_date, resolve_reference_date};
use cms_core::types::DbId;

use super::unit_of_work::{
    check_len, check_origin_unchanged, check_required, remove_links, replace_links, HistoryTable,
    UnitOfWork,
};
use crate::models::container::{Container, ContainerLocks, CreateContainer, UpdateContainer};
use crate::models::history::HistoryDelta;
use crate::models::tag::TagTable;
use crate::models::{DEFAULT_ORIGIN, DEFAULT_STATUS, MAX_TEXT_LEN, PUBLISHED_STATUS};
use crate::signals::{relations, MutationEvent};

/// Recompute the precomputed date columns from `data`.
fn refresh_derived_dates(row: &mut Container) {
    row.reference_date = Some(resolve_reference_date(
        row.data.as_ref(),
        row.published_date,
        row.created_date,
    ));
    if let Some(expiration) = resolve_expiration_date(row.data.as_ref()) {
        row.expiration_date = Some(expiration);
    }
}

impl UnitOfWork {
    /// Create a container.
    ///
    /// A `published` container without a published date is stamped with
    /// the current time.
    pub fn create_container(&mut self, input: CreateContainer) -> Result<Container, CoreError> {
        check_required("guid", &input.guid, MAX_TEXT_LEN)?;
        let status = input.status.unwrap_or_else(|| DEFAULT_STATUS.to_string());
        let origin = input.origin.unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        check_len("status", &status, MAX_TEXT_LEN)?;
        check_len("origin", &origin, MAX_TEXT_LEN)?;
        self.check_type_ref(input.type_id)?;
        if self.working.container_by_guid(&input.guid).is_some() {
            return Err(CoreError::Conflict(format!(
                "A container with guid '{}' already exists",
                input.guid
            )));
        }

        let now = self.now();
        let published_date = match input.published_date {
            None if status == PUBLISHED_STATUS => Some(now),
            other => other,
        };
        let id = self.working.next_id("containers");
        let mut row = Container {
            id,
            type_id: input.type_id,
            guid: input.guid,
            status,
            origin,
            data: input.data,
            is_enabled: input.is_enabled.unwrap_or(true),
            hard_lock_id: None,
            soft_lock_id: None,
            created_date: now,
            published_date,
            updated_date: now,
            expiration_date: input.expiration_date,
            reference_date: None,
        };
        refresh_derived_dates(&mut row);

        Arc::make_mut(&mut self.working.container_guids).insert(row.guid.clone(), id);
        Arc::make_mut(&mut self.working.containers).insert(id, row.clone());
        self.record_history(HistoryTable::Container, id, HistoryType::Created, &row)?;
        self.emit(MutationEvent::Saved {
            entity: EntityRef::container(id),
            created: true,
        });

        if !input.tags.is_empty() {
            self.set_container_tags(id, &input.tags)?;
        }
        Ok(row)
    }

    /// Patch a container. `origin` may be restated but never changed.
    pub fn update_container(
        &mut self,
        id: DbId,
        patch: UpdateContainer,
    ) -> Result<Container, CoreError> {
        let mut row = self.load_container(id)?;
        check_origin_unchanged("container", id, &row.origin, patch.origin.as_deref())?;
        self.check_type_ref(patch.type_id)?;

        let old_guid = row.guid.clone();
        if let Some(guid) = patch.guid {
            check_required("guid", &guid, MAX_TEXT_LEN)?;
            if guid != old_guid && self.working.container_by_guid(&guid).is_some() {
                return Err(CoreError::Conflict(format!(
                    "A container with guid '{guid}' already exists"
                )));
            }
            row.guid = guid;
        }
        if let Some(status) = patch.status {
            check_len("status", &status, MAX_TEXT_LEN)?;
            row.status = status;
        }
        if patch.type_id.is_some() {
            row.type_id = patch.type_id;
        }
        if patch.data.is_some() {
            row.data = patch.data;
        }
        if let Some(enabled) = patch.is_enabled {
            row.is_enabled = enabled;
        }
        // An absent published date never clears the existing one.
        if patch.published_date.is_some() {
            row.published_date = patch.published_date;
        }
        if patch.expiration_date.is_some() {
            row.expiration_date = patch.expiration_date;
        }
        row.updated_date = self.now();
        refresh_derived_dates(&mut row);

        Arc::make_mut(&mut self.working.container_guids).remove(&old_guid);
        Arc::make_mut(&mut self.working.container_guids).insert(row.guid.clone(), id);
        Arc::make_mut(&mut self.working.containers).insert(id, row.clone());
        self.record_history(HistoryTable::Container, id, HistoryType::Changed, &row)?;
        self.emit(MutationEvent::Saved {
            entity: EntityRef::container(id),
            created: false,
        });

        if let Some(tags) = patch.tags {
            self.set_container_tags(id, &tags)?;
        }
        Ok(row)
    }

    /// Replace a container's tag set by value. Unknown values are skipped.
    pub fn set_container_tags(&mut self, id: DbId, values: &[String]) -> Result<(), CoreError> {
        self.load_container(id)?;
        let tag_ids = self.resolve_tag_values(TagTable::Content, values);
        replace_links(Arc::make_mut(&mut self.working.container_tag_links), id, &tag_ids);
        self.emit(MutationEvent::M2mChanged {
            entity: EntityRef::container(id),
            relation: relations::CONTAINER_TAGS,
        });
        Ok(())
    }

    /// Set or clear the advisory lock tokens. The store does not enforce
    /// them; see [`cms_core::locks::check_advisory_lock`].
    pub fn set_container_locks(
        &mut self,
        id: DbId,
        locks: ContainerLocks,
    ) -> Result<Container, CoreError> {
        let mut row = self.load_container(id)?;
        if let Some(hard) = &locks.hard_lock_id {
            check_len("hard_lock_id", hard, MAX_TEXT_LEN)?;
        }
        if let Some(soft) = &locks.soft_lock_id {
            check_len("soft_lock_id", soft, MAX_TEXT_LEN)?;
        }
        row.hard_lock_id = locks.hard_lock_id;
        row.soft_lock_id = locks.soft_lock_id;
        row.updated_date = self.now();

        Arc::make_mut(&mut self.working.containers).insert(id, row.clone());
        self.record_history(HistoryTable::Container, id, HistoryType::Changed, &row)?;
        self.emit(MutationEvent::Saved {
            entity: EntityRef::container(id),
            created: false,
        });
        Ok(row)
    }

    /// Delete a container with its edges (both directions), its segments
    /// and every resource attached to it or to those segments.
    ///
    /// Every removed row is announced before anything is removed. Returns
    /// the removed rows, container first.
    pub fn delete_container(&mut self, id: DbId) -> Result<Vec<EntityRef>, CoreError> {
        let row = self.load_container(id)?;

        let mut doomed = vec![EntityRef::container(id)];
        doomed.extend(
            self.working
                .relationships()
                .filter(|r| r.from_id == id || r.to_id == id)
                .map(|r| EntityRef::relationship(r.id)),
        );
        let segments: Vec<DbId> = self.working.segments_of(id).iter().map(|s| s.id).collect();
        doomed.extend(segments.iter().map(|s| EntityRef::segment(*s)));
        let owners = std::iter::once(EntityRef::container(id))
            .chain(segments.iter().map(|s| EntityRef::segment(*s)));
        let resources: Vec<DbId> = owners
            .flat_map(|owner| self.working.resources_owned_by(owner))
            .map(|r| r.id)
            .collect();
        doomed.extend(resources.iter().map(|r| EntityRef::resource(*r)));

        for entity in &doomed {
            self.emit(MutationEvent::PreDeleted { entity: *entity });
        }

        for entity in &doomed[1..] {
            match entity.kind {
                EntityKind::ContainerRelationship => {
                    self.drop_relationship_row(entity.id);
                }
                EntityKind::Segment => self.drop_segment_row(entity.id),
                EntityKind::Resource => self.drop_resource_row(entity.id)?,
                _ => {}
            }
        }

        Arc::make_mut(&mut self.working.container_guids).remove(&row.guid);
        Arc::make_mut(&mut self.working.containers).remove(&id);
        remove_links(Arc::make_mut(&mut self.working.container_tag_links), id);
        self.record_history(HistoryTable::Container, id, HistoryType::Deleted, &row)?;

        tracing::debug!(
            container_id = id,
            cascaded = doomed.len() - 1,
            "Container deleted"
        );
        Ok(doomed)
    }

    /// Field delta between two history records of one container.
    pub fn container_history_delta(
        &self,
        old_history_id: DbId,
        new_history_id: DbId,
    ) -> Result<HistoryDelta, CoreError> {
        let find = |hid: DbId| {
            self.working
                .container_history
                .iter()
                .find(|h| h.history_id == hid)
                .ok_or(CoreError::NotFound {
                    entity: "container_history",
                    id: hid,
                })
        };
        let old = find(old_history_id)?;
        let new = find(new_history_id)?;
        if old.entity_id != new.entity_id {
            return Err(CoreError::Validation(
                "History records belong to different containers".to_string(),
            ));
        }
        Ok(HistoryDelta::between(old, new))
    }

    pub(crate) fn load_container(&self, id: DbId) -> Result<Container, CoreError> {
        self.working
            .container(id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "container",
                id,
            })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::models::tag::CreateTag;
    use crate::store::GraphStore;

    #[tokio::test]
    async fn defaults_and_unique_guid() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let c = uow.create_container(CreateContainer::new("g-1", None)).unwrap();
        assert_eq!(c.status, "new");
        assert_eq!(c.origin, "system");
        assert!(c.is_enabled);
        assert_eq!(c.reference_date, Some(c.created_date));
        assert_matches!(
            uow.create_container(CreateContainer::new("g-1", None)),
            Err(CoreError::Conflict(_))
        );
    }

    #[tokio::test]
    async fn unknown_type_is_not_found() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        assert_matches!(
            uow.create_container(CreateContainer::new("g-1", Some(77))),
            Err(CoreError::NotFound { entity: "entity_type", id: 77 })
        );
    }

    #[tokio::test]
    async fn published_on_create_stamps_date() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let c = uow
            .create_container(CreateContainer {
                status: Some("published".into()),
                ..CreateContainer::new("g-1", None)
            })
            .unwrap();
        assert_eq!(c.published_date, Some(c.created_date));
    }

    #[tokio::test]
    async fn update_keeps_published_date_and_rejects_origin_change() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let when = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let c = uow
            .create_container(CreateContainer {
                published_date: Some(when),
                ..CreateContainer::new("g-1", None)
            })
            .unwrap();

        let updated = uow
            .update_container(
                c.id,
                UpdateContainer {
                    status: Some("published".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.published_date, Some(when));

        assert_matches!(
            uow.update_container(
                c.id,
                UpdateContainer {
                    origin: Some("import".into()),
                    ..Default::default()
                }
            ),
            Err(CoreError::Immutable { field: "origin", .. })
        );
    }

    #[tokio::test]
    async fn save_recomputes_reference_and_expiration() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let c = uow.create_container(CreateContainer::new("g-1", None)).unwrap();
        let updated = uow
            .update_container(
                c.id,
                UpdateContainer {
                    data: Some(json!({
                        "pub_date": "1970-01-01T00:00:00Z",
                        "local_air_date": "2019-05-05T00:00:00Z",
                        "expiration_date": "2030-01-01",
                    })),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            updated.reference_date,
            Some(Utc.with_ymd_and_hms(2019, 5, 5, 0, 0, 0).unwrap())
        );
        assert_eq!(
            updated.expiration_date,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn tags_set_by_value_skip_unknown() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let hd = uow.create_tag(CreateTag::new("hd")).unwrap();
        let c = uow
            .create_container(CreateContainer {
                tags: vec!["hd".into(), "missing".into()],
                ..CreateContainer::new("g-1", None)
            })
            .unwrap();
        let tags = uow.tables().container_tags(c.id);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id, hd.id);

        uow.set_container_tags(c.id, &[]).unwrap();
        assert!(uow.tables().container_tags(c.id).is_empty());
    }

    #[tokio::test]
    async fn history_records_every_save() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        uow.set_actor("editor@example.com");
        let c = uow.create_container(CreateContainer::new("g-1", None)).unwrap();
        uow.update_container(
            c.id,
            UpdateContainer {
                status: Some("published".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let history = uow.tables().container_history(c.id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].history_type, HistoryType::Created);
        assert_eq!(history[1].user_display(), "editor@example.com");

        let delta = uow
            .container_history_delta(history[0].history_id, history[1].history_id)
            .unwrap();
        let fields: Vec<&str> = delta.changes.iter().map(|c| c.field.as_str()).collect();
        assert!(fields.contains(&"status"));
        assert!(!fields.contains(&"updated_date"));
    }

    #[tokio::test]
    async fn locks_are_stored_not_enforced() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let c = uow.create_container(CreateContainer::new("g-1", None)).unwrap();
        uow.set_container_locks(
            c.id,
            ContainerLocks {
                hard_lock_id: Some("token-a".into()),
                soft_lock_id: None,
            },
        )
        .unwrap();
        // Writes still go through; checking is the caller's job.
        uow.update_container(
            c.id,
            UpdateContainer {
                status: Some("draft".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let row = uow.tables().container(c.id).unwrap();
        assert_eq!(row.hard_lock_id.as_deref(), Some("token-a"));
        assert!(cms_core::locks::check_advisory_lock(
            row.hard_lock_id.as_deref(),
            row.soft_lock_id.as_deref(),
            Some("token-b"),
        )
        .is_err());
    }
}
