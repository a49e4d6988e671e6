//! Resource writes.

use std::sync::Arc;

use cms_core::entity::EntityRef;
use cms_core::error::CoreError;
use cms_core::history::HistoryType;
use cms_core::types::DbId;

use super::unit_of_work::{
    check_len, check_origin_unchanged, remove_links, replace_links, HistoryTable, UnitOfWork,
};
use crate::models::history::HistoryDelta;
use crate::models::resource::{CreateResource, Resource, UpdateResource};
use crate::models::tag::TagTable;
use crate::models::{DEFAULT_ORIGIN, MAX_TEXT_LEN, MAX_URI_LEN};
use crate::signals::{relations, MutationEvent};

impl UnitOfWork {
    /// Attach a new resource to its owner.
    pub fn create_resource(&mut self, input: CreateResource) -> Result<Resource, CoreError> {
        self.attachments.resolve(&self.working, input.owner)?;
        check_len("uri", &input.uri, MAX_URI_LEN)?;
        let status = input.status.unwrap_or_default();
        let origin = input.origin.unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        check_len("status", &status, MAX_TEXT_LEN)?;
        check_len("origin", &origin, MAX_TEXT_LEN)?;
        self.check_type_ref(input.type_id)?;

        let now = self.now();
        let id = self.working.next_id("resources");
        let row = Resource {
            id,
            type_id: input.type_id,
            owner: input.owner,
            uri: input.uri,
            status,
            origin,
            data: input.data,
            created_date: now,
            published_date: input.published_date,
            updated_date: now,
            expiration_date: input.expiration_date,
        };
        Arc::make_mut(&mut self.working.resources).insert(id, row.clone());
        self.record_history(HistoryTable::Resource, id, HistoryType::Created, &row)?;
        self.emit(MutationEvent::Saved {
            entity: EntityRef::resource(id),
            created: true,
        });

        if !input.tags.is_empty() {
            self.set_resource_tags(id, &input.tags)?;
        }
        Ok(row)
    }

    /// Patch a resource. `origin` may be restated but never changed; the
    /// owner is fixed.
    pub fn update_resource(
        &mut self,
        id: DbId,
        patch: UpdateResource,
    ) -> Result<Resource, CoreError> {
        let mut row = self.load_resource(id)?;
        check_origin_unchanged("resource", id, &row.origin, patch.origin.as_deref())?;
        self.check_type_ref(patch.type_id)?;

        if let Some(uri) = patch.uri {
            check_len("uri", &uri, MAX_URI_LEN)?;
            row.uri = uri;
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
        if patch.published_date.is_some() {
            row.published_date = patch.published_date;
        }
        if patch.expiration_date.is_some() {
            row.expiration_date = patch.expiration_date;
        }
        row.updated_date = self.now();

        Arc::make_mut(&mut self.working.resources).insert(id, row.clone());
        self.record_history(HistoryTable::Resource, id, HistoryType::Changed, &row)?;
        self.emit(MutationEvent::Saved {
            entity: EntityRef::resource(id),
            created: false,
        });

        if let Some(tags) = patch.tags {
            self.set_resource_tags(id, &tags)?;
        }
        Ok(row)
    }

    /// Replace a resource's tag set by value. Unknown values are skipped.
    pub fn set_resource_tags(&mut self, id: DbId, values: &[String]) -> Result<(), CoreError> {
        self.load_resource(id)?;
        let tag_ids = self.resolve_tag_values(TagTable::Resource, values);
        replace_links(Arc::make_mut(&mut self.working.resource_tag_links), id, &tag_ids);
        self.emit(MutationEvent::M2mChanged {
            entity: EntityRef::resource(id),
            relation: relations::RESOURCE_TAGS,
        });
        Ok(())
    }

    pub fn delete_resource(&mut self, id: DbId) -> Result<(), CoreError> {
        self.load_resource(id)?;
        self.emit(MutationEvent::PreDeleted {
            entity: EntityRef::resource(id),
        });
        self.drop_resource_row(id)
    }

    /// Field delta between two history records of one resource.
    pub fn resource_history_delta(
        &self,
        old_history_id: DbId,
        new_history_id: DbId,
    ) -> Result<HistoryDelta, CoreError> {
        let find = |hid: DbId| {
            self.working
                .resource_history
                .iter()
                .find(|h| h.history_id == hid)
                .ok_or(CoreError::NotFound {
                    entity: "resource_history",
                    id: hid,
                })
        };
        let old = find(old_history_id)?;
        let new = find(new_history_id)?;
        if old.entity_id != new.entity_id {
            return Err(CoreError::Validation(
                "History records belong to different resources".to_string(),
            ));
        }
        Ok(HistoryDelta::between(old, new))
    }

    /// Remove the row and its tag links, recording a `deleted` history row.
    pub(super) fn drop_resource_row(&mut self, id: DbId) -> Result<(), CoreError> {
        if let Some(row) = Arc::make_mut(&mut self.working.resources).remove(&id) {
            remove_links(Arc::make_mut(&mut self.working.resource_tag_links), id);
            self.record_history(HistoryTable::Resource, id, HistoryType::Deleted, &row)?;
        }
        Ok(())
    }

    pub(crate) fn load_resource(&self, id: DbId) -> Result<Resource, CoreError> {
        self.working
            .resource(id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "resource",
                id,
            })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::models::container::CreateContainer;
    use crate::models::tag::CreateTag;
    use crate::store::GraphStore;

    #[tokio::test]
    async fn owner_must_exist_and_be_attachable() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        assert_matches!(
            uow.create_resource(CreateResource::new(EntityRef::container(9), "s3://a")),
            Err(CoreError::NotFound { entity: "container", id: 9 })
        );
        assert_matches!(
            uow.create_resource(CreateResource::new(EntityRef::tag(1), "s3://a")),
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn create_with_tags_and_update() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let c = uow.create_container(CreateContainer::new("g-1", None)).unwrap();
        uow.create_resource_tag(CreateTag::new("poster")).unwrap();

        let r = uow
            .create_resource(CreateResource {
                tags: vec!["poster".into()],
                ..CreateResource::new(EntityRef::container(c.id), "s3://poster.jpg")
            })
            .unwrap();
        assert_eq!(r.status, "");
        assert_eq!(uow.tables().tags_of_resource(r.id).len(), 1);

        let r = uow
            .update_resource(
                r.id,
                UpdateResource {
                    status: Some("published".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(r.status, "published");
        assert_eq!(uow.tables().resource_history(r.id).len(), 2);
    }

    #[tokio::test]
    async fn origin_is_immutable() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let c = uow.create_container(CreateContainer::new("g-1", None)).unwrap();
        let r = uow
            .create_resource(CreateResource::new(EntityRef::container(c.id), "u"))
            .unwrap();
        assert_matches!(
            uow.update_resource(
                r.id,
                UpdateResource {
                    origin: Some("feed".into()),
                    ..Default::default()
                }
            ),
            Err(CoreError::Immutable { field: "origin", .. })
        );
    }

    #[tokio::test]
    async fn overlong_uri_is_rejected() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let c = uow.create_container(CreateContainer::new("g-1", None)).unwrap();
        let uri = "x".repeat(MAX_URI_LEN + 1);
        assert_matches!(
            uow.create_resource(CreateResource::new(EntityRef::container(c.id), uri)),
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn delete_records_history() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let c = uow.create_container(CreateContainer::new("g-1", None)).unwrap();
        let r = uow
            .create_resource(CreateResource::new(EntityRef::container(c.id), "u"))
            .unwrap();
        uow.delete_resource(r.id).unwrap();
        assert!(uow.tables().resource(r.id).is_none());
        let history = uow.tables().resource_history(r.id);
        assert_eq!(history.last().map(|h| h.history_type), Some(HistoryType::Deleted));
    }
}
