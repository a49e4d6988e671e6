//! Entity type writes.

use std::sync::Arc;

use cms_core::entity::EntityRef;
use cms_core::error::CoreError;
use cms_core::types::DbId;

use super::unit_of_work::{check_required, UnitOfWork};
use crate::models::entity_type::{CreateEntityType, EntityType};
use crate::models::MAX_TEXT_LEN;
use crate::signals::MutationEvent;

impl UnitOfWork {
    pub fn create_entity_type(&mut self, input: CreateEntityType) -> Result<EntityType, CoreError> {
        check_required("name", &input.name, MAX_TEXT_LEN)?;

        let id = self.working.next_id("entity_types");
        let row = EntityType {
            id,
            name: input.name,
            created_date: self.now(),
        };
        Arc::make_mut(&mut self.working.entity_types).insert(id, row.clone());
        self.emit(MutationEvent::Saved {
            entity: EntityRef::entity_type(id),
            created: true,
        });
        Ok(row)
    }

    /// Rename an entity type. The name is fixed once any container or
    /// resource uses the type.
    pub fn rename_entity_type(&mut self, id: DbId, name: &str) -> Result<EntityType, CoreError> {
        check_required("name", name, MAX_TEXT_LEN)?;
        let mut row = self.load_entity_type(id)?;
        if row.name == name {
            return Ok(row);
        }
        let (containers, resources) = self.type_usage(id);
        if containers + resources > 0 {
            return Err(CoreError::Immutable {
                entity: "entity_type",
                id,
                field: "name",
                reason: format!("used by {containers} containers and {resources} resources"),
            });
        }

        row.name = name.to_string();
        Arc::make_mut(&mut self.working.entity_types).insert(id, row.clone());
        self.emit(MutationEvent::Saved {
            entity: EntityRef::entity_type(id),
            created: false,
        });
        Ok(row)
    }

    /// Delete an entity type. Protected while any container or resource
    /// references it.
    pub fn delete_entity_type(&mut self, id: DbId) -> Result<(), CoreError> {
        self.load_entity_type(id)?;
        let (containers, resources) = self.type_usage(id);
        if containers + resources > 0 {
            return Err(CoreError::Conflict(format!(
                "Entity type {id} is referenced by {containers} containers and {resources} resources"
            )));
        }

        self.emit(MutationEvent::PreDeleted {
            entity: EntityRef::entity_type(id),
        });
        Arc::make_mut(&mut self.working.entity_types).remove(&id);
        Ok(())
    }

    fn load_entity_type(&self, id: DbId) -> Result<EntityType, CoreError> {
        self.working
            .entity_type(id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "entity_type",
                id,
            })
    }

    /// `(containers, resources)` currently of type `id`.
    fn type_usage(&self, id: DbId) -> (usize, usize) {
        (
            self.working.containers_of_type(id).len(),
            self.working.resources_of_type(id).len(),
        )
    }

    /// Fail with `NotFound` unless `type_id` is unset or exists.
    pub(crate) fn check_type_ref(&self, type_id: Option<DbId>) -> Result<(), CoreError> {
        match type_id {
            Some(id) if self.working.entity_type(id).is_none() => Err(CoreError::NotFound {
                entity: "entity_type",
                id,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::models::container::CreateContainer;
    use crate::store::GraphStore;

    #[tokio::test]
    async fn create_and_rename() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let t = uow.create_entity_type(CreateEntityType::new("show")).unwrap();
        let renamed = uow.rename_entity_type(t.id, "series").unwrap();
        assert_eq!(renamed.name, "series");
        assert_matches!(
            uow.create_entity_type(CreateEntityType::new("")),
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn referenced_type_is_protected() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let t = uow.create_entity_type(CreateEntityType::new("show")).unwrap();
        uow.create_container(CreateContainer::new("show-1", Some(t.id)))
            .unwrap();

        assert_matches!(uow.delete_entity_type(t.id), Err(CoreError::Conflict(_)));
        assert!(uow.tables().entity_type(t.id).is_some());
    }

    #[tokio::test]
    async fn type_name_is_fixed_once_in_use() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let platform = uow.create_entity_type(CreateEntityType::new("platform")).unwrap();
        let c = uow
            .create_container(CreateContainer::new("web", Some(platform.id)))
            .unwrap();

        assert_matches!(
            uow.rename_entity_type(platform.id, "site"),
            Err(CoreError::Immutable { entity: "entity_type", field: "name", .. })
        );
        assert_eq!(uow.tables().container_type_name(c.id).as_deref(), Some("platform"));

        // Restating the current name is not a change.
        assert!(uow.rename_entity_type(platform.id, "platform").is_ok());

        uow.delete_container(c.id).unwrap();
        let renamed = uow.rename_entity_type(platform.id, "site").unwrap();
        assert_eq!(renamed.name, "site");
    }

    #[tokio::test]
    async fn unreferenced_type_deletes() {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let t = uow.create_entity_type(CreateEntityType::new("clip")).unwrap();
        uow.delete_entity_type(t.id).unwrap();
        assert_matches!(
            uow.delete_entity_type(t.id),
            Err(CoreError::NotFound { entity: "entity_type", .. })
        );
    }
}
