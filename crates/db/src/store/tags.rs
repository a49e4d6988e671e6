//! Tag and resource tag writes.
//!
//! Both tables share one implementation keyed by [`TagTable`]; each keeps
//! its own `value` uniqueness domain.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use cms_core::entity::{EntityKind, EntityRef};
use cms_core::error::CoreError;
use cms_core::types::DbId;

use super::unit_of_work::{check_len, check_required, remove_tag_links, UnitOfWork};
use crate::models::tag::{CreateTag, Tag, TagTable, UpdateTag};
use crate::models::{DEFAULT_ORIGIN, MAX_TEXT_LEN};
use crate::signals::MutationEvent;

impl TagTable {
    fn kind(self) -> EntityKind {
        match self {
            Self::Content => EntityKind::Tag,
            Self::Resource => EntityKind::ResourceTag,
        }
    }

    fn sequence(self) -> &'static str {
        match self {
            Self::Content => "tags",
            Self::Resource => "resource_tags",
        }
    }
}

impl UnitOfWork {
    // -----------------------------------------------------------------------
    // Content tags
    // -----------------------------------------------------------------------

    /// Create a tag. A duplicate `value` is a [`CoreError::Conflict`].
    pub fn create_tag(&mut self, input: CreateTag) -> Result<Tag, CoreError> {
        self.insert_tag(TagTable::Content, input)
    }

    /// Return the tag with `input.value`, creating it if absent.
    ///
    /// The flag is `true` when a new row was created.
    pub fn get_or_create_tag(&mut self, input: CreateTag) -> Result<(Tag, bool), CoreError> {
        self.get_or_insert_tag(TagTable::Content, input)
    }

    pub fn update_tag(&mut self, id: DbId, patch: UpdateTag) -> Result<Tag, CoreError> {
        self.patch_tag(TagTable::Content, id, patch)
    }

    /// Delete a tag and detach it from every container and relationship.
    pub fn delete_tag(&mut self, id: DbId) -> Result<(), CoreError> {
        self.remove_tag(TagTable::Content, id)
    }

    // -----------------------------------------------------------------------
    // Resource tags
    // -----------------------------------------------------------------------

    /// Create a resource tag. A duplicate `value` is a
    /// [`CoreError::Conflict`].
    pub fn create_resource_tag(&mut self, input: CreateTag) -> Result<Tag, CoreError> {
        self.insert_tag(TagTable::Resource, input)
    }

    pub fn get_or_create_resource_tag(
        &mut self,
        input: CreateTag,
    ) -> Result<(Tag, bool), CoreError> {
        self.get_or_insert_tag(TagTable::Resource, input)
    }

    pub fn update_resource_tag(&mut self, id: DbId, patch: UpdateTag) -> Result<Tag, CoreError> {
        self.patch_tag(TagTable::Resource, id, patch)
    }

    /// Delete a resource tag and detach it from every resource.
    pub fn delete_resource_tag(&mut self, id: DbId) -> Result<(), CoreError> {
        self.remove_tag(TagTable::Resource, id)
    }

    // -----------------------------------------------------------------------
    // Shared implementation
    // -----------------------------------------------------------------------

    fn insert_tag(&mut self, table: TagTable, input: CreateTag) -> Result<Tag, CoreError> {
        check_required("value", &input.value, MAX_TEXT_LEN)?;
        check_len("type", &input.tag_type, MAX_TEXT_LEN)?;
        check_len("label", &input.label, MAX_TEXT_LEN)?;
        let origin = input.origin.unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        check_len("origin", &origin, MAX_TEXT_LEN)?;
        if self.working.tag_by_value_in(table, &input.value).is_some() {
            return Err(CoreError::Conflict(format!(
                "A {} with value '{}' already exists",
                table.kind(),
                input.value
            )));
        }

        let now = self.now();
        let id = self.working.next_id(table.sequence());
        let row = Tag {
            id,
            tag_type: input.tag_type,
            origin,
            label: input.label,
            value: input.value,
            data: input.data,
            created_date: now,
            updated_date: now,
        };
        let (rows, values) = self.tag_table_mut(table);
        values.insert(row.value.clone(), id);
        rows.insert(id, row.clone());

        self.emit(MutationEvent::Saved {
            entity: EntityRef::new(table.kind(), id),
            created: true,
        });
        Ok(row)
    }

    fn get_or_insert_tag(
        &mut self,
        table: TagTable,
        input: CreateTag,
    ) -> Result<(Tag, bool), CoreError> {
        if let Some(existing) = self.working.tag_by_value_in(table, &input.value) {
            return Ok((existing.clone(), false));
        }
        self.insert_tag(table, input).map(|t| (t, true))
    }

    fn patch_tag(&mut self, table: TagTable, id: DbId, patch: UpdateTag) -> Result<Tag, CoreError> {
        let mut row = self
            .working
            .tag_in(table, id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: table.kind().as_str(),
                id,
            })?;
        let old_value = row.value.clone();

        if let Some(value) = patch.value {
            check_required("value", &value, MAX_TEXT_LEN)?;
            if value != old_value && self.working.tag_by_value_in(table, &value).is_some() {
                return Err(CoreError::Conflict(format!(
                    "A {} with value '{value}' already exists",
                    table.kind()
                )));
            }
            row.value = value;
        }
        if let Some(tag_type) = patch.tag_type {
            check_len("type", &tag_type, MAX_TEXT_LEN)?;
            row.tag_type = tag_type;
        }
        if let Some(origin) = patch.origin {
            check_len("origin", &origin, MAX_TEXT_LEN)?;
            row.origin = origin;
        }
        if let Some(label) = patch.label {
            check_len("label", &label, MAX_TEXT_LEN)?;
            row.label = label;
        }
        if patch.data.is_some() {
            row.data = patch.data;
        }
        row.updated_date = self.now();

        let (rows, values) = self.tag_table_mut(table);
        values.remove(&old_value);
        values.insert(row.value.clone(), id);
        rows.insert(id, row.clone());

        self.emit(MutationEvent::Saved {
            entity: EntityRef::new(table.kind(), id),
            created: false,
        });
        Ok(row)
    }

    fn remove_tag(&mut self, table: TagTable, id: DbId) -> Result<(), CoreError> {
        let value = self
            .working
            .tag_in(table, id)
            .map(|t| t.value.clone())
            .ok_or(CoreError::NotFound {
                entity: table.kind().as_str(),
                id,
            })?;

        self.emit(MutationEvent::PreDeleted {
            entity: EntityRef::new(table.kind(), id),
        });

        match table {
            TagTable::Content => {
                remove_tag_links(Arc::make_mut(&mut self.working.container_tag_links), id);
                remove_tag_links(Arc::make_mut(&mut self.working.relationship_tag_links), id);
            }
            TagTable::Resource => {
                remove_tag_links(Arc::make_mut(&mut self.working.resource_tag_links), id)
            }
        }
        let (rows, values) = self.tag_table_mut(table);
        values.remove(&value);
        rows.remove(&id);
        Ok(())
    }

    fn tag_table_mut(
        &mut self,
        table: TagTable,
    ) -> (&mut BTreeMap<DbId, Tag>, &mut HashMap<String, DbId>) {
        match table {
            TagTable::Content => (
                Arc::make_mut(&mut self.working.tags),
                Arc::make_mut(&mut self.working.tag_values),
            ),
            TagTable::Resource => (
                Arc::make_mut(&mut self.working.resource_tags),
                Arc::make_mut(&mut self.working.resource_tag_values),
            ),
        }
    }
}
