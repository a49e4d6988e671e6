//! Segment writes and range index maintenance.

use std::sync::Arc;

use cms_core::entity::EntityRef;
use cms_core::error::CoreError;
use cms_core::types::DbId;

use super::unit_of_work::{check_len, check_required, UnitOfWork};
use crate::models::segment::{CreateSegment, Segment, UpdateSegment};
use crate::models::{DEFAULT_ORIGIN, DEFAULT_STATUS, MAX_TEXT_LEN};
use crate::signals::MutationEvent;

fn check_bounds(segment: &Segment) -> Result<(), CoreError> {
    if segment.start_time_code > segment.end_time_code {
        return Err(CoreError::Validation(format!(
            "Segment starts at {} after it ends at {}",
            segment.start_time_code, segment.end_time_code
        )));
    }
    Ok(())
}

fn check_text_fields(segment: &Segment) -> Result<(), CoreError> {
    check_required("type", &segment.segment_type, MAX_TEXT_LEN)?;
    check_len("namespace", &segment.namespace, MAX_TEXT_LEN)?;
    check_len("status", &segment.status, MAX_TEXT_LEN)?;
    check_len("origin", &segment.origin, MAX_TEXT_LEN)?;
    check_len("label", &segment.label, MAX_TEXT_LEN)?;
    check_len("value", &segment.value, MAX_TEXT_LEN)
}

impl UnitOfWork {
    /// Create a segment on a parent container. Without a `guid`, a random
    /// UUID is assigned.
    pub fn create_segment(&mut self, input: CreateSegment) -> Result<Segment, CoreError> {
        self.load_container(input.parent_id)?;
        let guid = input
            .guid
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        check_required("guid", &guid, MAX_TEXT_LEN)?;
        if self.working.segment_by_guid(&guid).is_some() {
            return Err(CoreError::Conflict(format!(
                "A segment with guid '{guid}' already exists"
            )));
        }

        let now = self.now();
        let row = Segment {
            id: 0,
            parent_id: input.parent_id,
            guid,
            segment_type: input.segment_type,
            namespace: input.namespace,
            status: input.status.unwrap_or_else(|| DEFAULT_STATUS.to_string()),
            origin: input.origin.unwrap_or_else(|| DEFAULT_ORIGIN.to_string()),
            label: input.label,
            value: input.value,
            data: input
                .data
                .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            start_time_code: input.start_time_code,
            end_time_code: input.end_time_code,
            created_date: now,
            updated_date: now,
            published_date: input.published_date,
            expiration_date: input.expiration_date,
        };
        check_text_fields(&row)?;
        check_bounds(&row)?;

        let row = Segment {
            id: self.working.next_id("segments"),
            ..row
        };
        self.index_segment(&row);
        Arc::make_mut(&mut self.working.segments).insert(row.id, row.clone());
        self.emit(MutationEvent::Saved {
            entity: EntityRef::segment(row.id),
            created: true,
        });
        Ok(row)
    }

    pub fn update_segment(&mut self, id: DbId, patch: UpdateSegment) -> Result<Segment, CoreError> {
        let old = self.load_segment(id)?;
        let mut row = old.clone();

        if let Some(v) = patch.segment_type {
            row.segment_type = v;
        }
        if let Some(v) = patch.namespace {
            row.namespace = v;
        }
        if let Some(v) = patch.status {
            row.status = v;
        }
        if let Some(v) = patch.label {
            row.label = v;
        }
        if let Some(v) = patch.value {
            row.value = v;
        }
        if let Some(v) = patch.data {
            row.data = v;
        }
        if let Some(v) = patch.start_time_code {
            row.start_time_code = v;
        }
        if let Some(v) = patch.end_time_code {
            row.end_time_code = v;
        }
        if patch.published_date.is_some() {
            row.published_date = patch.published_date;
        }
        if patch.expiration_date.is_some() {
            row.expiration_date = patch.expiration_date;
        }
        check_text_fields(&row)?;
        check_bounds(&row)?;
        row.updated_date = self.now();

        self.unindex_segment(&old);
        self.index_segment(&row);
        Arc::make_mut(&mut self.working.segments).insert(id, row.clone());
        self.emit(MutationEvent::Saved {
            entity: EntityRef::segment(id),
            created: false,
        });
        Ok(row)
    }

    /// Delete a segment and the resources attached to it.
    pub fn delete_segment(&mut self, id: DbId) -> Result<Vec<EntityRef>, CoreError> {
        self.load_segment(id)?;
        let mut doomed = vec![EntityRef::segment(id)];
        doomed.extend(
            self.working
                .resources_owned_by(EntityRef::segment(id))
                .iter()
                .map(|r| EntityRef::resource(r.id)),
        );
        for entity in &doomed {
            self.emit(MutationEvent::PreDeleted { entity: *entity });
        }
        for entity in &doomed[1..] {
            self.drop_resource_row(entity.id)?;
        }
        self.drop_segment_row(id);
        Ok(doomed)
    }

    pub(super) fn drop_segment_row(&mut self, id: DbId) {
        if let Some(row) = Arc::make_mut(&mut self.working.segments).remove(&id) {
            self.unindex_segment(&row);
        }
    }

    fn index_segment(&mut self, row: &Segment) {
        Arc::make_mut(&mut self.working.segment_guids).insert(row.guid.clone(), row.id);
        Arc::make_mut(&mut self.working.segment_starts).insert((
            row.parent_id,
            row.segment_type.clone(),
            row.start_time_code,
            row.id,
        ));
        Arc::make_mut(&mut self.working.segment_ends).insert((
            row.parent_id,
            row.segment_type.clone(),
            row.end_time_code,
            row.id,
        ));
    }

    fn unindex_segment(&mut self, row: &Segment) {
        Arc::make_mut(&mut self.working.segment_guids).remove(&row.guid);
        Arc::make_mut(&mut self.working.segment_starts).remove(&(
            row.parent_id,
            row.segment_type.clone(),
            row.start_time_code,
            row.id,
        ));
        Arc::make_mut(&mut self.working.segment_ends).remove(&(
            row.parent_id,
            row.segment_type.clone(),
            row.end_time_code,
            row.id,
        ));
    }

    pub(crate) fn load_segment(&self, id: DbId) -> Result<Segment, CoreError> {
        self.working
            .segment(id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "segment",
                id,
            })
    }
}
