//! Relationship writes: single edges, bulk reorder and dynamic child runs.
//!
//! No two edges leaving the same parent may share an `order`. Every write
//! here checks that against the `(from, order)` index before touching it.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use cms_core::entity::EntityRef;
use cms_core::error::CoreError;
use cms_core::types::DbId;

use super::unit_of_work::{remove_links, replace_links, UnitOfWork};
use crate::models::relationship::{ContainerRelationship, CreateRelationship, EdgeOrder};
use crate::models::tag::TagTable;
use crate::signals::{relations, MutationEvent};

/// Tag value marking edges managed by [`UnitOfWork::set_dynamic_children`].
pub const DYNAMIC_TAG_VALUE: &str = "dynamic";

impl UnitOfWork {
    /// Create an edge `from -> to` at `order`.
    pub fn create_relationship(
        &mut self,
        input: CreateRelationship,
    ) -> Result<ContainerRelationship, CoreError> {
        self.load_container(input.from_id)?;
        self.load_container(input.to_id)?;
        self.check_order_free(input.from_id, input.order, None)?;

        let row = self.insert_relationship_row(input.from_id, input.to_id, input.order);
        self.emit(MutationEvent::Saved {
            entity: EntityRef::relationship(row.id),
            created: true,
        });
        if !input.tags.is_empty() {
            self.set_relationship_tags(row.id, &input.tags)?;
        }
        Ok(row)
    }

    /// Move one edge to a new order under the same parent.
    pub fn set_relationship_order(
        &mut self,
        id: DbId,
        order: i32,
    ) -> Result<ContainerRelationship, CoreError> {
        let row = self.load_relationship(id)?;
        if row.order == order {
            return Ok(row);
        }
        self.check_order_free(row.from_id, order, Some(id))?;
        let row = self.move_edge(id, order)?;
        self.emit(MutationEvent::Saved {
            entity: EntityRef::relationship(id),
            created: false,
        });
        Ok(row)
    }

    /// Replace an edge's tag set by value. Unknown values are skipped.
    pub fn set_relationship_tags(&mut self, id: DbId, values: &[String]) -> Result<(), CoreError> {
        self.load_relationship(id)?;
        let tag_ids = self.resolve_tag_values(TagTable::Content, values);
        replace_links(
            Arc::make_mut(&mut self.working.relationship_tag_links),
            id,
            &tag_ids,
        );
        self.emit(MutationEvent::M2mChanged {
            entity: EntityRef::relationship(id),
            relation: relations::RELATIONSHIP_TAGS,
        });
        Ok(())
    }

    pub fn delete_relationship(&mut self, id: DbId) -> Result<(), CoreError> {
        self.load_relationship(id)?;
        self.emit(MutationEvent::PreDeleted {
            entity: EntityRef::relationship(id),
        });
        self.drop_relationship_row(id);
        Ok(())
    }

    /// Apply a batch of new orders to edges of `parent` atomically.
    ///
    /// Every edge must leave `parent`, appear once, and the resulting
    /// orders (batch plus untouched edges) must be unique.
    pub fn reorder_children(
        &mut self,
        parent: DbId,
        batch: &[EdgeOrder],
    ) -> Result<Vec<ContainerRelationship>, CoreError> {
        self.load_container(parent)?;

        let mut requested: BTreeMap<DbId, i32> = BTreeMap::new();
        for item in batch {
            let edge = self.load_relationship(item.relationship_id)?;
            if edge.from_id != parent {
                return Err(CoreError::Validation(format!(
                    "Relationship {} does not leave container {parent}",
                    edge.id
                )));
            }
            if requested.insert(edge.id, item.order).is_some() {
                return Err(CoreError::Validation(format!(
                    "Relationship {} appears twice in the batch",
                    edge.id
                )));
            }
        }

        let mut seen = HashSet::new();
        for edge in self.working.outbound_edges(parent) {
            let order = requested.get(&edge.id).copied().unwrap_or(edge.order);
            if !seen.insert(order) {
                return Err(CoreError::Conflict(format!(
                    "Reorder would place two children of {parent} at order {order}"
                )));
            }
        }

        let changed: Vec<(DbId, i32)> = requested
            .into_iter()
            .filter(|(id, order)| {
                self.working
                    .relationship(*id)
                    .is_some_and(|r| r.order != *order)
            })
            .collect();
        self.move_edges(&changed)?;
        for (id, _) in &changed {
            self.emit(MutationEvent::Saved {
                entity: EntityRef::relationship(*id),
                created: false,
            });
        }

        Ok(self
            .working
            .outbound_edges(parent)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Replace the run of edges under `parent` tagged `tag_value` with
    /// edges to `children`, ordered from `start_order`.
    ///
    /// Children already linked by an untagged edge stay where they are and
    /// are skipped. Untagged edges at or past `start_order` are shifted by
    /// one constant amount so the new run fits. Returns the new edges.
    pub fn set_dynamic_children(
        &mut self,
        parent: DbId,
        children: &[DbId],
        start_order: i32,
        tag_value: &str,
    ) -> Result<Vec<ContainerRelationship>, CoreError> {
        self.load_container(parent)?;
        let tag_id = self
            .working
            .tag_by_value(tag_value)
            .map(|t| t.id)
            .ok_or_else(|| {
                CoreError::Validation(format!("Unknown relationship tag '{tag_value}'"))
            })?;
        for child in children {
            self.load_container(*child)?;
        }

        let outbound: Vec<ContainerRelationship> = self
            .working
            .outbound_edges(parent)
            .into_iter()
            .cloned()
            .collect();
        let (dynamic, fixed): (Vec<_>, Vec<_>) = outbound
            .into_iter()
            .partition(|e| self.working.relationship_has_tag_value(e.id, tag_value));

        let statically_linked: HashSet<DbId> = fixed.iter().map(|e| e.to_id).collect();
        let mut seen = HashSet::new();
        let new_children: Vec<DbId> = children
            .iter()
            .copied()
            .filter(|c| !statically_linked.contains(c) && seen.insert(*c))
            .collect();

        for edge in &dynamic {
            self.emit(MutationEvent::PreDeleted {
                entity: EntityRef::relationship(edge.id),
            });
            self.drop_relationship_row(edge.id);
        }

        if new_children.is_empty() {
            return Ok(Vec::new());
        }

        let run_len = i32::try_from(new_children.len())
            .map_err(|_| CoreError::Validation("Too many dynamic children".to_string()))?;
        let end_order = start_order
            .checked_add(run_len)
            .ok_or_else(|| CoreError::Validation("Dynamic run overflows order".to_string()))?;
        let to_shift: Vec<&ContainerRelationship> =
            fixed.iter().filter(|e| e.order >= start_order).collect();
        if let Some(min_order) = to_shift.iter().map(|e| e.order).min() {
            if min_order < end_order {
                let shift = end_order - min_order;
                let moves = to_shift
                    .iter()
                    .map(|e| {
                        e.order
                            .checked_add(shift)
                            .map(|o| (e.id, o))
                            .ok_or_else(|| CoreError::Validation("Shift overflows order".to_string()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                self.move_edges(&moves)?;
                for (id, _) in &moves {
                    self.emit(MutationEvent::Saved {
                        entity: EntityRef::relationship(*id),
                        created: false,
                    });
                }
            }
        }

        let mut created = Vec::with_capacity(new_children.len());
        for (child, order) in new_children.into_iter().zip(start_order..) {
            let row = self.insert_relationship_row(parent, child, order);
            Arc::make_mut(&mut self.working.relationship_tag_links).insert((row.id, tag_id));
            self.emit(MutationEvent::Saved {
                entity: EntityRef::relationship(row.id),
                created: true,
            });
            self.emit(MutationEvent::M2mChanged {
                entity: EntityRef::relationship(row.id),
                relation: relations::RELATIONSHIP_TAGS,
            });
            created.push(row);
        }
        tracing::debug!(
            parent,
            replaced = dynamic.len(),
            created = created.len(),
            "Dynamic children set"
        );
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Row helpers
    // -----------------------------------------------------------------------

    fn check_order_free(&self, from: DbId, order: i32, except: Option<DbId>) -> Result<(), CoreError> {
        match self.working.edge_at(from, order) {
            Some(edge) if Some(edge.id) != except => Err(CoreError::Conflict(format!(
                "Container {from} already has a child at order {order}"
            ))),
            _ => Ok(()),
        }
    }

    fn insert_relationship_row(&mut self, from: DbId, to: DbId, order: i32) -> ContainerRelationship {
        let id = self.working.next_id("container_relationships");
        let row = ContainerRelationship {
            id,
            from_id: from,
            to_id: to,
            order,
            created_date: self.now(),
        };
        Arc::make_mut(&mut self.working.edge_orders).insert((from, order), id);
        Arc::make_mut(&mut self.working.relationships).insert(id, row.clone());
        row
    }

    fn move_edge(&mut self, id: DbId, order: i32) -> Result<ContainerRelationship, CoreError> {
        self.move_edges(&[(id, order)])?;
        self.load_relationship(id)
    }

    /// Re-key several edges at once. Callers have checked the final orders
    /// are unique.
    fn move_edges(&mut self, moves: &[(DbId, i32)]) -> Result<(), CoreError> {
        let mut keys = BTreeSet::new();
        for (id, _) in moves {
            let edge = self.load_relationship(*id)?;
            keys.insert((edge.from_id, edge.order));
        }
        for key in &keys {
            Arc::make_mut(&mut self.working.edge_orders).remove(key);
        }
        for (id, order) in moves {
            if let Some(edge) = Arc::make_mut(&mut self.working.relationships).get_mut(id) {
                edge.order = *order;
                Arc::make_mut(&mut self.working.edge_orders)
                    .insert((edge.from_id, *order), *id);
            }
        }
        Ok(())
    }

    pub(super) fn drop_relationship_row(&mut self, id: DbId) {
        if let Some(edge) = Arc::make_mut(&mut self.working.relationships).remove(&id) {
            if self.working.edge_orders.get(&(edge.from_id, edge.order)) == Some(&id) {
                Arc::make_mut(&mut self.working.edge_orders)
                    .remove(&(edge.from_id, edge.order));
            }
            remove_links(Arc::make_mut(&mut self.working.relationship_tag_links), id);
        }
    }

    pub(crate) fn load_relationship(&self, id: DbId) -> Result<ContainerRelationship, CoreError> {
        self.working
            .relationship(id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "container_relationship",
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

    fn orders(uow: &UnitOfWork, parent: DbId) -> Vec<(DbId, i32)> {
        uow.tables()
            .outbound_edges(parent)
            .iter()
            .map(|e| (e.to_id, e.order))
            .collect()
    }

    fn assert_unique_orders(uow: &UnitOfWork, parent: DbId) {
        let mut seen = HashSet::new();
        for (_, order) in orders(uow, parent) {
            assert!(seen.insert(order), "duplicate order {order}");
        }
    }

    async fn setup(n: usize) -> (GraphStore, Vec<DbId>) {
        let store = GraphStore::new();
        let mut uow = store.begin().await;
        let ids = (0..n)
            .map(|i| {
                uow.create_container(CreateContainer::new(format!("c-{i}"), None))
                    .unwrap()
                    .id
            })
            .collect();
        uow.create_tag(CreateTag::new(DYNAMIC_TAG_VALUE)).unwrap();
        uow.commit();
        (store, ids)
    }

    // -- single edges --------------------------------------------------------

    #[tokio::test]
    async fn duplicate_order_under_one_parent_conflicts() {
        let (store, c) = setup(3).await;
        let mut uow = store.begin().await;
        uow.create_relationship(CreateRelationship::new(c[0], c[1], 1))
            .unwrap();
        assert_matches!(
            uow.create_relationship(CreateRelationship::new(c[0], c[2], 1)),
            Err(CoreError::Conflict(_))
        );
        // Other parents are independent.
        uow.create_relationship(CreateRelationship::new(c[1], c[2], 1))
            .unwrap();
    }

    #[tokio::test]
    async fn missing_endpoint_is_not_found() {
        let (store, c) = setup(1).await;
        let mut uow = store.begin().await;
        assert_matches!(
            uow.create_relationship(CreateRelationship::new(c[0], 999, 0)),
            Err(CoreError::NotFound { entity: "container", id: 999 })
        );
    }

    #[tokio::test]
    async fn moving_an_edge_frees_its_old_order() {
        let (store, c) = setup(3).await;
        let mut uow = store.begin().await;
        let e = uow
            .create_relationship(CreateRelationship::new(c[0], c[1], 1))
            .unwrap();
        uow.set_relationship_order(e.id, 5).unwrap();
        uow.create_relationship(CreateRelationship::new(c[0], c[2], 1))
            .unwrap();
        assert_eq!(orders(&uow, c[0]), vec![(c[2], 1), (c[1], 5)]);
    }

    // -- reorder_children ----------------------------------------------------

    #[tokio::test]
    async fn reorder_swaps_atomically() {
        let (store, c) = setup(3).await;
        let mut uow = store.begin().await;
        let a = uow
            .create_relationship(CreateRelationship::new(c[0], c[1], 0))
            .unwrap();
        let b = uow
            .create_relationship(CreateRelationship::new(c[0], c[2], 1))
            .unwrap();

        uow.reorder_children(
            c[0],
            &[
                EdgeOrder { relationship_id: a.id, order: 1 },
                EdgeOrder { relationship_id: b.id, order: 0 },
            ],
        )
        .unwrap();
        assert_eq!(orders(&uow, c[0]), vec![(c[2], 0), (c[1], 1)]);
        assert_unique_orders(&uow, c[0]);
    }

    #[tokio::test]
    async fn reorder_rejects_collisions_and_changes_nothing() {
        let (store, c) = setup(4).await;
        let mut uow = store.begin().await;
        let a = uow
            .create_relationship(CreateRelationship::new(c[0], c[1], 0))
            .unwrap();
        uow.create_relationship(CreateRelationship::new(c[0], c[2], 1))
            .unwrap();

        assert_matches!(
            uow.reorder_children(c[0], &[EdgeOrder { relationship_id: a.id, order: 1 }]),
            Err(CoreError::Conflict(_))
        );
        assert_eq!(orders(&uow, c[0]), vec![(c[1], 0), (c[2], 1)]);

        let foreign = uow
            .create_relationship(CreateRelationship::new(c[3], c[1], 0))
            .unwrap();
        assert_matches!(
            uow.reorder_children(c[0], &[EdgeOrder { relationship_id: foreign.id, order: 9 }]),
            Err(CoreError::Validation(_))
        );
    }

    // -- set_dynamic_children ------------------------------------------------

    #[tokio::test]
    async fn dynamic_run_pushes_static_edges_out() {
        let (store, c) = setup(6).await;
        let mut uow = store.begin().await;
        // Static children at 0, 1 and 2.
        for (i, child) in [c[1], c[2], c[3]].into_iter().enumerate() {
            uow.create_relationship(CreateRelationship::new(c[0], child, i as i32))
                .unwrap();
        }

        let created = uow
            .set_dynamic_children(c[0], &[c[4], c[5]], 1, DYNAMIC_TAG_VALUE)
            .unwrap();
        assert_eq!(created.len(), 2);
        // Static edges at >= 1 shift by (1 + 2) - 1 = 2.
        assert_eq!(
            orders(&uow, c[0]),
            vec![(c[1], 0), (c[4], 1), (c[5], 2), (c[2], 3), (c[3], 4)]
        );
        assert_unique_orders(&uow, c[0]);
    }

    #[tokio::test]
    async fn dynamic_run_replaces_previous_run_and_skips_static_children() {
        let (store, c) = setup(5).await;
        let mut uow = store.begin().await;
        uow.create_relationship(CreateRelationship::new(c[0], c[1], 0))
            .unwrap();
        uow.set_dynamic_children(c[0], &[c[2], c[3]], 10, DYNAMIC_TAG_VALUE)
            .unwrap();

        // c[1] is statically linked and stays; c[2] and c[3] are replaced.
        let created = uow
            .set_dynamic_children(c[0], &[c[1], c[4]], 10, DYNAMIC_TAG_VALUE)
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(orders(&uow, c[0]), vec![(c[1], 0), (c[4], 10)]);
        assert!(uow
            .tables()
            .relationship_has_tag_value(created[0].id, DYNAMIC_TAG_VALUE));
    }

    #[tokio::test]
    async fn empty_dynamic_run_only_clears() {
        let (store, c) = setup(3).await;
        let mut uow = store.begin().await;
        uow.set_dynamic_children(c[0], &[c[1], c[2]], 0, DYNAMIC_TAG_VALUE)
            .unwrap();
        uow.set_dynamic_children(c[0], &[], 0, DYNAMIC_TAG_VALUE)
            .unwrap();
        assert!(orders(&uow, c[0]).is_empty());
    }

    #[tokio::test]
    async fn dynamic_tag_must_exist() {
        let (store, c) = setup(2).await;
        let mut uow = store.begin().await;
        assert_matches!(
            uow.set_dynamic_children(c[0], &[c[1]], 0, "curated"),
            Err(CoreError::Validation(_))
        );
    }
}
