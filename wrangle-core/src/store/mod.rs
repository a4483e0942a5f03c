//! Read access to an ingested extract.
//!
//! The `EntityStore` trait is the read side of the relational store the
//! loader populates. Consumers use it to read entities back, recover way
//! geometry in position order and verify referential integrity after a run.

use crate::{ElementKind, Entity, EntityRef, RelationMember, Tag};

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::{SqliteEntityStore, SqliteEntityStoreError};

/// Read-only access to ingested entities and their rows.
///
/// # Examples
///
/// ```rust
/// use wrangle_core::{ElementKind, Entity, EntityMetadata, EntityStore, ShapedElement, WayMember};
/// use wrangle_core::test_support::MemoryStore;
///
/// let way = Entity::without_location(ElementKind::Way, 5, EntityMetadata::default());
/// let mut shaped = ShapedElement::new(way);
/// shaped.way_members.push(WayMember { way_id: 5, node_id: 2, position: 1 });
/// shaped.way_members.push(WayMember { way_id: 5, node_id: 1, position: 0 });
/// let store = MemoryStore::with_elements([shaped]);
///
/// assert_eq!(store.way_node_ids(5).unwrap(), vec![1, 2]);
/// ```
pub trait EntityStore {
    /// Error raised by the backing storage.
    type Error: std::error::Error;

    /// Fetch a single entity row.
    fn entity(&self, reference: EntityRef) -> Result<Option<Entity>, Self::Error>;

    /// All tags of an entity, ordered by key.
    fn tags(&self, reference: EntityRef) -> Result<Vec<Tag>, Self::Error>;

    /// Node identifiers of a way, ordered by position.
    fn way_node_ids(&self, way_id: i64) -> Result<Vec<i64>, Self::Error>;

    /// Members of a relation, ordered by position.
    fn relation_members(&self, relation_id: i64) -> Result<Vec<RelationMember>, Self::Error>;

    /// Number of stored entities of the given kind.
    fn count(&self, kind: ElementKind) -> Result<u64, Self::Error>;

    /// Number of membership rows whose target entity is absent.
    ///
    /// A successful run leaves this at zero.
    fn dangling_member_count(&self) -> Result<u64, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::EntityStore;
    use crate::test_support::MemoryStore;
    use crate::{
        ElementKind, Entity, EntityMetadata, EntityRef, RelationMember, ShapedElement, WayMember,
    };
    use rstest::{fixture, rstest};

    #[fixture]
    fn store() -> MemoryStore {
        let node = ShapedElement::new(Entity::node(1, None, EntityMetadata::default()));
        let mut way =
            ShapedElement::new(Entity::without_location(ElementKind::Way, 2, EntityMetadata::default()));
        way.way_members = vec![
            WayMember { way_id: 2, node_id: 1, position: 0 },
            WayMember { way_id: 2, node_id: 9, position: 1 },
        ];
        let mut relation = ShapedElement::new(Entity::without_location(
            ElementKind::Relation,
            3,
            EntityMetadata::default(),
        ));
        relation.relation_members = vec![RelationMember {
            relation_id: 3,
            member: EntityRef::way(2),
            role: "outer".into(),
            position: 0,
        }];
        MemoryStore::with_elements([node, way, relation])
    }

    #[rstest]
    fn counts_entities_per_kind(store: MemoryStore) {
        assert_eq!(store.count(ElementKind::Node).unwrap(), 1);
        assert_eq!(store.count(ElementKind::Way).unwrap(), 1);
        assert_eq!(store.count(ElementKind::Relation).unwrap(), 1);
    }

    #[rstest]
    fn reports_dangling_members(store: MemoryStore) {
        assert_eq!(store.dangling_member_count().unwrap(), 1);
    }

    #[rstest]
    fn returns_relation_members_in_order(store: MemoryStore) {
        let members = store.relation_members(3).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].member, EntityRef::way(2));
    }

    #[rstest]
    fn missing_entities_are_none(store: MemoryStore) {
        assert!(store.entity(EntityRef::node(404)).unwrap().is_none());
    }
}
