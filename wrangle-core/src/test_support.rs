//! In-memory `EntityStore` implementation used by unit and behaviour tests.

use std::collections::BTreeMap;
use std::convert::Infallible;

use crate::{ElementKind, Entity, EntityRef, EntityStore, RelationMember, ShapedElement, Tag};

/// In-memory `EntityStore` implementation used in tests.
///
/// Rows are held in ordered maps; lookups are linear and intended only for
/// small datasets.
#[derive(Default, Debug)]
pub struct MemoryStore {
    elements: BTreeMap<EntityRef, ShapedElement>,
}

impl MemoryStore {
    /// Create a store from shaped elements. Later duplicates replace earlier
    /// ones.
    pub fn with_elements<I>(elements: I) -> Self
    where
        I: IntoIterator<Item = ShapedElement>,
    {
        Self {
            elements: elements
                .into_iter()
                .map(|element| (element.entity.reference(), element))
                .collect(),
        }
    }
}

impl EntityStore for MemoryStore {
    type Error = Infallible;

    fn entity(&self, reference: EntityRef) -> Result<Option<Entity>, Self::Error> {
        Ok(self
            .elements
            .get(&reference)
            .map(|element| element.entity.clone()))
    }

    fn tags(&self, reference: EntityRef) -> Result<Vec<Tag>, Self::Error> {
        let mut tags = self
            .elements
            .get(&reference)
            .map(|element| element.tags.clone())
            .unwrap_or_default();
        tags.sort_by(|left, right| left.key.cmp(&right.key));
        Ok(tags)
    }

    fn way_node_ids(&self, way_id: i64) -> Result<Vec<i64>, Self::Error> {
        let mut members = self
            .elements
            .get(&EntityRef::way(way_id))
            .map(|element| element.way_members.clone())
            .unwrap_or_default();
        members.sort_by_key(|member| member.position);
        Ok(members.into_iter().map(|member| member.node_id).collect())
    }

    fn relation_members(&self, relation_id: i64) -> Result<Vec<RelationMember>, Self::Error> {
        let mut members = self
            .elements
            .get(&EntityRef::relation(relation_id))
            .map(|element| element.relation_members.clone())
            .unwrap_or_default();
        members.sort_by_key(|member| member.position);
        Ok(members)
    }

    fn count(&self, kind: ElementKind) -> Result<u64, Self::Error> {
        let count = self.elements.keys().filter(|key| key.kind == kind).count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    fn dangling_member_count(&self) -> Result<u64, Self::Error> {
        let dangling = self
            .elements
            .values()
            .flat_map(ShapedElement::member_targets)
            .filter(|target| !self.elements.contains_key(target))
            .count();
        Ok(u64::try_from(dangling).unwrap_or(u64::MAX))
    }
}
