//! Membership rows linking ways and relations to the elements they use.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Entity, EntityRef, Tag};

/// One node reference of a way.
///
/// `position` is the zero-based index of the reference in the source way and
/// defines the way's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WayMember {
    /// Owning way.
    pub way_id: i64,
    /// Referenced node.
    pub node_id: i64,
    /// Zero-based position within the way.
    pub position: u32,
}

impl WayMember {
    /// The node this row points at.
    #[must_use]
    pub const fn target(&self) -> EntityRef {
        EntityRef::node(self.node_id)
    }
}

/// One member of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RelationMember {
    /// Owning relation.
    pub relation_id: i64,
    /// Referenced element.
    pub member: EntityRef,
    /// Free-form role label; empty when the source omits it.
    pub role: String,
    /// Zero-based position within the relation.
    pub position: u32,
}

impl RelationMember {
    /// The element this row points at.
    #[must_use]
    pub const fn target(&self) -> EntityRef {
        self.member
    }
}

/// All rows derived from a single OSM element.
///
/// # Examples
/// ```
/// use wrangle_core::{ElementKind, Entity, EntityMetadata, ShapedElement, WayMember};
///
/// let way = Entity::without_location(ElementKind::Way, 10, EntityMetadata::default());
/// let mut shaped = ShapedElement::new(way);
/// shaped.way_members.push(WayMember { way_id: 10, node_id: 1, position: 0 });
///
/// assert_eq!(shaped.member_targets().count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShapedElement {
    /// The entity row.
    pub entity: Entity,
    /// Cleaned tags, keys unique.
    pub tags: Vec<Tag>,
    /// Node references, ways only.
    pub way_members: Vec<WayMember>,
    /// Members, relations only.
    pub relation_members: Vec<RelationMember>,
}

impl ShapedElement {
    /// Wrap an entity with no tags or members.
    #[must_use]
    pub const fn new(entity: Entity) -> Self {
        Self {
            entity,
            tags: Vec::new(),
            way_members: Vec::new(),
            relation_members: Vec::new(),
        }
    }

    /// Every element referenced by this element's membership rows.
    pub fn member_targets(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.way_members
            .iter()
            .map(WayMember::target)
            .chain(self.relation_members.iter().map(RelationMember::target))
    }
}
