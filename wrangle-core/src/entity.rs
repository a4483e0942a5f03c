//! Entity rows: one per node, way or relation, with edit metadata.

use geo::Coord;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{ElementKind, EntityRef};

/// Edit metadata carried by every OSM element.
///
/// All fields are optional: many extracts strip authorship information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityMetadata {
    /// Element version, starting at 1.
    pub version: Option<u32>,
    /// Changeset that last touched the element.
    pub changeset: Option<i64>,
    /// ISO-8601 timestamp of the last edit, kept verbatim.
    pub timestamp: Option<String>,
    /// Display name of the last author.
    pub user: Option<String>,
    /// Numeric id of the last author.
    pub uid: Option<i64>,
}

/// A node, way or relation row.
///
/// Coordinates are WGS84 with `x = longitude` and `y = latitude` and are only
/// present on nodes.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use wrangle_core::{ElementKind, Entity, EntityMetadata};
///
/// let node = Entity::node(1, Some(Coord { x: -0.40, y: 51.40 }), EntityMetadata::default());
/// assert_eq!(node.kind, ElementKind::Node);
/// assert_eq!(node.lat(), Some(51.40));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Entity {
    /// Element kind.
    pub kind: ElementKind,
    /// Raw OSM identifier, unique within `kind`.
    pub id: i64,
    /// Geographic position, nodes only.
    pub location: Option<Coord<f64>>,
    /// Edit metadata.
    pub metadata: EntityMetadata,
}

impl Entity {
    /// Construct a node row.
    #[must_use]
    pub const fn node(id: i64, location: Option<Coord<f64>>, metadata: EntityMetadata) -> Self {
        Self {
            kind: ElementKind::Node,
            id,
            location,
            metadata,
        }
    }

    /// Construct a way or relation row, which never carries coordinates.
    #[must_use]
    pub const fn without_location(kind: ElementKind, id: i64, metadata: EntityMetadata) -> Self {
        Self {
            kind,
            id,
            location: None,
            metadata,
        }
    }

    /// Typed reference to this entity.
    #[must_use]
    pub const fn reference(&self) -> EntityRef {
        EntityRef::new(self.kind, self.id)
    }

    /// Latitude in degrees, if known.
    #[must_use]
    pub fn lat(&self) -> Option<f64> {
        self.location.map(|coord| coord.y)
    }

    /// Longitude in degrees, if known.
    #[must_use]
    pub fn lon(&self) -> Option<f64> {
        self.location.map(|coord| coord.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ways_have_no_coordinates() {
        let way = Entity::without_location(ElementKind::Way, 7, EntityMetadata::default());
        assert_eq!(way.reference(), EntityRef::way(7));
        assert_eq!(way.lon(), None);
    }
}
