//! OSM element kinds and typed references between elements.
//!
//! # Examples
//! ```
//! use wrangle_core::ElementKind;
//!
//! assert_eq!(ElementKind::Way.as_str(), "way");
//! assert_eq!("relation".parse::<ElementKind>(), Ok(ElementKind::Relation));
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three OpenStreetMap element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ElementKind {
    /// A single point with coordinates.
    Node,
    /// An ordered sequence of nodes.
    Way,
    /// A grouping of other elements with roles.
    Relation,
}

impl ElementKind {
    /// All kinds in canonical document order.
    pub const ALL: [Self; 3] = [Self::Node, Self::Way, Self::Relation];

    /// Return the kind as it appears in OSM XML and in the store.
    ///
    /// # Examples
    /// ```
    /// use wrangle_core::ElementKind;
    ///
    /// assert_eq!(ElementKind::Node.as_str(), "node");
    /// ```
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name an element kind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown element kind '{0}'")]
pub struct UnknownElementKind(pub String);

impl std::str::FromStr for ElementKind {
    type Err = UnknownElementKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Self::Node),
            "way" => Ok(Self::Way),
            "relation" => Ok(Self::Relation),
            other => Err(UnknownElementKind(other.to_owned())),
        }
    }
}

/// Identifier of an element, qualified by its kind.
///
/// OSM identifiers are only unique within a kind, so a node and a way may
/// share the same numeric id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityRef {
    /// Kind of the referenced element.
    pub kind: ElementKind,
    /// Raw OSM identifier. Negative values occur in unsaved editor files.
    pub id: i64,
}

impl EntityRef {
    /// Construct a reference.
    #[must_use]
    pub const fn new(kind: ElementKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Reference a node.
    #[must_use]
    pub const fn node(id: i64) -> Self {
        Self::new(ElementKind::Node, id)
    }

    /// Reference a way.
    #[must_use]
    pub const fn way(id: i64) -> Self {
        Self::new(ElementKind::Way, id)
    }

    /// Reference a relation.
    #[must_use]
    pub const fn relation(id: i64) -> Self {
        Self::new(ElementKind::Relation, id)
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ElementKind::Node)]
    #[case(ElementKind::Way)]
    #[case(ElementKind::Relation)]
    fn parsing_accepts_display_form(#[case] kind: ElementKind) {
        assert_eq!(kind.to_string().parse::<ElementKind>(), Ok(kind));
    }

    #[rstest]
    fn parsing_rejects_unknown() {
        let err = "area".parse::<ElementKind>().unwrap_err();
        assert_eq!(err, UnknownElementKind("area".into()));
    }

    #[rstest]
    fn references_display_kind_and_id() {
        assert_eq!(EntityRef::way(42).to_string(), "way/42");
    }
}
