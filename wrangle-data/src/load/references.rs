//! Bookkeeping for referential integrity across batches.

use std::collections::{HashMap, HashSet};

use rusqlite::Connection;
use serde::Serialize;
use wrangle_core::{ElementKind, EntityRef, RelationMember, ShapedElement, WayMember};

/// A membership row whose target is not (yet) stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DanglingReference {
    /// The way or relation owning the row.
    pub source: EntityRef,
    /// The missing element.
    pub target: EntityRef,
    /// Position of the row within its owner.
    pub position: u32,
}

impl std::fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}] -> {}", self.source, self.position, self.target)
    }
}

/// A membership row held back until its target is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MemberRow {
    Way(WayMember),
    Relation(RelationMember),
}

impl MemberRow {
    pub(crate) fn target(&self) -> EntityRef {
        match self {
            Self::Way(member) => member.target(),
            Self::Relation(member) => member.target(),
        }
    }

    pub(crate) fn dangling(&self) -> DanglingReference {
        match self {
            Self::Way(member) => DanglingReference {
                source: EntityRef::way(member.way_id),
                target: member.target(),
                position: member.position,
            },
            Self::Relation(member) => DanglingReference {
                source: EntityRef::relation(member.relation_id),
                target: member.target(),
                position: member.position,
            },
        }
    }

    /// Every membership row of `element`, in document order.
    pub(crate) fn of(element: &ShapedElement) -> impl Iterator<Item = Self> + '_ {
        element
            .way_members
            .iter()
            .cloned()
            .map(Self::Way)
            .chain(element.relation_members.iter().cloned().map(Self::Relation))
    }
}

/// Identifiers of every committed entity.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReferenceIndex {
    committed: HashSet<EntityRef>,
}

impl ReferenceIndex {
    /// Seed the index from an existing `entities` table.
    pub(crate) fn from_connection(connection: &Connection) -> rusqlite::Result<Self> {
        let mut statement = connection.prepare("SELECT kind, id FROM entities")?;
        let mut rows = statement.query([])?;
        let mut committed = HashSet::new();
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            if let Ok(kind) = kind.parse::<ElementKind>() {
                committed.insert(EntityRef::new(kind, row.get(1)?));
            }
        }
        Ok(Self { committed })
    }

    pub(crate) fn contains(&self, reference: &EntityRef) -> bool {
        self.committed.contains(reference)
    }

    pub(crate) fn extend(&mut self, references: impl IntoIterator<Item = EntityRef>) {
        self.committed.extend(references);
    }

    pub(crate) fn len(&self) -> usize {
        self.committed.len()
    }
}

/// Rows buffered in deferred mode, keyed by the element they wait for.
#[derive(Debug, Clone, Default)]
pub(crate) struct DeferredMembers {
    waiting: HashMap<EntityRef, Vec<MemberRow>>,
    len: usize,
}

impl DeferredMembers {
    pub(crate) fn push(&mut self, row: MemberRow) {
        self.waiting.entry(row.target()).or_default().push(row);
        self.len += 1;
    }

    pub(crate) fn extend(&mut self, rows: impl IntoIterator<Item = MemberRow>) {
        for row in rows {
            self.push(row);
        }
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Split the buffer into rows whose target is now committed and rows that
    /// remain dangling.
    pub(crate) fn resolve(self, index: &ReferenceIndex) -> (Vec<MemberRow>, Vec<MemberRow>) {
        let mut resolved = Vec::new();
        let mut unresolved = Vec::new();
        for (target, rows) in self.waiting {
            if index.contains(&target) {
                resolved.extend(rows);
            } else {
                unresolved.extend(rows);
            }
        }
        let order = |row: &MemberRow| (row.dangling().source, row.dangling().position);
        resolved.sort_by_key(order);
        unresolved.sort_by_key(order);
        (resolved, unresolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn way_row(way_id: i64, node_id: i64, position: u32) -> MemberRow {
        MemberRow::Way(WayMember {
            way_id,
            node_id,
            position,
        })
    }

    #[rstest]
    fn resolves_rows_whose_targets_arrive() {
        let mut deferred = DeferredMembers::default();
        deferred.push(way_row(10, 99, 2));
        deferred.push(way_row(11, 98, 0));
        deferred.push(way_row(10, 98, 3));
        assert_eq!(deferred.len(), 3);

        let mut index = ReferenceIndex::default();
        index.extend([EntityRef::node(99)]);
        let (resolved, unresolved) = deferred.resolve(&index);

        assert_eq!(resolved, vec![way_row(10, 99, 2)]);
        assert_eq!(unresolved, vec![way_row(10, 98, 3), way_row(11, 98, 0)]);
    }

    #[rstest]
    fn describes_dangling_rows() {
        let dangling = way_row(10, 99, 2).dangling();
        assert_eq!(dangling.to_string(), "way/10[2] -> node/99");
    }
}
