//! SQLite-backed read access to an ingested extract.

use std::{
    borrow::Borrow,
    fmt,
    path::{Path, PathBuf},
};

use geo::Coord;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use thiserror::Error;

use crate::{
    CleaningFlag, ElementKind, Entity, EntityMetadata, EntityRef, RelationMember, Tag,
};

use super::EntityStore;

/// Error raised when reading an ingested extract from SQLite.
#[derive(Debug, Error)]
pub enum SqliteEntityStoreError {
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}: {source}")]
    OpenDatabase {
        /// Location of the SQLite database on disk.
        path: PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A stored kind column held an unknown value.
    #[error("stored element kind '{value}' is not node, way or relation")]
    InvalidKind {
        /// The offending column value.
        value: String,
    },
    /// A stored flag column held an unknown value.
    #[error("stored cleaning flag '{value}' is not recognised")]
    InvalidFlag {
        /// The offending column value.
        value: String,
    },
    /// Generic SQLite error when reading rows.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

/// Read-only entity store over the loader's schema.
///
/// The store borrows or owns a [`Connection`], so tests can inspect the same
/// in-memory database the loader wrote to.
pub struct SqliteEntityStore<C = Connection> {
    connection: C,
}

impl<C> fmt::Debug for SqliteEntityStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteEntityStore").finish_non_exhaustive()
    }
}

impl SqliteEntityStore<Connection> {
    /// Open an ingested database read-only.
    pub fn open<P>(database_path: P) -> Result<Self, SqliteEntityStoreError>
    where
        P: AsRef<Path>,
    {
        let database_path = database_path.as_ref();
        let connection =
            Connection::open_with_flags(database_path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(
                |source| SqliteEntityStoreError::OpenDatabase {
                    path: database_path.to_path_buf(),
                    source,
                },
            )?;
        Ok(Self { connection })
    }
}

impl<C: Borrow<Connection>> SqliteEntityStore<C> {
    /// Wrap an existing connection.
    pub const fn new(connection: C) -> Self {
        Self { connection }
    }

    fn connection(&self) -> &Connection {
        self.connection.borrow()
    }
}

impl<C: Borrow<Connection>> EntityStore for SqliteEntityStore<C> {
    type Error = SqliteEntityStoreError;

    fn entity(&self, reference: EntityRef) -> Result<Option<Entity>, Self::Error> {
        let row = self
            .connection()
            .query_row(
                "SELECT lat, lon, version, changeset, timestamp, user, uid
                 FROM entities WHERE kind = ?1 AND id = ?2",
                (reference.kind.as_str(), reference.id),
                read_entity_columns,
            )
            .optional()?;
        Ok(row.map(|(location, metadata)| Entity {
            kind: reference.kind,
            id: reference.id,
            location,
            metadata,
        }))
    }

    fn tags(&self, reference: EntityRef) -> Result<Vec<Tag>, Self::Error> {
        let mut statement = self.connection().prepare_cached(
            "SELECT key, value, key_type, flag FROM entity_tags
             WHERE entity_kind = ?1 AND entity_id = ?2 ORDER BY key",
        )?;
        let mut rows = statement.query((reference.kind.as_str(), reference.id))?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next()? {
            let flag: Option<String> = row.get(3)?;
            let flag = flag
                .map(|value| {
                    value
                        .parse::<CleaningFlag>()
                        .map_err(|_| SqliteEntityStoreError::InvalidFlag { value })
                })
                .transpose()?;
            tags.push(Tag {
                entity: reference,
                key: row.get(0)?,
                value: row.get(1)?,
                key_type: row.get(2)?,
                flag,
            });
        }
        Ok(tags)
    }

    fn way_node_ids(&self, way_id: i64) -> Result<Vec<i64>, Self::Error> {
        let mut statement = self.connection().prepare_cached(
            "SELECT node_id FROM way_members WHERE way_id = ?1 ORDER BY position",
        )?;
        let ids = statement
            .query_map([way_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn relation_members(&self, relation_id: i64) -> Result<Vec<RelationMember>, Self::Error> {
        let mut statement = self.connection().prepare_cached(
            "SELECT member_kind, member_id, role, position FROM relation_members
             WHERE relation_id = ?1 ORDER BY position",
        )?;
        let mut rows = statement.query([relation_id])?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            let kind: String = row.get(0)?;
            let kind = kind
                .parse::<ElementKind>()
                .map_err(|err| SqliteEntityStoreError::InvalidKind { value: err.0 })?;
            members.push(RelationMember {
                relation_id,
                member: EntityRef::new(kind, row.get(1)?),
                role: row.get(2)?,
                position: row.get(3)?,
            });
        }
        Ok(members)
    }

    fn count(&self, kind: ElementKind) -> Result<u64, Self::Error> {
        let count: i64 = self.connection().query_row(
            "SELECT COUNT(*) FROM entities WHERE kind = ?1",
            [kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    fn dangling_member_count(&self) -> Result<u64, Self::Error> {
        let count: i64 = self.connection().query_row(
            "SELECT
                (SELECT COUNT(*) FROM way_members AS wm
                    WHERE NOT EXISTS (
                        SELECT 1 FROM entities AS e WHERE e.kind = 'node' AND e.id = wm.node_id))
              + (SELECT COUNT(*) FROM relation_members AS rm
                    WHERE NOT EXISTS (
                        SELECT 1 FROM entities AS e
                        WHERE e.kind = rm.member_kind AND e.id = rm.member_id))",
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

fn read_entity_columns(row: &Row<'_>) -> rusqlite::Result<(Option<Coord<f64>>, EntityMetadata)> {
    let lat: Option<f64> = row.get(0)?;
    let lon: Option<f64> = row.get(1)?;
    let location = lat.zip(lon).map(|(y, x)| Coord { x, y });
    let metadata = EntityMetadata {
        version: row.get(2)?,
        changeset: row.get(3)?,
        timestamp: row.get(4)?,
        user: row.get(5)?,
        uid: row.get(6)?,
    };
    Ok((location, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    const SCHEMA: &str = "
        CREATE TABLE entities (
            kind TEXT NOT NULL, id INTEGER NOT NULL, lat REAL, lon REAL,
            version INTEGER, changeset INTEGER, timestamp TEXT, user TEXT, uid INTEGER,
            PRIMARY KEY (kind, id)
        );
        CREATE TABLE entity_tags (
            entity_kind TEXT NOT NULL, entity_id INTEGER NOT NULL, key TEXT NOT NULL,
            value TEXT NOT NULL, key_type TEXT NOT NULL, flag TEXT,
            PRIMARY KEY (entity_kind, entity_id, key)
        );
        CREATE TABLE way_members (
            way_id INTEGER NOT NULL, node_id INTEGER NOT NULL, position INTEGER NOT NULL,
            PRIMARY KEY (way_id, position)
        );
        CREATE TABLE relation_members (
            relation_id INTEGER NOT NULL, member_kind TEXT NOT NULL, member_id INTEGER NOT NULL,
            role TEXT NOT NULL, position INTEGER NOT NULL,
            PRIMARY KEY (relation_id, position)
        );
        INSERT INTO entities (kind, id, lat, lon, version, user) VALUES ('node', 1, 51.4, -0.4, 2, 'alice');
        INSERT INTO entities (kind, id) VALUES ('node', 2);
        INSERT INTO entities (kind, id) VALUES ('way', 10);
        INSERT INTO entities (kind, id) VALUES ('relation', 20);
        INSERT INTO entity_tags VALUES ('node', 1, 'name', 'Saint Georges Hill', 'regular', NULL);
        INSERT INTO entity_tags VALUES ('node', 1, 'addr:postcode', 'KT13', 'addr', 'incomplete_postcode');
        INSERT INTO way_members VALUES (10, 2, 1);
        INSERT INTO way_members VALUES (10, 1, 0);
        INSERT INTO relation_members VALUES (20, 'way', 10, 'outer', 0);
        INSERT INTO relation_members VALUES (20, 'node', 99, 'label', 1);
    ";

    #[fixture]
    fn connection() -> Connection {
        let connection = Connection::open_in_memory().expect("open in-memory database");
        connection.execute_batch(SCHEMA).expect("seed schema");
        connection
    }

    #[rstest]
    fn reads_node_with_metadata(connection: Connection) {
        let store = SqliteEntityStore::new(&connection);
        let node = store
            .entity(EntityRef::node(1))
            .expect("query entity")
            .expect("node present");
        assert_eq!(node.lat(), Some(51.4));
        assert_eq!(node.lon(), Some(-0.4));
        assert_eq!(node.metadata.version, Some(2));
        assert_eq!(node.metadata.user.as_deref(), Some("alice"));
        assert_eq!(node.metadata.changeset, None);
    }

    #[rstest]
    fn reads_tags_with_flags(connection: Connection) {
        let store = SqliteEntityStore::new(&connection);
        let tags = store.tags(EntityRef::node(1)).expect("query tags");
        let keys: Vec<&str> = tags.iter().map(|tag| tag.key.as_str()).collect();
        assert_eq!(keys, vec!["addr:postcode", "name"]);
        assert_eq!(tags[0].flag, Some(CleaningFlag::IncompletePostcode));
        assert_eq!(tags[1].flag, None);
    }

    #[rstest]
    fn orders_way_nodes_by_position(connection: Connection) {
        let store = SqliteEntityStore::new(&connection);
        assert_eq!(store.way_node_ids(10).expect("query way"), vec![1, 2]);
    }

    #[rstest]
    fn counts_dangling_relation_member(connection: Connection) {
        let store = SqliteEntityStore::new(&connection);
        assert_eq!(store.dangling_member_count().expect("count dangling"), 1);
        let members = store.relation_members(20).expect("query members");
        assert_eq!(members[1].member, EntityRef::node(99));
        assert_eq!(members[1].role, "label");
    }

    #[rstest]
    fn rejects_unknown_kind(connection: Connection) {
        connection
            .execute("INSERT INTO relation_members VALUES (21, 'area', 1, '', 0)", [])
            .expect("insert bad member");
        let store = SqliteEntityStore::new(&connection);
        let err = store.relation_members(21).expect_err("unknown kind should fail");
        assert!(matches!(err, SqliteEntityStoreError::InvalidKind { value } if value == "area"));
    }

    #[rstest]
    fn open_reports_missing_database() {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("missing.db");
        let err = SqliteEntityStore::open(&path).expect_err("missing database should fail");
        match err {
            SqliteEntityStoreError::OpenDatabase { path: reported, .. } => {
                assert_eq!(reported, path);
            }
            other => panic!("expected open error, got {other:?}"),
        }
    }
}
