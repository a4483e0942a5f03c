//! The relational schema populated by the loader.

use rusqlite::{Connection, Error as SqliteError, OptionalExtension, Transaction};
use thiserror::Error;

/// Version recorded in `osm_schema_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Errors raised when creating or checking the schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Enabling foreign-key enforcement failed.
    #[error("failed to enable SQLite foreign keys")]
    ForeignKeys {
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// A DDL statement failed.
    #[error("failed to execute schema step '{step}'")]
    Migration {
        /// Label of the failed step.
        step: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// The database was created by an incompatible release.
    #[error("expected OSM schema version {expected} but found {found}; reset the database before retrying")]
    VersionMismatch {
        /// Version this build writes.
        expected: i64,
        /// Version stored in the database.
        found: i64,
    },
}

/// Create the schema if it is missing and check its version.
///
/// # Examples
/// ```
/// use rusqlite::Connection;
/// use wrangle_data::load::schema::initialise_schema;
///
/// let mut conn = Connection::open_in_memory().expect("create in-memory database");
/// initialise_schema(&mut conn).expect("create schema");
/// initialise_schema(&mut conn).expect("schema creation is idempotent");
///
/// let tables: i64 = conn
///     .query_row(
///         "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name LIKE '%members'",
///         [],
///         |row| row.get(0),
///     )
///     .expect("count tables");
/// assert_eq!(tables, 2);
/// ```
pub fn initialise_schema(connection: &mut Connection) -> Result<(), SchemaError> {
    enable_foreign_keys(connection)?;
    let transaction = begin(connection)?;
    create_tables(&transaction)?;
    create_indexes(&transaction)?;
    create_views(&transaction)?;
    ensure_schema_version(&transaction)?;
    commit(transaction)
}

/// Drop every loader table and recreate an empty schema.
///
/// Re-ingestion rebuilds the store wholesale, so this is the usual entry
/// point before a run.
pub fn reset_schema(connection: &mut Connection) -> Result<(), SchemaError> {
    enable_foreign_keys(connection)?;
    let transaction = begin(connection)?;
    run_step(&transaction, "drop flagged_tags view", "DROP VIEW IF EXISTS flagged_tags")?;
    for (step, sql) in [
        ("drop relation_members", "DROP TABLE IF EXISTS relation_members"),
        ("drop way_members", "DROP TABLE IF EXISTS way_members"),
        ("drop entity_tags", "DROP TABLE IF EXISTS entity_tags"),
        ("drop entities", "DROP TABLE IF EXISTS entities"),
        ("drop schema version", "DROP TABLE IF EXISTS osm_schema_version"),
    ] {
        run_step(&transaction, step, sql)?;
    }
    commit(transaction)?;
    initialise_schema(connection)
}

fn enable_foreign_keys(connection: &Connection) -> Result<(), SchemaError> {
    connection
        .pragma_update(None, "foreign_keys", true)
        .map_err(|source| SchemaError::ForeignKeys { source })
}

fn begin(connection: &mut Connection) -> Result<Transaction<'_>, SchemaError> {
    connection
        .transaction()
        .map_err(|source| SchemaError::Migration {
            step: "begin schema transaction",
            source,
        })
}

fn commit(transaction: Transaction<'_>) -> Result<(), SchemaError> {
    transaction
        .commit()
        .map_err(|source| SchemaError::Migration {
            step: "commit schema transaction",
            source,
        })
}

fn create_tables(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_step(
        transaction,
        "create entities",
        "CREATE TABLE IF NOT EXISTS entities (
            kind TEXT NOT NULL CHECK (kind IN ('node', 'way', 'relation')),
            id INTEGER NOT NULL,
            lat REAL,
            lon REAL,
            version INTEGER,
            changeset INTEGER,
            timestamp TEXT,
            user TEXT,
            uid INTEGER,
            PRIMARY KEY (kind, id)
        ) WITHOUT ROWID",
    )?;
    run_step(
        transaction,
        "create entity_tags",
        "CREATE TABLE IF NOT EXISTS entity_tags (
            entity_kind TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            key_type TEXT NOT NULL,
            flag TEXT,
            PRIMARY KEY (entity_kind, entity_id, key),
            FOREIGN KEY (entity_kind, entity_id) REFERENCES entities(kind, id) ON DELETE CASCADE
        ) WITHOUT ROWID",
    )?;
    run_step(
        transaction,
        "create way_members",
        "CREATE TABLE IF NOT EXISTS way_members (
            way_id INTEGER NOT NULL,
            node_id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            PRIMARY KEY (way_id, position)
        ) WITHOUT ROWID",
    )?;
    run_step(
        transaction,
        "create relation_members",
        "CREATE TABLE IF NOT EXISTS relation_members (
            relation_id INTEGER NOT NULL,
            member_kind TEXT NOT NULL CHECK (member_kind IN ('node', 'way', 'relation')),
            member_id INTEGER NOT NULL,
            role TEXT NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            PRIMARY KEY (relation_id, position)
        ) WITHOUT ROWID",
    )
}

fn create_indexes(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_step(
        transaction,
        "index way_members",
        "CREATE INDEX IF NOT EXISTS idx_way_members_node ON way_members(node_id)",
    )?;
    run_step(
        transaction,
        "index relation_members",
        "CREATE INDEX IF NOT EXISTS idx_relation_members_member
            ON relation_members(member_kind, member_id)",
    )?;
    run_step(
        transaction,
        "index entity_tags",
        "CREATE INDEX IF NOT EXISTS idx_entity_tags_key ON entity_tags(key, value)",
    )
}

fn create_views(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_step(
        transaction,
        "create flagged_tags view",
        "CREATE VIEW IF NOT EXISTS flagged_tags AS
            SELECT entity_kind, entity_id, key, value, flag
            FROM entity_tags
            WHERE flag IS NOT NULL",
    )
}

fn ensure_schema_version(transaction: &Transaction<'_>) -> Result<(), SchemaError> {
    run_step(
        transaction,
        "create schema version table",
        "CREATE TABLE IF NOT EXISTS osm_schema_version (
            version INTEGER PRIMARY KEY CHECK (version > 0),
            applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        ) WITHOUT ROWID",
    )?;

    let existing: Option<i64> = transaction
        .query_row("SELECT version FROM osm_schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|source| SchemaError::Migration {
            step: "read schema version",
            source,
        })?;

    match existing {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(SchemaError::VersionMismatch {
            expected: SCHEMA_VERSION,
            found,
        }),
        None => transaction
            .execute(
                "INSERT INTO osm_schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )
            .map(|_| ())
            .map_err(|source| SchemaError::Migration {
                step: "record schema version",
                source,
            }),
    }
}

fn run_step(transaction: &Transaction<'_>, step: &'static str, sql: &str) -> Result<(), SchemaError> {
    transaction
        .execute(sql, [])
        .map(|_| ())
        .map_err(|source| SchemaError::Migration { step, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn connection() -> Connection {
        Connection::open_in_memory().expect("open in-memory database")
    }

    fn table_count(connection: &Connection, table: &str) -> i64 {
        connection
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count rows")
    }

    #[rstest]
    fn reset_discards_previous_rows(mut connection: Connection) {
        initialise_schema(&mut connection).expect("create schema");
        connection
            .execute("INSERT INTO entities (kind, id) VALUES ('node', 1)", [])
            .expect("insert node");
        reset_schema(&mut connection).expect("reset schema");
        assert_eq!(table_count(&connection, "entities"), 0);
        assert_eq!(table_count(&connection, "osm_schema_version"), 1);
    }

    #[rstest]
    fn rejects_unknown_schema_version(mut connection: Connection) {
        initialise_schema(&mut connection).expect("create schema");
        connection
            .execute("UPDATE osm_schema_version SET version = 99", [])
            .expect("tamper with version");
        let err = initialise_schema(&mut connection).expect_err("version mismatch");
        assert!(matches!(
            err,
            SchemaError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found: 99
            }
        ));
    }

    #[rstest]
    fn tags_require_an_entity(mut connection: Connection) {
        initialise_schema(&mut connection).expect("create schema");
        let result = connection.execute(
            "INSERT INTO entity_tags VALUES ('node', 404, 'name', 'x', 'regular', NULL)",
            [],
        );
        assert!(result.is_err(), "foreign key should reject orphan tag");
    }

    #[rstest]
    fn flagged_view_lists_flagged_tags(mut connection: Connection) {
        initialise_schema(&mut connection).expect("create schema");
        connection
            .execute_batch(
                "INSERT INTO entities (kind, id) VALUES ('node', 1);
                 INSERT INTO entity_tags VALUES ('node', 1, 'addr:postcode', 'KT13', 'addr', 'incomplete_postcode');
                 INSERT INTO entity_tags VALUES ('node', 1, 'name', 'Cobham', 'regular', NULL);",
            )
            .expect("seed rows");
        assert_eq!(table_count(&connection, "flagged_tags"), 1);
    }
}
