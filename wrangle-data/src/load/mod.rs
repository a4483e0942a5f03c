//! Batched, transactional writes of shaped elements.
//!
//! [`Loader::load_batch`] writes one batch in one transaction: either every
//! row of the batch commits or none does. Membership rows pointing at
//! elements that are neither committed nor part of the batch are handled per
//! [`ReferenceMode`].

mod references;
pub mod schema;
mod store;

use std::{collections::HashSet, fmt, str::FromStr};

use log::{info, warn};
use rusqlite::{Connection, Error as SqliteError, Transaction};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wrangle_core::{EntityRef, ShapedElement};

use references::{DeferredMembers, MemberRow, ReferenceIndex};
pub use references::DanglingReference;
pub use schema::{SCHEMA_VERSION, SchemaError, initialise_schema, reset_schema};
pub use store::{OpenStoreError, open_database};

/// How membership rows with missing targets are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceMode {
    /// Reject the whole batch.
    #[default]
    Strict,
    /// Drop the dangling rows and commit the rest.
    Lenient,
    /// Hold dangling rows until [`Loader::finish`].
    Deferred,
}

impl ReferenceMode {
    /// Lower-case name, as accepted on the command line.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Lenient => "lenient",
            Self::Deferred => "deferred",
        }
    }
}

impl fmt::Display for ReferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lenient" => Ok(Self::Lenient),
            "deferred" => Ok(Self::Deferred),
            other => Err(format!(
                "unknown reference mode '{other}'; expected strict, lenient or deferred"
            )),
        }
    }
}

/// Errors raised while loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// In strict mode, the batch referenced elements that do not exist.
    #[error("batch references {} missing element(s), first {}", .dangling.len(), first_dangling(.dangling))]
    Referential {
        /// Every dangling row of the rejected batch.
        dangling: Vec<DanglingReference>,
    },
    /// Creating or checking the schema failed.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A SQLite statement failed; the batch was rolled back.
    #[error("failed to {operation}")]
    Sqlite {
        /// What the loader was doing.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

fn first_dangling(dangling: &[DanglingReference]) -> String {
    dangling
        .first()
        .map_or_else(|| "<none>".to_owned(), ToString::to_string)
}

impl LoadError {
    fn sqlite(operation: &'static str) -> impl FnOnce(SqliteError) -> Self {
        move |source| Self::Sqlite { operation, source }
    }
}

/// Rows written by one committed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Entity rows inserted.
    pub entities: u64,
    /// Tag rows inserted.
    pub tags: u64,
    /// Way membership rows inserted.
    pub way_members: u64,
    /// Relation membership rows inserted.
    pub relation_members: u64,
    /// Rows dropped in lenient mode.
    pub dropped: Vec<DanglingReference>,
    /// Rows held back in deferred mode.
    pub deferred: u64,
}

/// Result of resolving deferred rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinishOutcome {
    /// Way membership rows written late.
    pub way_members: u64,
    /// Relation membership rows written late.
    pub relation_members: u64,
    /// Rows whose target never appeared; they are not stored.
    pub unresolved: Vec<DanglingReference>,
}

/// Writes batches of [`ShapedElement`]s into the relational schema.
///
/// # Examples
/// ```
/// use rusqlite::Connection;
/// use wrangle_core::{Entity, EntityMetadata, ShapedElement};
/// use wrangle_data::load::{Loader, ReferenceMode};
///
/// let mut connection = Connection::open_in_memory().unwrap();
/// let mut loader = Loader::new(&mut connection, ReferenceMode::Strict).unwrap();
/// let node = ShapedElement::new(Entity::node(1, None, EntityMetadata::default()));
/// let outcome = loader.load_batch(&[node]).unwrap();
/// assert_eq!(outcome.entities, 1);
/// loader.finish().unwrap();
/// ```
pub struct Loader<'conn> {
    connection: &'conn mut Connection,
    mode: ReferenceMode,
    index: ReferenceIndex,
    deferred: DeferredMembers,
    batches: u64,
}

impl fmt::Debug for Loader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("mode", &self.mode)
            .field("committed_entities", &self.index.len())
            .field("deferred", &self.deferred.len())
            .field("batches", &self.batches)
            .finish_non_exhaustive()
    }
}

impl<'conn> Loader<'conn> {
    /// Prepare `connection` for loading.
    ///
    /// The schema is created if missing. Entities already stored count as
    /// valid reference targets.
    pub fn new(connection: &'conn mut Connection, mode: ReferenceMode) -> Result<Self, LoadError> {
        initialise_schema(connection)?;
        let index = ReferenceIndex::from_connection(connection)
            .map_err(LoadError::sqlite("read committed entity ids"))?;
        Ok(Self {
            connection,
            mode,
            index,
            deferred: DeferredMembers::default(),
            batches: 0,
        })
    }

    /// The configured reference mode.
    #[must_use]
    pub const fn mode(&self) -> ReferenceMode {
        self.mode
    }

    /// Whether `reference` is already committed.
    #[must_use]
    pub fn contains(&self, reference: &EntityRef) -> bool {
        self.index.contains(reference)
    }

    /// Number of rows waiting for [`Self::finish`].
    #[must_use]
    pub const fn deferred_rows(&self) -> usize {
        self.deferred.len()
    }

    /// Write one batch in one transaction.
    ///
    /// On any error nothing from the batch is stored, including rows that
    /// would have been deferred.
    pub fn load_batch(&mut self, batch: &[ShapedElement]) -> Result<BatchOutcome, LoadError> {
        let in_batch: HashSet<EntityRef> = batch
            .iter()
            .map(|element| element.entity.reference())
            .collect();
        let is_known = |target: &EntityRef| in_batch.contains(target) || self.index.contains(target);

        let mut ready = Vec::new();
        let mut dangling = Vec::new();
        for row in batch.iter().flat_map(MemberRow::of) {
            if is_known(&row.target()) {
                ready.push(row);
            } else {
                dangling.push(row);
            }
        }

        let mut outcome = BatchOutcome::default();
        let mut held = Vec::new();
        match self.mode {
            ReferenceMode::Strict if !dangling.is_empty() => {
                let dangling: Vec<DanglingReference> =
                    dangling.iter().map(MemberRow::dangling).collect();
                warn!(
                    "rejecting batch of {} elements: {} dangling reference(s)",
                    batch.len(),
                    dangling.len()
                );
                return Err(LoadError::Referential { dangling });
            }
            ReferenceMode::Strict => {}
            ReferenceMode::Lenient => {
                for row in &dangling {
                    warn!("dropping dangling member {}", row.dangling());
                }
                outcome.dropped = dangling.iter().map(MemberRow::dangling).collect();
            }
            ReferenceMode::Deferred => {
                outcome.deferred = u64::try_from(dangling.len()).unwrap_or(u64::MAX);
                held = dangling;
            }
        }

        let transaction = self
            .connection
            .transaction()
            .map_err(LoadError::sqlite("begin batch transaction"))?;
        insert_entities(&transaction, batch, &mut outcome)?;
        insert_members(&transaction, &ready, &mut outcome.way_members, &mut outcome.relation_members)?;
        transaction
            .commit()
            .map_err(LoadError::sqlite("commit batch transaction"))?;

        self.index.extend(in_batch);
        self.deferred.extend(held);
        self.batches += 1;
        info!(
            "committed batch {}: {} entities, {} tags, {} way members, {} relation members",
            self.batches,
            outcome.entities,
            outcome.tags,
            outcome.way_members,
            outcome.relation_members
        );
        Ok(outcome)
    }

    /// Write deferred rows whose targets arrived and report the rest.
    pub fn finish(self) -> Result<FinishOutcome, LoadError> {
        let (resolved, unresolved) = self.deferred.resolve(&self.index);
        let mut outcome = FinishOutcome {
            unresolved: unresolved.iter().map(MemberRow::dangling).collect(),
            ..FinishOutcome::default()
        };
        for dangling in &outcome.unresolved {
            warn!("unresolved deferred member {dangling}");
        }
        if resolved.is_empty() {
            return Ok(outcome);
        }

        let transaction = self
            .connection
            .transaction()
            .map_err(LoadError::sqlite("begin deferred transaction"))?;
        insert_members(
            &transaction,
            &resolved,
            &mut outcome.way_members,
            &mut outcome.relation_members,
        )?;
        transaction
            .commit()
            .map_err(LoadError::sqlite("commit deferred transaction"))?;
        info!(
            "resolved {} deferred member rows",
            outcome.way_members + outcome.relation_members
        );
        Ok(outcome)
    }
}

fn insert_entities(
    transaction: &Transaction<'_>,
    batch: &[ShapedElement],
    outcome: &mut BatchOutcome,
) -> Result<(), LoadError> {
    let mut insert_entity = transaction
        .prepare_cached(
            "INSERT INTO entities (kind, id, lat, lon, version, changeset, timestamp, user, uid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .map_err(LoadError::sqlite("prepare entity insert"))?;
    let mut insert_tag = transaction
        .prepare_cached(
            "INSERT INTO entity_tags (entity_kind, entity_id, key, value, key_type, flag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .map_err(LoadError::sqlite("prepare tag insert"))?;

    for element in batch {
        let entity = &element.entity;
        let metadata = &entity.metadata;
        insert_entity
            .execute((
                entity.kind.as_str(),
                entity.id,
                entity.lat(),
                entity.lon(),
                metadata.version,
                metadata.changeset,
                metadata.timestamp.as_deref(),
                metadata.user.as_deref(),
                metadata.uid,
            ))
            .map_err(LoadError::sqlite("insert entity"))?;
        outcome.entities += 1;

        for tag in &element.tags {
            insert_tag
                .execute((
                    tag.entity.kind.as_str(),
                    tag.entity.id,
                    tag.key.as_str(),
                    tag.value.as_str(),
                    tag.key_type.as_str(),
                    tag.flag.map(|flag| flag.as_str()),
                ))
                .map_err(LoadError::sqlite("insert tag"))?;
            outcome.tags += 1;
        }
    }
    Ok(())
}

fn insert_members(
    transaction: &Transaction<'_>,
    rows: &[MemberRow],
    way_members: &mut u64,
    relation_members: &mut u64,
) -> Result<(), LoadError> {
    let mut insert_way = transaction
        .prepare_cached("INSERT INTO way_members (way_id, node_id, position) VALUES (?1, ?2, ?3)")
        .map_err(LoadError::sqlite("prepare way member insert"))?;
    let mut insert_relation = transaction
        .prepare_cached(
            "INSERT INTO relation_members (relation_id, member_kind, member_id, role, position)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(LoadError::sqlite("prepare relation member insert"))?;

    for row in rows {
        match row {
            MemberRow::Way(member) => {
                insert_way
                    .execute((member.way_id, member.node_id, member.position))
                    .map_err(LoadError::sqlite("insert way member"))?;
                *way_members += 1;
            }
            MemberRow::Relation(member) => {
                insert_relation
                    .execute((
                        member.relation_id,
                        member.member.kind.as_str(),
                        member.member.id,
                        member.role.as_str(),
                        member.position,
                    ))
                    .map_err(LoadError::sqlite("insert relation member"))?;
                *relation_members += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
