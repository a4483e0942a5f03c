//! Unit tests for batch loading and reference handling.

use super::*;
use rstest::{fixture, rstest};
use wrangle_core::{
    CleaningFlag, ElementKind, Entity, EntityMetadata, EntityStore, RelationMember,
    SqliteEntityStore, Tag, WayMember,
};

#[fixture]
fn connection() -> Connection {
    Connection::open_in_memory().expect("open in-memory database")
}

fn node(id: i64) -> ShapedElement {
    let mut node = ShapedElement::new(Entity::node(
        id,
        Some(geo::Coord { x: -0.4, y: 51.4 }),
        EntityMetadata::default(),
    ));
    node.tags
        .push(Tag::new(EntityRef::node(id), "addr:postcode", "KT13").with_flag(Some(CleaningFlag::IncompletePostcode)));
    node
}

fn way(id: i64, nodes: &[i64]) -> ShapedElement {
    let mut way = ShapedElement::new(Entity::without_location(
        ElementKind::Way,
        id,
        EntityMetadata::default(),
    ));
    way.way_members = nodes
        .iter()
        .zip(0_u32..)
        .map(|(&node_id, position)| WayMember {
            way_id: id,
            node_id,
            position,
        })
        .collect();
    way
}

fn relation(id: i64, members: &[EntityRef]) -> ShapedElement {
    let mut relation = ShapedElement::new(Entity::without_location(
        ElementKind::Relation,
        id,
        EntityMetadata::default(),
    ));
    relation.relation_members = members
        .iter()
        .zip(0_u32..)
        .map(|(&member, position)| RelationMember {
            relation_id: id,
            member,
            role: "outer".into(),
            position,
        })
        .collect();
    relation
}

fn store(connection: &Connection) -> SqliteEntityStore<&Connection> {
    SqliteEntityStore::new(connection)
}

#[rstest]
fn strict_mode_rejects_the_whole_batch(mut connection: Connection) {
    {
        let mut loader = Loader::new(&mut connection, ReferenceMode::Strict).expect("loader");
        loader
            .load_batch(&[node(1), node(2)])
            .expect("first batch commits");
        let err = loader
            .load_batch(&[node(3), way(10, &[1, 2, 99])])
            .expect_err("dangling node 99");
        match err {
            LoadError::Referential { dangling } => {
                assert_eq!(dangling.len(), 1);
                assert_eq!(dangling[0].source, EntityRef::way(10));
                assert_eq!(dangling[0].target, EntityRef::node(99));
                assert_eq!(dangling[0].position, 2);
            }
            other => panic!("expected referential error, got {other:?}"),
        }
        loader.finish().expect("finish");
    }
    let store = store(&connection);
    assert_eq!(store.count(ElementKind::Node).expect("count"), 2);
    assert_eq!(store.count(ElementKind::Way).expect("count"), 0);
}

#[rstest]
fn lenient_mode_keeps_surviving_positions(mut connection: Connection) {
    {
        let mut loader = Loader::new(&mut connection, ReferenceMode::Lenient).expect("loader");
        let outcome = loader
            .load_batch(&[node(1), node(2), way(10, &[1, 99, 2])])
            .expect("batch commits");
        assert_eq!(outcome.way_members, 2);
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].position, 1);
    }
    let positions: Vec<(i64, u32)> = connection
        .prepare("SELECT node_id, position FROM way_members WHERE way_id = 10 ORDER BY position")
        .expect("prepare")
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(positions, vec![(1, 0), (2, 2)]);
    assert_eq!(store(&connection).dangling_member_count().expect("count"), 0);
}

#[rstest]
fn deferred_rows_resolve_when_targets_arrive_later(mut connection: Connection) {
    {
        let mut loader = Loader::new(&mut connection, ReferenceMode::Deferred).expect("loader");
        let first = loader
            .load_batch(&[node(1), node(2), way(10, &[1, 2, 99])])
            .expect("first batch");
        assert_eq!(first.deferred, 1);
        assert_eq!(loader.deferred_rows(), 1);
        loader.load_batch(&[node(99)]).expect("second batch");
        let finished = loader.finish().expect("finish");
        assert_eq!(finished.way_members, 1);
        assert!(finished.unresolved.is_empty());
    }
    assert_eq!(store(&connection).way_node_ids(10).expect("way"), vec![1, 2, 99]);
}

#[rstest]
fn deferred_rows_never_resolved_are_reported(mut connection: Connection) {
    let finished = {
        let mut loader = Loader::new(&mut connection, ReferenceMode::Deferred).expect("loader");
        loader
            .load_batch(&[node(1), relation(20, &[EntityRef::node(1), EntityRef::way(404)])])
            .expect("batch");
        loader.finish().expect("finish")
    };
    assert_eq!(finished.unresolved.len(), 1);
    assert_eq!(finished.unresolved[0].target, EntityRef::way(404));
    let store = store(&connection);
    assert_eq!(store.relation_members(20).expect("members").len(), 1);
    assert_eq!(store.dangling_member_count().expect("count"), 0);
}

#[rstest]
fn failed_batch_discards_its_deferred_rows(mut connection: Connection) {
    let mut loader = Loader::new(&mut connection, ReferenceMode::Deferred).expect("loader");
    loader.load_batch(&[node(1)]).expect("first batch");
    // Re-inserting node 1 violates the primary key and rolls the batch back.
    let err = loader
        .load_batch(&[node(1), way(10, &[1, 99])])
        .expect_err("duplicate entity");
    assert!(matches!(err, LoadError::Sqlite { .. }));
    assert_eq!(loader.deferred_rows(), 0);
    assert!(!loader.contains(&EntityRef::way(10)));
}

#[rstest]
fn members_within_the_batch_are_valid_targets(mut connection: Connection) {
    let mut loader = Loader::new(&mut connection, ReferenceMode::Strict).expect("loader");
    let outcome = loader
        .load_batch(&[
            relation(20, &[EntityRef::way(10)]),
            way(10, &[1]),
            node(1),
        ])
        .expect("forward references inside a batch resolve");
    assert_eq!(outcome.entities, 3);
    assert_eq!(outcome.tags, 1);
    assert_eq!(outcome.relation_members, 1);
}

#[rstest]
fn reopening_sees_committed_entities(mut connection: Connection) {
    Loader::new(&mut connection, ReferenceMode::Strict)
        .expect("loader")
        .load_batch(&[node(1)])
        .expect("batch");
    let mut loader = Loader::new(&mut connection, ReferenceMode::Strict).expect("second loader");
    assert!(loader.contains(&EntityRef::node(1)));
    loader.load_batch(&[way(10, &[1])]).expect("node 1 is known");
}

#[rstest]
fn stores_tags_with_flags(mut connection: Connection) {
    Loader::new(&mut connection, ReferenceMode::Strict)
        .expect("loader")
        .load_batch(&[node(7)])
        .expect("batch");
    let tags = store(&connection).tags(EntityRef::node(7)).expect("tags");
    assert_eq!(tags[0].flag, Some(CleaningFlag::IncompletePostcode));
    assert_eq!(tags[0].key_type, "addr");
}

#[rstest]
#[case("strict", ReferenceMode::Strict)]
#[case("Lenient", ReferenceMode::Lenient)]
#[case("DEFERRED", ReferenceMode::Deferred)]
fn parses_reference_modes(#[case] text: &str, #[case] mode: ReferenceMode) {
    assert_eq!(text.parse::<ReferenceMode>(), Ok(mode));
    assert_eq!(mode.to_string(), text.to_ascii_lowercase());
}

#[rstest]
fn rejects_unknown_reference_mode() {
    let err = "loose".parse::<ReferenceMode>().expect_err("unknown mode");
    assert!(err.contains("loose"));
}
