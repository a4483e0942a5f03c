//! Property-based tests for cleaning and loading.
//!
//! # Invariants tested
//!
//! - **Idempotent cleaning:** cleaning an already cleaned tag changes nothing.
//! - **Row accounting:** every element is either stored or skipped.
//! - **Way order:** node references come back in document order.

use std::fmt::Write as _;

use proptest::prelude::*;
use rusqlite::Connection;
use wrangle_core::{ElementKind, EntityStore, SqliteEntityStore};
use wrangle_data::{IngestOptions, ReferenceMode, RuleSet, ingest_osm_xml};

/// Keys owned by the built-in rules, plus one no rule claims.
const KEYS: &[&str] = &[
    "addr:flat",
    "addr:name",
    "addr:housename",
    "addr:city",
    "addr:street",
    "name",
    "addr:housenumber",
    "phone",
    "contact:website",
    "addr:postcode",
    "highway",
];

fn key_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(KEYS)
}

fn value_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[ -~]{0,24}",
        "(St|St\\.|Rd|ROAD|Ave) [A-Za-z]{1,8} (St|St\\.|Rd|ROAD|Ave)",
        "[0-9]{1,4}( [A-Za-z]{1,8} [A-Za-z]{1,8})?",
        "(\\+44|0044|44|0)?[ 0-9()-]{0,14}",
        "[a-z]{2}[0-9]{1,2}( [0-9][a-z]{2})?",
    ]
}

fn ingest(xml: &str, batch_size: usize) -> (wrangle_data::IngestReport, Connection) {
    let mut connection = Connection::open_in_memory().expect("open in-memory database");
    let options = IngestOptions {
        batch_size,
        reference_mode: ReferenceMode::Strict,
        ..IngestOptions::default()
    };
    let report = ingest_osm_xml(xml.as_bytes(), &mut connection, &options).expect("ingest");
    (report, connection)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: a second pass through the rule table is a no-op.
    #[test]
    fn cleaning_is_idempotent(key in key_strategy(), value in value_strategy()) {
        let rules = RuleSet::builtin().expect("builtin rules compile");
        let once = rules.clean(key, &value);
        prop_assume!(!once.dropped);
        let twice = rules.clean(&once.key, &once.value);
        prop_assert_eq!(&twice.key, &once.key);
        prop_assert_eq!(&twice.value, &once.value);
        prop_assert!(twice.changed_by.is_empty(), "second pass changed {:?}", twice.changed_by);
    }

    /// Property: stored entities equal elements read minus elements skipped.
    #[test]
    fn stored_plus_skipped_equals_read(
        nodes in prop::collection::vec((1_i64..50, any::<bool>()), 0..40),
        batch_size in 1_usize..8,
    ) {
        let mut xml = String::from("<osm>");
        for (id, valid) in &nodes {
            let lat = if *valid { "51.3" } else { "north" };
            write!(xml, r#"<node id="{id}" lat="{lat}" lon="-0.4"/>"#).expect("write node");
        }
        xml.push_str("</osm>");

        let (report, connection) = ingest(&xml, batch_size);
        let stored = SqliteEntityStore::new(&connection)
            .count(ElementKind::Node)
            .expect("count nodes");
        prop_assert_eq!(report.summary.nodes, u64::try_from(nodes.len()).expect("small"));
        prop_assert_eq!(stored, report.summary.entities);
        prop_assert_eq!(stored, report.summary.elements() - report.summary.skipped);
    }

    /// Property: a way's node references are recovered in document order.
    #[test]
    fn way_order_survives_loading(
        refs in Just((1_i64..=12).collect::<Vec<_>>()).prop_shuffle(),
        batch_size in 1_usize..6,
    ) {
        let mut xml = String::from("<osm>");
        for id in 1..=12 {
            write!(xml, r#"<node id="{id}" lat="51.3" lon="-0.4"/>"#).expect("write node");
        }
        xml.push_str(r#"<way id="100">"#);
        for id in &refs {
            write!(xml, r#"<nd ref="{id}"/>"#).expect("write nd");
        }
        xml.push_str("</way></osm>");

        let (_, connection) = ingest(&xml, batch_size);
        let stored = SqliteEntityStore::new(&connection)
            .way_node_ids(100)
            .expect("read way");
        prop_assert_eq!(stored, refs);
    }
}
