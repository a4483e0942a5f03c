//! Unit tests for the streaming OSM XML reader.

use super::*;
use rstest::rstest;
use std::time::{Duration, Instant};

fn read_all(xml: &str) -> Vec<Result<RawElement, ParseError>> {
    read_bytes(xml.as_bytes())
}

fn read_bytes(xml: &[u8]) -> Vec<Result<RawElement, ParseError>> {
    OsmXmlReader::new(xml).collect()
}

fn first_error(xml: &str) -> ParseError {
    first_error_in_bytes(xml.as_bytes())
}

fn first_error_in_bytes(xml: &[u8]) -> ParseError {
    read_bytes(xml)
        .into_iter()
        .find_map(Result::err)
        .unwrap_or_else(|| panic!("expected a parse error for {}", String::from_utf8_lossy(xml)))
}

#[rstest]
fn yields_elements_in_document_order() {
    let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <osm version="0.6" generator="test">
          <node id="1" lat="51.37" lon="-0.45" version="3" user="alice" uid="7">
            <tag k="name" v="St. Georges Hill"/>
          </node>
          <way id="10"><nd ref="1"/><nd ref="2"/><tag k="highway" v="residential"/></way>
          <relation id="20">
            <member type="way" ref="10" role="outer"/>
            <tag k="type" v="multipolygon"/>
          </relation>
        </osm>"#;
    let elements: Vec<RawElement> = read_all(xml)
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("well-formed document");

    let kinds: Vec<ElementKind> = elements.iter().map(|element| element.kind).collect();
    assert_eq!(
        kinds,
        vec![ElementKind::Node, ElementKind::Way, ElementKind::Relation]
    );
    assert_eq!(elements[0].attribute("user"), Some("alice"));
    assert_eq!(
        elements[0].tags,
        vec![RawTag {
            key: Some("name".into()),
            value: Some("St. Georges Hill".into()),
        }]
    );
    assert_eq!(elements[1].node_refs, vec!["1".to_owned(), "2".to_owned()]);
    assert_eq!(elements[2].members[0].kind.as_deref(), Some("way"));
    assert_eq!(elements[2].members[0].role.as_deref(), Some("outer"));
    assert!(elements[0].position < elements[1].position);
}

#[rstest]
fn unescapes_attribute_values() {
    let xml = r#"<osm><node id="1"><tag k="name" v="Fish &amp; Chips"/></node></osm>"#;
    let element = read_all(xml)
        .remove(0)
        .expect("element with escaped value");
    assert_eq!(element.tags[0].value.as_deref(), Some("Fish & Chips"));
}

#[rstest]
fn accepts_children_written_with_end_tags() {
    let xml = r#"<osm><way id="1"><nd ref="5"></nd><tag k="a" v="b"></tag></way></osm>"#;
    let element = read_all(xml).remove(0).expect("element");
    assert_eq!(element.node_refs, vec!["5".to_owned()]);
    assert_eq!(element.tags.len(), 1);
}

#[rstest]
fn captures_bounds_and_skips_overpass_metadata() {
    let xml = r#"<osm>
          <note>The data included in this document is from www.openstreetmap.org.</note>
          <meta osm_base="2016-01-01T00:00:00Z"/>
          <bounds minlat="51.30" minlon="-0.55" maxlat="51.45" maxlon="-0.30"/>
          <node id="1" lat="51.4" lon="-0.4"/>
        </osm>"#;
    let mut reader = OsmXmlReader::new(xml.as_bytes());
    let element = reader
        .next()
        .expect("one element")
        .expect("element parses");
    assert_eq!(element.raw_id(), Some("1"));
    assert!(reader.next().is_none());

    let bounds = reader.bounds().expect("bounds captured");
    assert_eq!(bounds.min().x, -0.55);
    assert_eq!(bounds.max().y, 51.45);
}

#[rstest]
fn empty_root_yields_nothing() {
    assert!(read_all("<osm/>").is_empty());
    assert!(read_all("<osm></osm>").is_empty());
}

#[rstest]
#[case::empty("")]
#[case::only_declaration(r#"<?xml version="1.0"?>"#)]
fn reports_missing_root(#[case] xml: &str) {
    assert!(matches!(first_error(xml), ParseError::MissingRoot));
}

#[rstest]
fn rejects_foreign_root() {
    match first_error("<gpx><trk/></gpx>") {
        ParseError::UnexpectedRoot { found } => assert_eq!(found, "gpx"),
        other => panic!("expected unexpected root, got {other:?}"),
    }
}

#[rstest]
#[case::unknown_top_level(r#"<osm><changeset id="1"/></osm>"#, "changeset", "<osm>")]
#[case::nd_in_node(r#"<osm><node id="1"><nd ref="2"/></node></osm>"#, "nd", "<node>")]
#[case::member_in_way(r#"<osm><way id="1"><member type="node" ref="2"/></way></osm>"#, "member", "<way>")]
#[case::nested_in_tag(r#"<osm><node id="1"><tag k="a" v="b"><x/></tag></node></osm>"#, "x", "<tag>")]
#[case::after_root(r#"<osm></osm><node id="1"/>"#, "node", "document end")]
fn rejects_misplaced_elements(#[case] xml: &str, #[case] name: &str, #[case] parent: &str) {
    match first_error(xml) {
        ParseError::UnexpectedElement {
            name: found,
            parent: found_parent,
            ..
        } => {
            assert_eq!(found, name);
            assert_eq!(found_parent, parent);
        }
        other => panic!("expected unexpected element, got {other:?}"),
    }
}

#[rstest]
fn unclosed_way_is_unexpected_eof() {
    let xml = r#"<osm><node id="1"/><way id="2"><nd ref="1"/>"#;
    let results = read_all(xml);
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(ParseError::UnexpectedEof { open, .. }) => assert_eq!(open, "way"),
        other => panic!("expected unexpected eof, got {other:?}"),
    }
}

#[rstest]
fn unclosed_root_is_unexpected_eof() {
    match first_error(r#"<osm><node id="1"/>"#) {
        ParseError::UnexpectedEof { open, position } => {
            assert_eq!(open, "osm");
            assert_eq!(position, 0);
        }
        other => panic!("expected unexpected eof, got {other:?}"),
    }
}

#[rstest]
#[case::mismatched_end(br#"<osm><node id="1"></way></osm>"#.as_slice())]
#[case::duplicate_attribute(br#"<osm><node id="1" id="2"/></osm>"#.as_slice())]
#[case::unquoted_attribute(br#"<osm><node id=1/></osm>"#.as_slice())]
#[case::invalid_utf8_value(b"<osm><node id=\"1\"><tag k=\"name\" v=\"A\xff\xfe\"/></node></osm>".as_slice())]
fn malformed_xml_is_reported(#[case] xml: &[u8]) {
    assert!(matches!(first_error_in_bytes(xml), ParseError::Xml { .. }));
}

#[rstest]
fn text_content_is_not_decoded() {
    let xml = b"<osm><node id=\"1\">A\xff\xfe</node></osm>";
    let elements: Vec<RawElement> = read_bytes(xml)
        .into_iter()
        .collect::<Result<_, _>>()
        .expect("text content is skipped");
    assert_eq!(elements.len(), 1);
}

#[rstest]
fn stream_is_fused_after_an_error() {
    let mut reader = OsmXmlReader::new(r#"<osm><bogus/><node id="1"/></osm>"#.as_bytes());
    assert!(matches!(reader.next(), Some(Err(_))));
    assert!(reader.next().is_none());
    assert!(reader.next().is_none());
}

#[rstest]
fn expired_deadline_stops_before_the_first_element() {
    let xml = r#"<osm><node id="1"/><node id="2"/></osm>"#;
    let mut reader = OsmXmlReader::new(xml.as_bytes());
    // Enter the root before arming the deadline.
    let first = reader.next().expect("first element").expect("parses");
    assert_eq!(first.raw_id(), Some("1"));

    let mut reader = reader.with_deadline(Instant::now());
    assert!(matches!(
        reader.next(),
        Some(Err(ParseError::DeadlineExceeded { .. }))
    ));
    assert!(reader.next().is_none());
}

#[rstest]
fn distant_deadline_does_not_interfere() {
    let xml = r#"<osm><node id="1"/><node id="2"/></osm>"#;
    let reader = OsmXmlReader::new(xml.as_bytes())
        .with_deadline(Instant::now() + Duration::from_secs(3600));
    let results: Vec<_> = reader.collect();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(Result::is_ok));
}
