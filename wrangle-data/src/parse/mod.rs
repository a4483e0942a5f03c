//! Streaming reader for OSM XML extracts.
//!
//! [`OsmXmlReader`] pulls events from `quick-xml` and assembles one
//! [`RawElement`] at a time, so memory stays bounded by the largest single
//! element rather than the document. Records carry attribute text verbatim;
//! typing and validation happen in [`crate::normalise`].
//!
//! Attribute values must be valid UTF-8. Text content between tags is
//! skipped without being decoded.

mod error;

use std::{collections::BTreeMap, io::BufRead, time::Instant};

use geo::{Coord, Rect};
use log::warn;
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use wrangle_core::ElementKind;

pub use error::ParseError;

const ROOT: &str = "osm";

/// One `<tag>` child, before cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawTag {
    /// The `k` attribute, if present.
    pub key: Option<String>,
    /// The `v` attribute, if present.
    pub value: Option<String>,
}

/// One `<member>` child of a relation, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawMember {
    /// The `type` attribute.
    pub kind: Option<String>,
    /// The `ref` attribute.
    pub reference: Option<String>,
    /// The `role` attribute.
    pub role: Option<String>,
}

/// A node, way or relation exactly as it appeared in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawElement {
    /// Element kind, from the element name.
    pub kind: ElementKind,
    /// Attributes of the element itself (`id`, `lat`, `version`, ...).
    pub attributes: BTreeMap<String, String>,
    /// `<tag>` children in document order.
    pub tags: Vec<RawTag>,
    /// `ref` attributes of `<nd>` children in document order. A child without
    /// `ref` is recorded as an empty string.
    pub node_refs: Vec<String>,
    /// `<member>` children in document order.
    pub members: Vec<RawMember>,
    /// Byte offset where the element started.
    pub position: u64,
}

impl RawElement {
    /// Create an element with attributes and no children.
    #[must_use]
    pub const fn new(kind: ElementKind, attributes: BTreeMap<String, String>) -> Self {
        Self {
            kind,
            attributes,
            tags: Vec::new(),
            node_refs: Vec::new(),
            members: Vec::new(),
            position: 0,
        }
    }

    /// The raw `id` attribute, if any.
    #[must_use]
    pub fn raw_id(&self) -> Option<&str> {
        self.attributes.get("id").map(String::as_str)
    }

    /// Look up an attribute of the element.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Start or empty tag with its name and attributes copied out of the read
/// buffer.
#[derive(Debug)]
struct OwnedStart {
    name: String,
    attributes: BTreeMap<String, String>,
    position: u64,
}

#[derive(Debug)]
enum Item {
    Start(OwnedStart),
    Empty(OwnedStart),
    End(String, u64),
    Eof,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeRoot,
    InRoot { opened_at: u64 },
    AfterRoot,
    Done,
}

/// Lazy iterator of [`RawElement`]s read from OSM XML.
///
/// # Examples
/// ```
/// use wrangle_core::ElementKind;
/// use wrangle_data::parse::OsmXmlReader;
///
/// let xml = br#"<osm version="0.6">
///   <node id="1" lat="51.4" lon="-0.4"><tag k="name" v="Cobham"/></node>
///   <way id="2"><nd ref="1"/></way>
/// </osm>"#;
/// let elements: Vec<_> = OsmXmlReader::new(&xml[..])
///     .collect::<Result<_, _>>()
///     .unwrap();
///
/// assert_eq!(elements.len(), 2);
/// assert_eq!(elements[1].kind, ElementKind::Way);
/// assert_eq!(elements[1].node_refs, vec!["1".to_owned()]);
/// ```
pub struct OsmXmlReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    state: State,
    deadline: Option<Instant>,
    bounds: Option<Rect<f64>>,
}

impl<R> std::fmt::Debug for OsmXmlReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsmXmlReader")
            .field("state", &self.state)
            .field("deadline", &self.deadline)
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

impl<R: BufRead> OsmXmlReader<R> {
    /// Wrap a buffered source of OSM XML.
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            state: State::BeforeRoot,
            deadline: None,
            bounds: None,
        }
    }

    /// Abort with [`ParseError::DeadlineExceeded`] once `deadline` passes.
    ///
    /// The deadline is checked before each top-level element, never while an
    /// element is half read.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Extent declared by the document's `<bounds>` element, once seen.
    #[must_use]
    pub const fn bounds(&self) -> Option<Rect<f64>> {
        self.bounds
    }

    fn byte_position(&self) -> u64 {
        u64::try_from(self.reader.buffer_position()).unwrap_or(u64::MAX)
    }

    fn next_item(&mut self) -> Result<Item, ParseError> {
        self.buf.clear();
        let position = self.byte_position();
        let event = self
            .reader
            .read_event_into(&mut self.buf)
            .map_err(|source| ParseError::Xml { position, source })?;
        let item = match event {
            Event::Start(start) => Item::Start(owned_start(&start, position)?),
            Event::Empty(start) => Item::Empty(owned_start(&start, position)?),
            Event::End(end) => Item::End(utf8_name(end.name().as_ref(), position)?, position),
            Event::Eof => Item::Eof,
            _ => Item::Other,
        };
        Ok(item)
    }

    fn check_deadline(&self) -> Result<(), ParseError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ParseError::DeadlineExceeded {
                position: self.byte_position(),
            }),
            _ => Ok(()),
        }
    }

    fn read_next(&mut self) -> Result<Option<RawElement>, ParseError> {
        if matches!(self.state, State::InRoot { .. }) {
            self.check_deadline()?;
        }
        loop {
            let item = self.next_item()?;
            match self.state {
                State::BeforeRoot => self.before_root(item)?,
                State::InRoot { opened_at } => {
                    if let Some(element) = self.in_root(item, opened_at)? {
                        return Ok(Some(element));
                    }
                }
                State::AfterRoot => self.after_root(item)?,
                State::Done => return Ok(None),
            }
        }
    }

    fn before_root(&mut self, item: Item) -> Result<(), ParseError> {
        match item {
            Item::Start(start) if start.name == ROOT => {
                self.state = State::InRoot {
                    opened_at: start.position,
                };
            }
            Item::Empty(start) if start.name == ROOT => self.state = State::AfterRoot,
            Item::Start(start) | Item::Empty(start) => {
                return Err(ParseError::UnexpectedRoot { found: start.name });
            }
            Item::End(name, position) => return Err(ParseError::UnexpectedEnd { name, position }),
            Item::Eof => return Err(ParseError::MissingRoot),
            Item::Other => {}
        }
        Ok(())
    }

    fn in_root(&mut self, item: Item, opened_at: u64) -> Result<Option<RawElement>, ParseError> {
        match item {
            Item::Start(start) => {
                if let Some(kind) = element_kind(&start.name) {
                    let mut element = raw_element(kind, start);
                    self.read_children(&mut element)?;
                    return Ok(Some(element));
                }
                self.root_annotation(&start)?;
                self.skip_subtree(&start)?;
            }
            Item::Empty(start) => {
                if let Some(kind) = element_kind(&start.name) {
                    return Ok(Some(raw_element(kind, start)));
                }
                self.root_annotation(&start)?;
            }
            Item::End(_, _) => self.state = State::AfterRoot,
            Item::Eof => {
                return Err(ParseError::UnexpectedEof {
                    open: ROOT.to_owned(),
                    position: opened_at,
                });
            }
            Item::Other => {}
        }
        Ok(None)
    }

    fn after_root(&mut self, item: Item) -> Result<(), ParseError> {
        match item {
            Item::Eof => self.state = State::Done,
            Item::Start(start) | Item::Empty(start) => {
                return Err(ParseError::UnexpectedElement {
                    name: start.name,
                    parent: "document end".to_owned(),
                    position: start.position,
                });
            }
            Item::End(name, position) => return Err(ParseError::UnexpectedEnd { name, position }),
            Item::Other => {}
        }
        Ok(())
    }

    /// Accept `bounds`, `note` and `meta` at the top level.
    fn root_annotation(&mut self, start: &OwnedStart) -> Result<(), ParseError> {
        match start.name.as_str() {
            "bounds" => {
                self.bounds = parse_bounds(&start.attributes);
                if self.bounds.is_none() {
                    warn!("ignoring <bounds> near byte {} with unusable coordinates", start.position);
                }
                Ok(())
            }
            "note" | "meta" => Ok(()),
            _ => Err(ParseError::UnexpectedElement {
                name: start.name.clone(),
                parent: format!("<{ROOT}>"),
                position: start.position,
            }),
        }
    }

    /// Discard everything up to the end tag matching `start`.
    fn skip_subtree(&mut self, start: &OwnedStart) -> Result<(), ParseError> {
        let mut depth = 1_usize;
        while depth > 0 {
            match self.next_item()? {
                Item::Start(_) => depth += 1,
                Item::End(_, _) => depth -= 1,
                Item::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        open: start.name.clone(),
                        position: start.position,
                    });
                }
                Item::Empty(_) | Item::Other => {}
            }
        }
        Ok(())
    }

    fn read_children(&mut self, element: &mut RawElement) -> Result<(), ParseError> {
        loop {
            match self.next_item()? {
                Item::Empty(child) => push_child(element, child)?,
                Item::Start(child) => {
                    let name = child.name.clone();
                    let position = child.position;
                    push_child(element, child)?;
                    self.close_leaf(&name, position)?;
                }
                Item::End(_, _) => return Ok(()),
                Item::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        open: element.kind.as_str().to_owned(),
                        position: element.position,
                    });
                }
                Item::Other => {}
            }
        }
    }

    /// Consume the end tag of a child written as `<tag ...></tag>`.
    fn close_leaf(&mut self, name: &str, position: u64) -> Result<(), ParseError> {
        loop {
            match self.next_item()? {
                Item::End(_, _) => return Ok(()),
                Item::Start(nested) | Item::Empty(nested) => {
                    return Err(ParseError::UnexpectedElement {
                        name: nested.name,
                        parent: format!("<{name}>"),
                        position: nested.position,
                    });
                }
                Item::Eof => {
                    return Err(ParseError::UnexpectedEof {
                        open: name.to_owned(),
                        position,
                    });
                }
                Item::Other => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for OsmXmlReader<R> {
    type Item = Result<RawElement, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Done {
            return None;
        }
        match self.read_next() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => None,
            Err(err) => {
                self.state = State::Done;
                Some(Err(err))
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for OsmXmlReader<R> {}

fn element_kind(name: &str) -> Option<ElementKind> {
    match name {
        "node" => Some(ElementKind::Node),
        "way" => Some(ElementKind::Way),
        "relation" => Some(ElementKind::Relation),
        _ => None,
    }
}

fn raw_element(kind: ElementKind, start: OwnedStart) -> RawElement {
    let mut element = RawElement::new(kind, start.attributes);
    element.position = start.position;
    element
}

fn push_child(element: &mut RawElement, child: OwnedStart) -> Result<(), ParseError> {
    let mut attributes = child.attributes;
    match (element.kind, child.name.as_str()) {
        (_, "tag") => element.tags.push(RawTag {
            key: attributes.remove("k"),
            value: attributes.remove("v"),
        }),
        (ElementKind::Way, "nd") => element
            .node_refs
            .push(attributes.remove("ref").unwrap_or_default()),
        (ElementKind::Relation, "member") => element.members.push(RawMember {
            kind: attributes.remove("type"),
            reference: attributes.remove("ref"),
            role: attributes.remove("role"),
        }),
        _ => {
            return Err(ParseError::UnexpectedElement {
                name: child.name,
                parent: format!("<{}>", element.kind),
                position: child.position,
            });
        }
    }
    Ok(())
}

fn utf8_name(bytes: &[u8], position: u64) -> Result<String, ParseError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|_| ParseError::InvalidName { position })
}

fn owned_start(start: &BytesStart<'_>, position: u64) -> Result<OwnedStart, ParseError> {
    let name = utf8_name(start.name().as_ref(), position)?;
    let mut attributes = BTreeMap::new();
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|source| ParseError::Xml {
            position,
            source: source.into(),
        })?;
        let key = utf8_name(attribute.key.as_ref(), position)?;
        let value = attribute
            .unescape_value()
            .map_err(|source| ParseError::Xml { position, source })?;
        attributes.insert(key, value.into_owned());
    }
    Ok(OwnedStart {
        name,
        attributes,
        position,
    })
}

fn parse_bounds(attributes: &BTreeMap<String, String>) -> Option<Rect<f64>> {
    let read = |name: &str| {
        attributes
            .get(name)
            .and_then(|value| value.parse::<f64>().ok())
            .filter(|value| value.is_finite())
    };
    let min = Coord {
        x: read("minlon")?,
        y: read("minlat")?,
    };
    let max = Coord {
        x: read("maxlon")?,
        y: read("maxlat")?,
    };
    Some(Rect::new(min, max))
}

#[cfg(test)]
mod tests;
