//! Errors raised while reading OSM XML.

use thiserror::Error;

/// Fatal error raised by [`super::OsmXmlReader`].
///
/// Any of these aborts the stream: the reader yields the error once and is
/// exhausted afterwards.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The underlying XML was malformed or could not be read.
    #[error("malformed OSM XML near byte {position}")]
    Xml {
        /// Byte offset of the event that failed.
        position: u64,
        /// Source error returned by `quick-xml`.
        #[source]
        source: quick_xml::Error,
    },
    /// An element or attribute name was not valid UTF-8.
    #[error("name near byte {position} is not valid UTF-8")]
    InvalidName {
        /// Byte offset of the offending element.
        position: u64,
    },
    /// The input contained no root element.
    #[error("document has no <osm> root element")]
    MissingRoot,
    /// The root element was not `<osm>`.
    #[error("expected an <osm> root element but found <{found}>")]
    UnexpectedRoot {
        /// Name of the root element that was found.
        found: String,
    },
    /// An element appeared where the OSM structure does not allow it.
    #[error("unexpected <{name}> inside {parent} near byte {position}")]
    UnexpectedElement {
        /// Name of the offending element.
        name: String,
        /// Where it appeared (`<osm>`, `<way>`, or `document end`).
        parent: String,
        /// Byte offset of the offending element.
        position: u64,
    },
    /// A closing tag appeared without a matching opening tag.
    #[error("unexpected closing tag </{name}> near byte {position}")]
    UnexpectedEnd {
        /// Name of the closing tag.
        name: String,
        /// Byte offset of the closing tag.
        position: u64,
    },
    /// Input ended while an element was still open.
    #[error("input ended inside <{open}> opened near byte {position}")]
    UnexpectedEof {
        /// Name of the innermost open element.
        open: String,
        /// Byte offset where that element started.
        position: u64,
    },
    /// The configured read deadline passed before the stream was exhausted.
    #[error("read deadline exceeded near byte {position}")]
    DeadlineExceeded {
        /// Byte offset reached when the deadline was detected.
        position: u64,
    },
}
