//! Parsing, cleaning and loading of OSM XML extracts.
//!
//! Responsibilities:
//! - Stream `<node>`, `<way>` and `<relation>` records out of an XML extract.
//! - Shape records into relational rows and clean tag values with a
//!   configurable rule table.
//! - Write rows into SQLite one transaction per batch, enforcing referential
//!   integrity between members and their targets.
//! - Audit an extract's tags without loading it.
//!
//! Boundaries:
//! - Row types and store queries live in `wrangle-core`.
//! - No network access; input is a local reader or file.
//!
//! Invariants:
//! - Memory is bounded by one element plus one batch.
//! - A failed batch leaves no rows behind.
//! - No global mutable state.

#![forbid(unsafe_code)]

pub mod audit;
pub mod ingest;
pub mod load;
pub mod normalise;
pub mod parse;

pub use audit::{AuditOptions, AuditReport, audit_osm_xml};
pub use ingest::{
    ErrorTally, IngestError, IngestOptions, IngestReport, IngestSummary, ingest_osm_xml,
    ingest_osm_xml_file,
};
pub use load::{LoadError, Loader, ReferenceMode};
pub use normalise::{Normaliser, RuleSet, ValidationError};
pub use parse::{OsmXmlReader, ParseError, RawElement};
