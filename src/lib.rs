//! Facade crate for the osm-wrangle toolkit.
//!
//! This crate re-exports the core data model and the ingestion pipeline, with
//! the SQLite read side behind the `store-sqlite` feature.

#![forbid(unsafe_code)]

pub use wrangle_core::{
    CleaningFlag, ElementKind, Entity, EntityMetadata, EntityRef, EntityStore, RelationMember,
    ShapedElement, Tag, WayMember,
};

#[cfg(feature = "store-sqlite")]
pub use wrangle_core::{SqliteEntityStore, SqliteEntityStoreError};

pub use wrangle_data::{
    AuditOptions, AuditReport, IngestError, IngestOptions, IngestReport, IngestSummary,
    LoadError, Loader, Normaliser, OsmXmlReader, ParseError, RawElement, ReferenceMode, RuleSet,
    ValidationError, audit_osm_xml, ingest_osm_xml, ingest_osm_xml_file,
};
