//! The ingestion pipeline: parse, shape, then load in batches.
//!
//! [`ingest_osm_xml`] pulls one element at a time from the parser, shapes it,
//! and buffers shaped elements until a batch is full. Each full batch is
//! written in its own transaction. Validation and referential problems are
//! tallied and the run continues; a parse error stops the run and leaves the
//! in-flight batch unwritten.

mod report;

use std::{
    collections::HashSet,
    io::{BufRead, BufReader},
    time::{Duration, Instant},
};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use log::{error, info, warn};
use rusqlite::Connection;
use thiserror::Error;
use wrangle_core::{EntityRef, ShapedElement};

use crate::{
    load::{LoadError, Loader, OpenStoreError, ReferenceMode, open_database, reset_schema},
    normalise::{Normaliser, RuleSet, ValidationError},
    parse::{OsmXmlReader, ParseError},
};

pub use report::{ErrorTally, IngestReport, IngestSummary, SkippedElement};
pub(crate) use report::serialize_bounds;

/// Default number of elements per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;

/// Knobs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Elements per transaction. Zero is treated as one.
    pub batch_size: usize,
    /// Treatment of membership rows with missing targets.
    pub reference_mode: ReferenceMode,
    /// Cleaning rules applied to tag values.
    pub rules: RuleSet,
    /// Wall-clock limit on reading the document. A limit too large to
    /// represent as an instant means no limit.
    pub timeout: Option<Duration>,
    /// Drop and recreate the schema before loading.
    pub reset: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            reference_mode: ReferenceMode::default(),
            rules: RuleSet::default(),
            timeout: None,
            reset: true,
        }
    }
}

/// Errors that abort an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The document could not be read further.
    #[error("parse failed after {committed_batches} committed batch(es)")]
    Parse {
        /// Parser error.
        #[source]
        source: ParseError,
        /// Batches committed before the failure; they remain stored.
        committed_batches: u64,
    },
    /// The store rejected a write for a reason other than a dangling reference.
    #[error("load failed after {committed_batches} committed batch(es)")]
    Load {
        /// Loader error.
        #[source]
        source: LoadError,
        /// Batches committed before the failure; they remain stored.
        committed_batches: u64,
    },
    /// The input file could not be opened.
    #[error("failed to open OSM XML file at {path:?}")]
    OpenInput {
        /// Input path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The destination database could not be opened.
    #[error(transparent)]
    OpenStore(#[from] OpenStoreError),
}

impl IngestError {
    /// Batches that were committed before the run stopped.
    #[must_use]
    pub const fn committed_batches(&self) -> u64 {
        match self {
            Self::Parse {
                committed_batches, ..
            }
            | Self::Load {
                committed_batches, ..
            } => *committed_batches,
            Self::OpenInput { .. } | Self::OpenStore(_) => 0,
        }
    }
}

/// Ingest the OSM XML document read from `reader` into `connection`.
///
/// # Examples
/// ```
/// use rusqlite::Connection;
/// use wrangle_data::ingest::{IngestOptions, ingest_osm_xml};
///
/// let xml = r#"<osm><node id="1" lat="51.4" lon="-0.4"/></osm>"#;
/// let mut connection = Connection::open_in_memory().unwrap();
/// let report = ingest_osm_xml(xml.as_bytes(), &mut connection, &IngestOptions::default()).unwrap();
/// assert_eq!(report.summary.entities, 1);
/// ```
pub fn ingest_osm_xml<R: BufRead>(
    reader: R,
    connection: &mut Connection,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError> {
    if options.reset {
        reset_schema(connection).map_err(|source| IngestError::Load {
            source: source.into(),
            committed_batches: 0,
        })?;
    }

    let mut parser = OsmXmlReader::new(reader);
    if let Some(deadline) = options
        .timeout
        .and_then(|timeout| Instant::now().checked_add(timeout))
    {
        parser = parser.with_deadline(deadline);
    }
    let mut normaliser = Normaliser::new(options.rules.clone());
    let loader = Loader::new(connection, options.reference_mode).map_err(|source| {
        IngestError::Load {
            source,
            committed_batches: 0,
        }
    })?;
    let mut run = Run::new(loader, options.batch_size);

    for item in parser.by_ref() {
        let raw = item.map_err(|source| {
            error!("aborting ingestion: {source}");
            IngestError::Parse {
                source,
                committed_batches: run.report.summary.batches_committed,
            }
        })?;
        run.report.summary.record_element(raw.kind);
        match normaliser.shape(&raw) {
            Ok(shaped) => run.push(shaped)?,
            Err(validation) => run.skip(&validation),
        }
    }

    run.report.summary.declared_bounds = parser.bounds();
    run.report.summary.tag_stats = normaliser.stats().clone();
    run.finish()
}

/// Ingest the OSM XML file at `osm_path` into the SQLite file at `database`.
///
/// The database and any missing parent directories are created.
pub fn ingest_osm_xml_file(
    osm_path: &Utf8Path,
    database: &Utf8Path,
    options: &IngestOptions,
) -> Result<IngestReport, IngestError> {
    let file = fs_utf8::File::open_ambient(osm_path, ambient_authority()).map_err(|source| {
        IngestError::OpenInput {
            path: osm_path.to_path_buf(),
            source,
        }
    })?;
    let mut connection = open_database(database)?;
    ingest_osm_xml(BufReader::new(file), &mut connection, options)
}

/// State of one run between elements.
struct Run<'conn> {
    loader: Loader<'conn>,
    batch: Vec<ShapedElement>,
    batch_ids: HashSet<EntityRef>,
    batch_size: usize,
    report: IngestReport,
}

impl<'conn> Run<'conn> {
    fn new(loader: Loader<'conn>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            loader,
            batch: Vec::with_capacity(batch_size),
            batch_ids: HashSet::with_capacity(batch_size),
            batch_size,
            report: IngestReport::default(),
        }
    }

    fn skip(&mut self, validation: &ValidationError) {
        warn!("skipping element: {validation}");
        self.report.summary.skipped += 1;
        self.report.errors.record_validation(validation);
    }

    fn push(&mut self, shaped: ShapedElement) -> Result<(), IngestError> {
        let reference = shaped.entity.reference();
        if self.loader.contains(&reference) || !self.batch_ids.insert(reference) {
            self.skip(&ValidationError::DuplicateEntity { reference });
            return Ok(());
        }
        self.batch.push(shaped);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), IngestError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        match self.loader.load_batch(&self.batch) {
            Ok(outcome) => {
                self.report.summary.record_batch(&self.batch, &outcome);
                self.report.errors.record_dangling(&outcome.dropped);
            }
            Err(LoadError::Referential { dangling }) => {
                self.report.summary.record_rejected(self.batch.len());
                self.report.errors.record_dangling(&dangling);
            }
            Err(source) => {
                return Err(IngestError::Load {
                    source,
                    committed_batches: self.report.summary.batches_committed,
                });
            }
        }
        self.batch.clear();
        self.batch_ids.clear();
        Ok(())
    }

    fn finish(mut self) -> Result<IngestReport, IngestError> {
        self.flush()?;
        let committed_batches = self.report.summary.batches_committed;
        let finished = self.loader.finish().map_err(|source| IngestError::Load {
            source,
            committed_batches,
        })?;
        self.report.summary.record_finish(&finished);
        self.report.errors.record_dangling(&finished.unresolved);

        let summary = &self.report.summary;
        info!(
            "ingested {} elements: {} entities in {} batch(es), {} skipped, {} rejected, {} referential error(s)",
            summary.elements(),
            summary.entities,
            summary.batches_committed,
            summary.skipped,
            summary.rejected,
            self.report.errors.referential
        );
        Ok(self.report)
    }
}
