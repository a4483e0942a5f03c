//! End-of-run report for an ingestion pass.

use std::collections::BTreeMap;

use geo::{Coord, Rect};
use serde::{Serialize, Serializer};
use wrangle_core::{ElementKind, ShapedElement};

use crate::{
    load::{BatchOutcome, DanglingReference, FinishOutcome},
    normalise::{ShapeStats, ValidationError},
};

/// Element and row counts for one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct IngestSummary {
    /// `<node>` elements read.
    pub nodes: u64,
    /// `<way>` elements read.
    pub ways: u64,
    /// `<relation>` elements read.
    pub relations: u64,
    /// Elements skipped by validation.
    pub skipped: u64,
    /// Elements discarded with a rejected batch.
    pub rejected: u64,
    /// Entity rows committed.
    pub entities: u64,
    /// Tag rows committed.
    pub tags: u64,
    /// Way membership rows committed.
    pub way_members: u64,
    /// Relation membership rows committed.
    pub relation_members: u64,
    /// Batches committed.
    pub batches_committed: u64,
    /// Batches rejected for dangling references.
    pub batches_rejected: u64,
    /// Bounding box of committed node coordinates (`x = lon`, `y = lat`).
    #[serde(serialize_with = "serialize_bounds")]
    pub bounds: Option<Rect<f64>>,
    /// Extent declared by the document's `<bounds>` element.
    #[serde(serialize_with = "serialize_bounds")]
    pub declared_bounds: Option<Rect<f64>>,
    /// What happened to tags during shaping.
    pub tag_stats: ShapeStats,
}

impl IngestSummary {
    /// Elements read, of any kind.
    #[must_use]
    pub const fn elements(&self) -> u64 {
        self.nodes + self.ways + self.relations
    }

    pub(crate) fn record_element(&mut self, kind: ElementKind) {
        match kind {
            ElementKind::Node => self.nodes += 1,
            ElementKind::Way => self.ways += 1,
            ElementKind::Relation => self.relations += 1,
        }
    }

    pub(crate) fn record_batch(&mut self, batch: &[ShapedElement], outcome: &BatchOutcome) {
        self.batches_committed += 1;
        self.entities += outcome.entities;
        self.tags += outcome.tags;
        self.way_members += outcome.way_members;
        self.relation_members += outcome.relation_members;
        for location in batch.iter().filter_map(|element| element.entity.location) {
            self.include_bounds(Rect::new(location, location));
        }
    }

    pub(crate) fn record_rejected(&mut self, batch_len: usize) {
        self.batches_rejected += 1;
        self.rejected += u64::try_from(batch_len).unwrap_or(u64::MAX);
    }

    pub(crate) fn record_finish(&mut self, outcome: &FinishOutcome) {
        self.way_members += outcome.way_members;
        self.relation_members += outcome.relation_members;
    }

    fn include_bounds(&mut self, bounds: Rect<f64>) {
        match &mut self.bounds {
            Some(existing) => {
                let min = Coord {
                    x: existing.min().x.min(bounds.min().x),
                    y: existing.min().y.min(bounds.min().y),
                };
                let max = Coord {
                    x: existing.max().x.max(bounds.max().x),
                    y: existing.max().y.max(bounds.max().y),
                };
                *existing = Rect::new(min, max);
            }
            None => self.bounds = Some(bounds),
        }
    }
}

/// An element left out of the store by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedElement {
    /// Element kind.
    pub kind: ElementKind,
    /// Identifier as written, if any.
    pub raw_id: Option<String>,
    /// Stable reason label (see [`ValidationError::reason`]).
    pub reason: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// Recoverable errors met during a run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ErrorTally {
    /// Validation errors, per reason label.
    pub validation: BTreeMap<&'static str, u64>,
    /// Dangling membership rows: rejected, dropped or never resolved.
    pub referential: u64,
    /// Every skipped element.
    pub skipped: Vec<SkippedElement>,
    /// Every dangling membership row.
    pub dangling: Vec<DanglingReference>,
}

impl ErrorTally {
    /// Validation errors of any reason.
    #[must_use]
    pub fn validation_total(&self) -> u64 {
        self.validation.values().sum()
    }

    pub(crate) fn record_validation(&mut self, error: &ValidationError) {
        *self.validation.entry(error.reason()).or_default() += 1;
        self.skipped.push(SkippedElement {
            kind: error.kind(),
            raw_id: error.raw_id(),
            reason: error.reason(),
            message: error.to_string(),
        });
    }

    pub(crate) fn record_dangling(&mut self, dangling: &[DanglingReference]) {
        self.referential += u64::try_from(dangling.len()).unwrap_or(u64::MAX);
        self.dangling.extend_from_slice(dangling);
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct IngestReport {
    /// Counts and extent.
    pub summary: IngestSummary,
    /// Recoverable errors.
    pub errors: ErrorTally,
}

#[derive(Serialize)]
struct BoundsRepr {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

#[expect(
    clippy::ref_option,
    reason = "serde's serialize_with passes a reference to the field"
)]
pub(crate) fn serialize_bounds<S: Serializer>(
    bounds: &Option<Rect<f64>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    bounds
        .map(|rect| BoundsRepr {
            min_lon: rect.min().x,
            min_lat: rect.min().y,
            max_lon: rect.max().x,
            max_lat: rect.max().y,
        })
        .serialize(serializer)
}
