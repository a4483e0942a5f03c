//! Read-only survey of an extract's tags.
//!
//! An audit walks the document once without touching a database. It counts
//! keys, street-name endings and selected value distributions, and records
//! what the cleaning rules would change or flag, so a rule table can be
//! tuned before anything is loaded.

use std::{collections::BTreeMap, io::BufRead};

use geo::Rect;
use log::info;
use serde::Serialize;
use wrangle_core::{CleaningFlag, ElementKind};

use crate::{
    ingest::serialize_bounds,
    normalise::{RuleSet, has_problem_chars},
    parse::{OsmXmlReader, ParseError, RawElement},
};

/// Default number of example values kept per rule and per flag.
pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

/// What an audit looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    /// Keys whose values are street names; their last word is tallied.
    pub street_keys: Vec<String>,
    /// Keys whose full value distribution is reported.
    pub value_keys: Vec<String>,
    /// Example values kept per rule and per flag.
    pub sample_limit: usize,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            street_keys: vec!["addr:street".to_owned()],
            value_keys: ["addr:city", "addr:country", "addr:interpolation", "type"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            sample_limit: DEFAULT_SAMPLE_LIMIT,
        }
    }
}

/// Elements seen, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ElementCounts {
    /// `<node>` elements.
    pub nodes: u64,
    /// `<way>` elements.
    pub ways: u64,
    /// `<relation>` elements.
    pub relations: u64,
}

/// One value a rule would rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueChange {
    /// Key and value as written.
    pub before: (String, String),
    /// Key and value after cleaning; `None` when the tag would be dropped.
    pub after: Option<(String, String)>,
}

/// What one rule would do across the extract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleAudit {
    /// Tags the rule would change.
    pub changed: u64,
    /// Distinct examples, in first-seen order.
    pub examples: Vec<ValueChange>,
}

/// Values a rule would flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlagAudit {
    /// Tags that would carry the flag.
    pub count: u64,
    /// Distinct flagged values, in first-seen order.
    pub examples: Vec<String>,
}

/// Findings of one audit pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditReport {
    /// Elements seen.
    pub elements: ElementCounts,
    /// Complete tags seen.
    pub tags: u64,
    /// Tags lacking `k` or `v`.
    pub incomplete_tags: u64,
    /// Occurrences of each key.
    pub key_counts: BTreeMap<String, u64>,
    /// Keys containing problem characters, with occurrences.
    pub problem_keys: BTreeMap<String, u64>,
    /// Last word of each street name, with occurrences.
    pub street_types: BTreeMap<String, u64>,
    /// Value distributions of the configured keys.
    pub values: BTreeMap<String, BTreeMap<String, u64>>,
    /// What each rule would change.
    pub rules: BTreeMap<String, RuleAudit>,
    /// What the rules would flag.
    pub flags: BTreeMap<CleaningFlag, FlagAudit>,
    /// Extent declared by the document's `<bounds>` element.
    #[serde(serialize_with = "serialize_bounds")]
    pub bounds: Option<Rect<f64>>,
}

/// Accumulates an [`AuditReport`] one element at a time.
#[derive(Debug, Clone)]
pub struct Auditor<'rules> {
    rules: &'rules RuleSet,
    options: AuditOptions,
    report: AuditReport,
}

impl<'rules> Auditor<'rules> {
    /// Start an empty audit against `rules`.
    #[must_use]
    pub fn new(rules: &'rules RuleSet, options: AuditOptions) -> Self {
        Self {
            rules,
            options,
            report: AuditReport::default(),
        }
    }

    /// Take one element into account.
    pub fn observe(&mut self, element: &RawElement) {
        let counts = &mut self.report.elements;
        match element.kind {
            ElementKind::Node => counts.nodes += 1,
            ElementKind::Way => counts.ways += 1,
            ElementKind::Relation => counts.relations += 1,
        }
        for tag in &element.tags {
            match (tag.key.as_deref(), tag.value.as_deref()) {
                (Some(key), Some(value)) => self.observe_tag(key, value),
                _ => self.report.incomplete_tags += 1,
            }
        }
    }

    fn observe_tag(&mut self, key: &str, value: &str) {
        let report = &mut self.report;
        report.tags += 1;
        *report.key_counts.entry(key.to_owned()).or_default() += 1;
        if has_problem_chars(key) {
            *report.problem_keys.entry(key.to_owned()).or_default() += 1;
        }
        if self.options.street_keys.iter().any(|street| street == key)
            && let Some(ending) = value.split_whitespace().last()
        {
            *report.street_types.entry(ending.to_owned()).or_default() += 1;
        }
        if self.options.value_keys.iter().any(|wanted| wanted == key) {
            *report
                .values
                .entry(key.to_owned())
                .or_default()
                .entry(value.to_owned())
                .or_default() += 1;
        }

        let cleaned = self.rules.clean(key, value);
        let limit = self.options.sample_limit;
        if !cleaned.changed_by.is_empty() {
            let change = ValueChange {
                before: (key.to_owned(), value.to_owned()),
                after: (!cleaned.dropped).then(|| (cleaned.key.clone(), cleaned.value.clone())),
            };
            for rule in &cleaned.changed_by {
                let audit = report.rules.entry(rule.clone()).or_default();
                audit.changed += 1;
                push_sample(&mut audit.examples, &change, limit);
            }
        }
        if let Some(flag) = cleaned.flag {
            let audit = report.flags.entry(flag).or_default();
            audit.count += 1;
            push_sample(&mut audit.examples, &cleaned.value, limit);
        }
    }

    /// The findings so far.
    #[must_use]
    pub const fn report(&self) -> &AuditReport {
        &self.report
    }

    /// Finish the audit.
    #[must_use]
    pub fn into_report(self) -> AuditReport {
        self.report
    }
}

fn push_sample<T: Clone + PartialEq>(samples: &mut Vec<T>, sample: &T, limit: usize) {
    if samples.len() < limit && !samples.contains(sample) {
        samples.push(sample.clone());
    }
}

/// Audit the OSM XML document read from `reader`.
///
/// # Examples
/// ```
/// use wrangle_data::audit::{AuditOptions, audit_osm_xml};
/// use wrangle_data::normalise::RuleSet;
///
/// let xml = r#"<osm><node id="1" lat="51.3" lon="-0.4">
///     <tag k="addr:street" v="Station Rd"/>
/// </node></osm>"#;
/// let rules = RuleSet::builtin().unwrap();
/// let report = audit_osm_xml(xml.as_bytes(), &rules, AuditOptions::default()).unwrap();
/// assert_eq!(report.street_types.get("Rd"), Some(&1));
/// assert_eq!(report.rules["street_name"].changed, 1);
/// ```
pub fn audit_osm_xml<R: BufRead>(
    reader: R,
    rules: &RuleSet,
    options: AuditOptions,
) -> Result<AuditReport, ParseError> {
    let mut parser = OsmXmlReader::new(reader);
    let mut auditor = Auditor::new(rules, options);
    for element in parser.by_ref() {
        auditor.observe(&element?);
    }
    let mut report = auditor.into_report();
    report.bounds = parser.bounds();
    info!(
        "audited {} tags on {} elements: {} distinct keys, {} rule(s) would change values",
        report.tags,
        report.elements.nodes + report.elements.ways + report.elements.relations,
        report.key_counts.len(),
        report.rules.len()
    );
    Ok(report)
}
