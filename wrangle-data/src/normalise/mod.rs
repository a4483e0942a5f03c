//! Shape raw OSM elements into relational rows.
//!
//! [`Normaliser::shape`] turns one [`RawElement`] into a [`ShapedElement`]:
//! an entity row with typed metadata, cleaned tag rows and positional
//! membership rows. Elements that cannot produce a valid entity row are
//! rejected with a [`ValidationError`]; individual bad tags are dropped and
//! counted in [`ShapeStats`] instead.

mod actions;
mod defaults;
mod rules;

use std::{collections::BTreeMap, str::FromStr};

use geo::Coord;
use log::{debug, trace};
use serde::Serialize;
use thiserror::Error;
use wrangle_core::{
    CleaningFlag, ElementKind, Entity, EntityMetadata, EntityRef, RelationMember, ShapedElement,
    Tag, WayMember,
};

use crate::parse::{RawElement, RawTag};

pub use rules::{
    CleanedTag, CleaningRule, PROBLEM_CHARS, RuleAction, RuleConfigError, RuleSet,
    has_problem_chars,
};

/// Why an element was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required attribute is absent.
    #[error("{kind} element is missing required attribute '{attribute}'")]
    MissingAttribute {
        /// Kind of the skipped element.
        kind: ElementKind,
        /// Raw identifier, when present.
        raw_id: Option<String>,
        /// Name of the missing attribute.
        attribute: &'static str,
    },
    /// An attribute is present but unusable.
    #[error("{kind} {} has invalid {attribute} '{value}': {reason}", display_id(.raw_id.as_deref()))]
    InvalidAttribute {
        /// Kind of the skipped element.
        kind: ElementKind,
        /// Raw identifier, when present.
        raw_id: Option<String>,
        /// Name of the offending attribute (`lat`, `nd ref`, ...).
        attribute: String,
        /// The value as written.
        value: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// An element with the same kind and id was already accepted.
    #[error("{reference} appears more than once")]
    DuplicateEntity {
        /// The repeated element.
        reference: EntityRef,
    },
}

fn display_id(raw_id: Option<&str>) -> &str {
    raw_id.unwrap_or("<no id>")
}

impl ValidationError {
    /// Kind of the skipped element.
    #[must_use]
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::MissingAttribute { kind, .. } | Self::InvalidAttribute { kind, .. } => *kind,
            Self::DuplicateEntity { reference } => reference.kind,
        }
    }

    /// Identifier of the skipped element as written in the source.
    #[must_use]
    pub fn raw_id(&self) -> Option<String> {
        match self {
            Self::MissingAttribute { raw_id, .. } | Self::InvalidAttribute { raw_id, .. } => {
                raw_id.clone()
            }
            Self::DuplicateEntity { reference } => Some(reference.id.to_string()),
        }
    }

    /// Stable label used to tally errors by reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::MissingAttribute { .. } => "missing_attribute",
            Self::InvalidAttribute { .. } => "invalid_attribute",
            Self::DuplicateEntity { .. } => "duplicate_entity",
        }
    }
}

/// Counters describing what happened to tags while shaping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShapeStats {
    /// Tags whose key contained problem characters.
    pub problem_keys: u64,
    /// Tags lacking `k` or `v`.
    pub incomplete_tags: u64,
    /// Tags dropped because their key was already present.
    pub duplicate_tags: u64,
    /// Tags a rule discarded.
    pub dropped_tags: u64,
    /// Tags a rule split out of another tag's value.
    pub extra_tags: u64,
    /// Tags changed, per rule name.
    pub rule_changes: BTreeMap<String, u64>,
    /// Flagged tags, per flag.
    pub flags: BTreeMap<CleaningFlag, u64>,
}

/// Stateful element shaper.
///
/// The normaliser owns the rule table and accumulates [`ShapeStats`] across
/// every element it shapes.
///
/// # Examples
/// ```
/// use std::collections::BTreeMap;
/// use wrangle_core::ElementKind;
/// use wrangle_data::normalise::{Normaliser, RuleSet};
/// use wrangle_data::parse::{RawElement, RawTag};
///
/// let attributes = BTreeMap::from([
///     ("id".to_owned(), "1".to_owned()),
///     ("lat".to_owned(), "51.40".to_owned()),
///     ("lon".to_owned(), "-0.40".to_owned()),
/// ]);
/// let mut raw = RawElement::new(ElementKind::Node, attributes);
/// raw.tags.push(RawTag {
///     key: Some("name".into()),
///     value: Some("St. Georges Hill".into()),
/// });
///
/// let mut normaliser = Normaliser::new(RuleSet::default());
/// let shaped = normaliser.shape(&raw).unwrap();
/// assert_eq!(shaped.tags[0].value, "Saint Georges Hill");
/// ```
#[derive(Debug, Clone)]
pub struct Normaliser {
    rules: RuleSet,
    stats: ShapeStats,
}

impl Default for Normaliser {
    fn default() -> Self {
        Self::new(RuleSet::default())
    }
}

impl Normaliser {
    /// Create a normaliser applying `rules`.
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            stats: ShapeStats::default(),
        }
    }

    /// The rule table in use.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Counters accumulated so far.
    #[must_use]
    pub const fn stats(&self) -> &ShapeStats {
        &self.stats
    }

    /// Shape one element into rows.
    pub fn shape(&mut self, raw: &RawElement) -> Result<ShapedElement, ValidationError> {
        let fields = Fields { raw };
        let id = fields.required_id()?;
        let metadata = EntityMetadata {
            version: fields.optional::<u32>("version")?,
            changeset: fields.optional::<i64>("changeset")?,
            timestamp: raw.attribute("timestamp").map(str::to_owned),
            user: raw.attribute("user").map(str::to_owned),
            uid: fields.optional::<i64>("uid")?,
        };
        let entity = match raw.kind {
            ElementKind::Node => Entity::node(id, fields.location()?, metadata),
            kind => Entity::without_location(kind, id, metadata),
        };
        let reference = entity.reference();
        let mut shaped = ShapedElement::new(entity);
        shaped.way_members = fields.way_members(id)?;
        shaped.relation_members = fields.relation_members(id)?;
        shaped.tags = self.clean_tags(reference, &raw.tags);
        Ok(shaped)
    }

    /// Clean the tags of one element.
    ///
    /// Keys are unique in the result: the first tag to claim a key wins.
    /// Tags split out by a rule are appended after the element's own tags and
    /// only when their key is still free.
    pub fn clean_tags(&mut self, entity: EntityRef, raw_tags: &[RawTag]) -> Vec<Tag> {
        let mut tags: Vec<Tag> = Vec::with_capacity(raw_tags.len());
        let mut extras = Vec::new();
        for raw in raw_tags {
            let (Some(key), Some(value)) = (raw.key.as_deref(), raw.value.as_deref()) else {
                self.stats.incomplete_tags += 1;
                continue;
            };
            let cleaned = self.rules.clean(key, value);
            self.record(entity, key, value, &cleaned);
            extras.extend(cleaned.extra.iter().cloned());
            if cleaned.dropped {
                self.stats.dropped_tags += 1;
                continue;
            }
            self.push_tag(&mut tags, entity, cleaned);
        }
        for (key, value) in extras {
            if tags.iter().any(|tag| tag.key == key) {
                continue;
            }
            let cleaned = self.rules.clean(&key, &value);
            self.record(entity, &key, &value, &cleaned);
            if cleaned.dropped {
                self.stats.dropped_tags += 1;
                continue;
            }
            if self.push_tag(&mut tags, entity, cleaned) {
                self.stats.extra_tags += 1;
            }
        }
        tags
    }

    fn record(&mut self, entity: EntityRef, key: &str, value: &str, cleaned: &CleanedTag) {
        for rule in &cleaned.changed_by {
            *self.stats.rule_changes.entry(rule.clone()).or_default() += 1;
        }
        if !cleaned.changed_by.is_empty() {
            debug!(
                "{entity}: {key}={value:?} cleaned to {}={:?} by {:?}",
                cleaned.key, cleaned.value, cleaned.changed_by
            );
        }
        if let Some(flag) = cleaned.flag {
            *self.stats.flags.entry(flag).or_default() += 1;
            trace!("{entity}: {}={:?} flagged {flag}", cleaned.key, cleaned.value);
        }
    }

    /// Append a cleaned tag unless its key is unusable or taken.
    fn push_tag(&mut self, tags: &mut Vec<Tag>, entity: EntityRef, cleaned: CleanedTag) -> bool {
        if has_problem_chars(&cleaned.key) {
            self.stats.problem_keys += 1;
            return false;
        }
        if tags.iter().any(|tag| tag.key == cleaned.key) {
            self.stats.duplicate_tags += 1;
            return false;
        }
        tags.push(Tag::new(entity, cleaned.key, cleaned.value).with_flag(cleaned.flag));
        true
    }
}

/// Typed access to a raw element's attributes.
struct Fields<'a> {
    raw: &'a RawElement,
}

impl Fields<'_> {
    fn raw_id(&self) -> Option<String> {
        self.raw.raw_id().map(str::to_owned)
    }

    fn invalid(&self, attribute: &str, value: &str, reason: &'static str) -> ValidationError {
        ValidationError::InvalidAttribute {
            kind: self.raw.kind,
            raw_id: self.raw_id(),
            attribute: attribute.to_owned(),
            value: value.to_owned(),
            reason,
        }
    }

    fn required_id(&self) -> Result<i64, ValidationError> {
        let value = self
            .raw
            .raw_id()
            .ok_or(ValidationError::MissingAttribute {
                kind: self.raw.kind,
                raw_id: None,
                attribute: "id",
            })?;
        value
            .trim()
            .parse()
            .map_err(|_| self.invalid("id", value, "not an integer"))
    }

    fn optional<T: FromStr>(&self, attribute: &str) -> Result<Option<T>, ValidationError> {
        self.raw
            .attribute(attribute)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .map_err(|_| self.invalid(attribute, value, "not a valid number"))
            })
            .transpose()
    }

    fn coordinate(&self, attribute: &str, limit: f64) -> Result<Option<f64>, ValidationError> {
        let Some(degrees) = self.optional::<f64>(attribute)? else {
            return Ok(None);
        };
        if !degrees.is_finite() || degrees.abs() > limit {
            let value = self.raw.attribute(attribute).unwrap_or_default();
            return Err(self.invalid(attribute, value, "outside the valid range"));
        }
        Ok(Some(degrees))
    }

    fn location(&self) -> Result<Option<Coord<f64>>, ValidationError> {
        let lat = self.coordinate("lat", 90.0)?;
        let lon = self.coordinate("lon", 180.0)?;
        match (lat, lon) {
            (Some(y), Some(x)) => Ok(Some(Coord { x, y })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(self.invalid("lon", "", "latitude given without longitude")),
            (None, Some(_)) => Err(self.invalid("lat", "", "longitude given without latitude")),
        }
    }

    fn position(&self, index: usize) -> Result<u32, ValidationError> {
        u32::try_from(index).map_err(|_| self.invalid("members", &index.to_string(), "too many members"))
    }

    fn reference(&self, attribute: &str, value: &str) -> Result<i64, ValidationError> {
        value
            .trim()
            .parse()
            .map_err(|_| self.invalid(attribute, value, "not an integer"))
    }

    fn way_members(&self, way_id: i64) -> Result<Vec<WayMember>, ValidationError> {
        self.raw
            .node_refs
            .iter()
            .enumerate()
            .map(|(index, node_ref)| {
                Ok(WayMember {
                    way_id,
                    node_id: self.reference("nd ref", node_ref)?,
                    position: self.position(index)?,
                })
            })
            .collect()
    }

    fn relation_members(&self, relation_id: i64) -> Result<Vec<RelationMember>, ValidationError> {
        self.raw
            .members
            .iter()
            .enumerate()
            .map(|(index, member)| {
                let kind_text = member.kind.as_deref().unwrap_or_default();
                let kind = kind_text
                    .parse::<ElementKind>()
                    .map_err(|_| self.invalid("member type", kind_text, "not node, way or relation"))?;
                let id = self.reference("member ref", member.reference.as_deref().unwrap_or_default())?;
                Ok(RelationMember {
                    relation_id,
                    member: EntityRef::new(kind, id),
                    role: member.role.clone().unwrap_or_default(),
                    position: self.position(index)?,
                })
            })
            .collect()
    }
}
