//! Declarative cleaning rules and their validation.
//!
//! A [`RuleSet`] is an ordered list of [`CleaningRule`]s. Each rule names the
//! tag keys it owns and one [`RuleAction`]. Loading a set checks that every
//! action is a fixed point of itself, so cleaning already-clean tags changes
//! nothing.

use std::{
    collections::{BTreeMap, HashMap},
    io::Read,
};

use log::error;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::actions::CompiledAction;

/// Characters that may not appear in a stored tag key.
pub const PROBLEM_CHARS: &[char] = &[
    '=', '+', '/', '&', '<', '>', ';', '\'', '"', '?', '%', '#', '$', '@', ',', '.',
];

/// Whether `key` contains a problem character or whitespace.
#[must_use]
pub fn has_problem_chars(key: &str) -> bool {
    key.chars()
        .any(|c| c.is_whitespace() || PROBLEM_CHARS.contains(&c))
}

/// What a rule does to the tags it owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RuleAction {
    /// Move the value to another key.
    RenameKey {
        /// Replacement key.
        to: String,
    },
    /// Collapse whitespace, then canonicalise the first and last word.
    StreetName {
        /// Replacements for the first word of multi-word values.
        #[serde(default)]
        prefixes: BTreeMap<String, String>,
        /// Replacements for the last word of multi-word values.
        #[serde(default)]
        suffixes: BTreeMap<String, String>,
    },
    /// Replace whole values.
    MapValue {
        /// Erroneous value to corrected value.
        mapping: BTreeMap<String, String>,
    },
    /// Move numbers and flat designations out of house names.
    HouseName {
        /// Values moved wholesale to `number_key`.
        number_patterns: Vec<String>,
        /// Values moved wholesale to `flat_key`.
        flat_pattern: String,
        /// `"<number> <name>"` values split into a number tag and the name.
        split_pattern: String,
        /// Key receiving house numbers.
        number_key: String,
        /// Key receiving flat designations.
        flat_key: String,
        /// Drop the name remainder when its last word equals this.
        #[serde(default)]
        drop_suffix: Option<String>,
    },
    /// Canonicalise list separators and check the result.
    HouseNumber {
        /// Accepted shapes; anything else is flagged.
        valid_patterns: Vec<String>,
        /// Values that are not numbers at all, mapped to the key they belong
        /// under.
        #[serde(default)]
        rekey: BTreeMap<String, String>,
    },
    /// Rewrite phone numbers to `+<country code><national number>`.
    Phone {
        /// Country calling code without `+`, e.g. `44`.
        country_code: String,
    },
    /// Prefix a URL scheme when the value has none.
    Website {
        /// Scheme to add, e.g. `http`.
        scheme: String,
    },
    /// Upper-case postcodes and flag incomplete or invalid ones.
    Postcode {
        /// Full postcode shape.
        complete: String,
        /// Outward-code-only shape, flagged as incomplete.
        partial: String,
    },
}

/// One entry in the rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningRule {
    /// Name used in logs and audit reports.
    pub name: String,
    /// Tag keys this rule owns.
    pub keys: Vec<String>,
    /// What the rule does.
    #[serde(flatten)]
    pub action: RuleAction,
}

impl CleaningRule {
    /// Create a rule owning `keys`.
    pub fn new<I, S>(name: impl Into<String>, keys: I, action: RuleAction) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            keys: keys.into_iter().map(Into::into).collect(),
            action,
        }
    }
}

/// Errors raised when a rule table is rejected.
#[derive(Debug, Error)]
pub enum RuleConfigError {
    /// The rule document was not valid JSON for a rule table.
    #[error("failed to read cleaning rules")]
    Json {
        /// Source error returned by `serde_json`.
        #[source]
        source: serde_json::Error,
    },
    /// A rule owns no keys.
    #[error("rule '{rule}' lists no keys")]
    EmptyKeys {
        /// Offending rule.
        rule: String,
    },
    /// A pattern failed to compile.
    #[error("rule '{rule}' has invalid pattern '{pattern}'")]
    InvalidPattern {
        /// Offending rule.
        rule: String,
        /// Pattern as written.
        pattern: String,
        /// Source error returned by `regex`.
        #[source]
        source: regex::Error,
    },
    /// A mapping output is also a mapping input, so cleaning twice would
    /// change the value again.
    #[error("rule '{rule}' maps to '{value}', which it also maps from")]
    MappingNotIdempotent {
        /// Offending rule.
        rule: String,
        /// The value that is both input and output.
        value: String,
    },
    /// A word replacement is empty or spans several words.
    #[error("rule '{rule}' replaces a word with '{value}', which is not a single word")]
    NotSingleWord {
        /// Offending rule.
        rule: String,
        /// The replacement.
        value: String,
    },
    /// A target key is empty or contains problem characters.
    #[error("rule '{rule}' targets key '{key}', which cannot be stored")]
    InvalidTargetKey {
        /// Offending rule.
        rule: String,
        /// The target key.
        key: String,
    },
    /// A rule re-keys values onto one of its own keys.
    #[error("rule '{rule}' re-keys values onto its own key '{key}'")]
    SelfTarget {
        /// Offending rule.
        rule: String,
        /// The key owned by the rule.
        key: String,
    },
}

/// Validated, compiled rule table.
///
/// # Examples
/// ```
/// use wrangle_data::normalise::RuleSet;
///
/// let rules = RuleSet::default();
/// let cleaned = rules.clean("addr:street", "Station Rd");
/// assert_eq!(cleaned.value, "Station Road");
/// ```
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CleaningRule>,
    compiled: Vec<CompiledAction>,
    by_key: HashMap<String, usize>,
}

/// The result of passing one tag through a [`RuleSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanedTag {
    /// Final key.
    pub key: String,
    /// Final value.
    pub value: String,
    /// Flag raised by the last rule applied.
    pub flag: Option<wrangle_core::CleaningFlag>,
    /// Whether a rule discarded the tag.
    pub dropped: bool,
    /// Additional tags a rule split out of the value.
    pub extra: Vec<(String, String)>,
    /// Names of rules that changed the tag, in application order.
    pub changed_by: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RuleDocument {
    rules: Vec<CleaningRule>,
}

impl RuleSet {
    /// Validate and compile a list of rules.
    pub fn new(rules: Vec<CleaningRule>) -> Result<Self, RuleConfigError> {
        let compiled = rules
            .iter()
            .map(compile_rule)
            .collect::<Result<Vec<_>, _>>()?;
        let mut by_key = HashMap::new();
        for (index, rule) in rules.iter().enumerate() {
            for key in &rule.keys {
                by_key.entry(key.clone()).or_insert(index);
            }
        }
        Ok(Self {
            rules,
            compiled,
            by_key,
        })
    }

    /// A table with no rules; tags pass through unchanged.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            compiled: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    /// Read a JSON rule document of the form `{"rules": [...]}`.
    ///
    /// # Examples
    /// ```
    /// use wrangle_data::normalise::RuleSet;
    ///
    /// let json = r#"{"rules": [
    ///     {"name": "flat", "keys": ["addr:flat"], "action": "rename_key", "to": "addr:flatnumber"}
    /// ]}"#;
    /// let rules = RuleSet::from_json_reader(json.as_bytes()).unwrap();
    /// assert_eq!(rules.clean("addr:flat", "3").key, "addr:flatnumber");
    /// ```
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, RuleConfigError> {
        let document: RuleDocument = serde_json::from_reader(reader)
            .map_err(|source| RuleConfigError::Json { source })?;
        Self::new(document.rules)
    }

    /// The built-in table, derived from auditing a Surrey extract.
    pub fn builtin() -> Result<Self, RuleConfigError> {
        Self::new(super::defaults::default_rules())
    }

    /// Rules in dispatch order.
    #[must_use]
    pub fn rules(&self) -> &[CleaningRule] {
        &self.rules
    }

    /// The rule that owns `key`, if any.
    #[must_use]
    pub fn rule_for(&self, key: &str) -> Option<&CleaningRule> {
        self.by_key.get(key).map(|&index| &self.rules[index])
    }

    /// Pass one tag through the table.
    ///
    /// The owning rule is applied; when it moves the tag to a new key, the
    /// rule owning that key is applied next. Each rule runs at most once per
    /// tag.
    #[must_use]
    pub fn clean(&self, key: &str, value: &str) -> CleanedTag {
        let mut cleaned = CleanedTag {
            key: key.to_owned(),
            value: value.to_owned(),
            flag: None,
            dropped: false,
            extra: Vec::new(),
            changed_by: Vec::new(),
        };
        let mut visited = vec![false; self.rules.len()];
        while let Some(&index) = self.by_key.get(&cleaned.key) {
            if visited[index] {
                break;
            }
            visited[index] = true;

            let applied = self.compiled[index].apply(&cleaned.key, &cleaned.value);
            let rekeyed = applied.key.filter(|new_key| *new_key != cleaned.key);
            if rekeyed.is_some()
                || applied.value != cleaned.value
                || applied.dropped
                || applied.extra.is_some()
            {
                cleaned.changed_by.push(self.rules[index].name.clone());
            }
            cleaned.value = applied.value;
            cleaned.flag = applied.flag;
            cleaned.extra.extend(applied.extra);
            if applied.dropped {
                cleaned.dropped = true;
                break;
            }
            match rekeyed {
                Some(new_key) => cleaned.key = new_key,
                None => break,
            }
        }
        cleaned
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin().unwrap_or_else(|err| {
            error!("built-in cleaning rules failed validation: {err}");
            Self::empty()
        })
    }
}

fn compile_rule(rule: &CleaningRule) -> Result<CompiledAction, RuleConfigError> {
    if rule.keys.is_empty() {
        return Err(RuleConfigError::EmptyKeys {
            rule: rule.name.clone(),
        });
    }
    let checker = RuleChecker { rule };
    match &rule.action {
        RuleAction::RenameKey { to } => {
            checker.target_key(to)?;
            Ok(CompiledAction::RenameKey { to: to.clone() })
        }
        RuleAction::StreetName { prefixes, suffixes } => {
            checker.word_mapping(prefixes)?;
            checker.word_mapping(suffixes)?;
            Ok(CompiledAction::StreetName {
                prefixes: prefixes.clone(),
                suffixes: suffixes.clone(),
            })
        }
        RuleAction::MapValue { mapping } => {
            checker.idempotent_mapping(mapping)?;
            Ok(CompiledAction::MapValue {
                mapping: mapping.clone(),
            })
        }
        RuleAction::HouseName {
            number_patterns,
            flat_pattern,
            split_pattern,
            number_key,
            flat_key,
            drop_suffix,
        } => {
            checker.target_key(number_key)?;
            checker.target_key(flat_key)?;
            Ok(CompiledAction::HouseName {
                number_patterns: checker.patterns(number_patterns)?,
                flat: checker.pattern(flat_pattern)?,
                split: checker.pattern(split_pattern)?,
                number_key: number_key.clone(),
                flat_key: flat_key.clone(),
                drop_suffix: drop_suffix.clone(),
            })
        }
        RuleAction::HouseNumber {
            valid_patterns,
            rekey,
        } => {
            for key in rekey.values() {
                checker.target_key(key)?;
            }
            Ok(CompiledAction::HouseNumber {
                valid: checker.patterns(valid_patterns)?,
                rekey: rekey.clone(),
            })
        }
        RuleAction::Phone { country_code } => Ok(CompiledAction::Phone {
            country_code: country_code.clone(),
        }),
        RuleAction::Website { scheme } => Ok(CompiledAction::Website {
            scheme: scheme.clone(),
        }),
        RuleAction::Postcode { complete, partial } => Ok(CompiledAction::Postcode {
            complete: checker.pattern(complete)?,
            partial: checker.pattern(partial)?,
        }),
    }
}

struct RuleChecker<'a> {
    rule: &'a CleaningRule,
}

impl RuleChecker<'_> {
    fn name(&self) -> String {
        self.rule.name.clone()
    }

    fn pattern(&self, pattern: &str) -> Result<Regex, RuleConfigError> {
        Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            RuleConfigError::InvalidPattern {
                rule: self.name(),
                pattern: pattern.to_owned(),
                source,
            }
        })
    }

    fn patterns(&self, patterns: &[String]) -> Result<Vec<Regex>, RuleConfigError> {
        patterns.iter().map(|pattern| self.pattern(pattern)).collect()
    }

    fn target_key(&self, key: &str) -> Result<(), RuleConfigError> {
        if key.is_empty() || has_problem_chars(key) {
            return Err(RuleConfigError::InvalidTargetKey {
                rule: self.name(),
                key: key.to_owned(),
            });
        }
        if self.rule.keys.iter().any(|owned| owned == key) {
            return Err(RuleConfigError::SelfTarget {
                rule: self.name(),
                key: key.to_owned(),
            });
        }
        Ok(())
    }

    fn idempotent_mapping(&self, mapping: &BTreeMap<String, String>) -> Result<(), RuleConfigError> {
        match mapping.values().find(|value| mapping.contains_key(*value)) {
            Some(value) => Err(RuleConfigError::MappingNotIdempotent {
                rule: self.name(),
                value: value.clone(),
            }),
            None => Ok(()),
        }
    }

    fn word_mapping(&self, mapping: &BTreeMap<String, String>) -> Result<(), RuleConfigError> {
        if let Some(value) = mapping
            .values()
            .find(|value| value.split_whitespace().count() != 1 || value.trim() != value.as_str())
        {
            return Err(RuleConfigError::NotSingleWord {
                rule: self.name(),
                value: value.clone(),
            });
        }
        self.idempotent_mapping(mapping)
    }
}
