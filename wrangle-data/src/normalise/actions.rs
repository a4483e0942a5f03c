//! Compiled rule actions.

use std::collections::BTreeMap;

use regex::Regex;
use wrangle_core::CleaningFlag;

/// Outcome of a single action on one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Applied {
    /// New key, when the action moves the tag.
    pub(crate) key: Option<String>,
    pub(crate) value: String,
    pub(crate) flag: Option<CleaningFlag>,
    pub(crate) dropped: bool,
    pub(crate) extra: Option<(String, String)>,
}

impl Applied {
    fn value(value: String) -> Self {
        Self {
            key: None,
            value,
            flag: None,
            dropped: false,
            extra: None,
        }
    }

    fn rekey(key: &str, value: &str) -> Self {
        Self {
            key: Some(key.to_owned()),
            ..Self::value(value.to_owned())
        }
    }

    fn flagged(mut self, flag: Option<CleaningFlag>) -> Self {
        self.flag = flag;
        self
    }
}

/// A [`super::RuleAction`] with its patterns compiled.
#[derive(Debug, Clone)]
pub(crate) enum CompiledAction {
    RenameKey {
        to: String,
    },
    StreetName {
        prefixes: BTreeMap<String, String>,
        suffixes: BTreeMap<String, String>,
    },
    MapValue {
        mapping: BTreeMap<String, String>,
    },
    HouseName {
        number_patterns: Vec<Regex>,
        flat: Regex,
        split: Regex,
        number_key: String,
        flat_key: String,
        drop_suffix: Option<String>,
    },
    HouseNumber {
        valid: Vec<Regex>,
        rekey: BTreeMap<String, String>,
    },
    Phone {
        country_code: String,
    },
    Website {
        scheme: String,
    },
    Postcode {
        complete: Regex,
        partial: Regex,
    },
}

impl CompiledAction {
    pub(crate) fn apply(&self, key: &str, value: &str) -> Applied {
        match self {
            Self::RenameKey { to } => Applied::rekey(to, value),
            Self::StreetName { prefixes, suffixes } => {
                Applied::value(street_name(value, prefixes, suffixes))
            }
            Self::MapValue { mapping } => Applied::value(
                mapping
                    .get(value)
                    .cloned()
                    .unwrap_or_else(|| value.to_owned()),
            ),
            Self::HouseName {
                number_patterns,
                flat,
                split,
                number_key,
                flat_key,
                drop_suffix,
            } => {
                if number_patterns.iter().any(|pattern| pattern.is_match(value)) {
                    return Applied::rekey(number_key, value);
                }
                if flat.is_match(value) {
                    return Applied::rekey(flat_key, value);
                }
                if split.is_match(value) {
                    return split_house_name(key, value, number_key, drop_suffix.as_deref());
                }
                Applied::value(value.to_owned())
            }
            Self::HouseNumber { valid, rekey } => {
                let canonical = canonical_house_number(value);
                if let Some(target) = rekey.get(&canonical) {
                    return Applied::rekey(target, &canonical);
                }
                let flag = (!valid.iter().any(|pattern| pattern.is_match(&canonical)))
                    .then_some(CleaningFlag::InvalidHouseNumber);
                Applied::value(canonical).flagged(flag)
            }
            Self::Phone { country_code } => phone(value, country_code),
            Self::Website { scheme } => {
                if value.is_empty() || value.contains("://") {
                    Applied::value(value.to_owned())
                } else {
                    Applied::value(format!("{scheme}://{value}"))
                }
            }
            Self::Postcode { complete, partial } => {
                let canonical = collapse_whitespace(&value.to_ascii_uppercase());
                let flag = if complete.is_match(&canonical) {
                    None
                } else if partial.is_match(&canonical) {
                    Some(CleaningFlag::IncompletePostcode)
                } else {
                    Some(CleaningFlag::InvalidPostcode)
                };
                Applied::value(canonical).flagged(flag)
            }
        }
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn street_name(
    value: &str,
    prefixes: &BTreeMap<String, String>,
    suffixes: &BTreeMap<String, String>,
) -> String {
    let mut words: Vec<&str> = value.split_whitespace().collect();
    if let [first, .., last] = words.as_mut_slice() {
        if let Some(replacement) = prefixes.get(*first) {
            *first = replacement.as_str();
        }
        if let Some(replacement) = suffixes.get(*last) {
            *last = replacement.as_str();
        }
    }
    words.join(" ")
}

/// `"16 Danesfield Close"` becomes a number tag `16` and the name
/// `Danesfield Close`.
fn split_house_name(key: &str, value: &str, number_key: &str, drop_suffix: Option<&str>) -> Applied {
    let mut words = value.split_whitespace();
    let number = words.next().unwrap_or_default().to_owned();
    let remainder: Vec<&str> = words.collect();
    let dropped = remainder.is_empty()
        || drop_suffix.is_some_and(|suffix| remainder.last() == Some(&suffix));
    Applied {
        key: Some(key.to_owned()),
        value: remainder.join(" "),
        flag: None,
        dropped,
        extra: Some((number_key.to_owned(), number)),
    }
}

fn canonical_house_number(value: &str) -> String {
    value
        .split([',', ';'])
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
}

fn phone(value: &str, country_code: &str) -> Applied {
    let stripped: String = value
        .chars()
        .filter(|c| !matches!(c, ' ' | '(' | ')' | '.' | '-'))
        .collect();
    let international = format!("+{country_code}");
    let trunk = format!("00{country_code}");
    let mut invalid = false;
    let numbers: Vec<String> = stripped
        .split(';')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let national = part
                .strip_prefix(international.as_str())
                .or_else(|| part.strip_prefix(trunk.as_str()))
                .or_else(|| part.strip_prefix(country_code))
                .unwrap_or(part)
                .trim_start_matches('0');
            let digits = national.chars().all(|c| c.is_ascii_digit());
            if !digits || !(9..=10).contains(&national.len()) {
                invalid = true;
            }
            format!("{international}{national}")
        })
        .collect();
    if numbers.is_empty() {
        return Applied::value(value.to_owned()).flagged(Some(CleaningFlag::InvalidPhone));
    }
    Applied::value(numbers.join(";")).flagged(invalid.then_some(CleaningFlag::InvalidPhone))
}
