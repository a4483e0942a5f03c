//! Built-in cleaning rules.
//!
//! The table reflects an audit of a Surrey (UK) extract: city misspellings,
//! abbreviated street types, house names that are really numbers, and phone
//! numbers in every national and international format.

use std::collections::BTreeMap;

use super::rules::{CleaningRule, RuleAction};

const HOUSE_NUMBER_DIGITS: &str = r"(?i)i?[0-9]{1,4}[A-Z]?";
const HOUSE_NUMBER_RANGE: &str = r"(?i)[0-9]{1,4}[-;,][?:\s]?[0-9]{1,4}[A-Z]?";
const HOUSE_NUMBER_LIST: &str = r"([0-9]{1,4},){1,8}[0-9]{1,4}";
const HOUSE_NUMBER_UNIT: &str = r"(?i)Unit\s[0-9]{1,4}\s?(?:,\s)?[A-Z\s]{0,20}";
const FLAT_NUMBER: &str = r"(?i)Flat\s[0-9]{1,4}\s?(?:,\s)?[A-Z\s]{0,20}";
const NUMBERED_HOUSE_NAME: &str = r"(?i)[0-9]{1,4}\s(?:[A-Z]{1,20}\s[A-Z]{1,20})?";
const POSTCODE_COMPLETE: &str = r"[A-Z]{2}[0-9]{1,2}\s[0-9][A-Z]{2}";
const POSTCODE_PARTIAL: &str = r"[A-Z]{2}[0-9]{1,2}";

fn mapping(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(from, to)| ((*from).to_owned(), (*to).to_owned()))
        .collect()
}

pub(super) fn default_rules() -> Vec<CleaningRule> {
    vec![
        CleaningRule::new(
            "flat_number_key",
            ["addr:flat"],
            RuleAction::RenameKey {
                to: "addr:flatnumber".into(),
            },
        ),
        CleaningRule::new(
            "house_name_key",
            ["addr:name"],
            RuleAction::RenameKey {
                to: "addr:housename".into(),
            },
        ),
        CleaningRule::new(
            "house_name",
            ["addr:housename"],
            RuleAction::HouseName {
                number_patterns: vec![HOUSE_NUMBER_RANGE.into(), HOUSE_NUMBER_DIGITS.into()],
                flat_pattern: FLAT_NUMBER.into(),
                split_pattern: NUMBERED_HOUSE_NAME.into(),
                number_key: "addr:housenumber".into(),
                flat_key: "addr:flatnumber".into(),
                drop_suffix: Some("Street".into()),
            },
        ),
        CleaningRule::new(
            "city",
            ["addr:city"],
            RuleAction::MapValue {
                mapping: mapping(&[
                    ("Easher", "Esher"),
                    ("Walton-on-Thamse", "Walton-on-Thames"),
                    ("Walton-On-Thames", "Walton-on-Thames"),
                    ("West Moseley", "West Molesey"),
                    ("CHERTSEY", "Chertsey"),
                    ("Sunbury", "Sunbury-on-Thames"),
                    ("Sunbury-On-Thames", "Sunbury-on-Thames"),
                    ("Surrey", "Molesey"),
                ]),
            },
        ),
        CleaningRule::new(
            "street_name",
            ["addr:street", "name"],
            RuleAction::StreetName {
                prefixes: mapping(&[("St", "Saint"), ("St.", "Saint")]),
                suffixes: mapping(&[
                    ("ROAD", "Road"),
                    ("Rd", "Road"),
                    ("Rd.", "Road"),
                    ("St", "Street"),
                    ("St.", "Street"),
                    ("Ave", "Avenue"),
                ]),
            },
        ),
        CleaningRule::new(
            "house_number",
            ["addr:housenumber"],
            RuleAction::HouseNumber {
                valid_patterns: vec![
                    HOUSE_NUMBER_DIGITS.into(),
                    HOUSE_NUMBER_UNIT.into(),
                    HOUSE_NUMBER_RANGE.into(),
                    HOUSE_NUMBER_LIST.into(),
                ],
                rekey: mapping(&[
                    ("Council Offices", "addr:housename"),
                    ("Padley", "addr:housename"),
                ]),
            },
        ),
        CleaningRule::new(
            "phone",
            ["Phone", "phone", "contact:phone"],
            RuleAction::Phone {
                country_code: "44".into(),
            },
        ),
        CleaningRule::new(
            "website",
            ["contact:website"],
            RuleAction::Website {
                scheme: "http".into(),
            },
        ),
        CleaningRule::new(
            "postcode",
            ["addr:postcode", "old:addr:postcode", "postal_code"],
            RuleAction::Postcode {
                complete: POSTCODE_COMPLETE.into(),
                partial: POSTCODE_PARTIAL.into(),
            },
        ),
    ]
}
