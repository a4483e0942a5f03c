//! Tag rows and the cleaning flags attached to them.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::EntityRef;

/// `key_type` used for keys without a lower-case namespace.
pub const REGULAR_KEY_TYPE: &str = "regular";

/// Marker recorded on a tag whose value failed validation.
///
/// Flagged tags are stored rather than dropped so the audit trail survives
/// the import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CleaningFlag {
    /// Only the outward part of a postcode is present (e.g. `KT12`).
    IncompletePostcode,
    /// The postcode does not match the configured format.
    InvalidPostcode,
    /// The house number matches none of the accepted shapes.
    InvalidHouseNumber,
    /// The phone number could not be brought into international form.
    InvalidPhone,
}

impl CleaningFlag {
    /// Return the flag as stored in the `flag` column.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IncompletePostcode => "incomplete_postcode",
            Self::InvalidPostcode => "invalid_postcode",
            Self::InvalidHouseNumber => "invalid_house_number",
            Self::InvalidPhone => "invalid_phone",
        }
    }
}

impl std::fmt::Display for CleaningFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CleaningFlag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incomplete_postcode" => Ok(Self::IncompletePostcode),
            "invalid_postcode" => Ok(Self::InvalidPostcode),
            "invalid_house_number" => Ok(Self::InvalidHouseNumber),
            "invalid_phone" => Ok(Self::InvalidPhone),
            other => Err(format!("unknown cleaning flag '{other}'")),
        }
    }
}

/// A cleaned key/value pair attached to an entity.
///
/// # Examples
/// ```
/// use wrangle_core::{EntityRef, Tag};
///
/// let tag = Tag::new(EntityRef::node(1), "addr:street", "High Street");
/// assert_eq!(tag.key_type, "addr");
/// assert!(tag.flag.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tag {
    /// Owning entity.
    pub entity: EntityRef,
    /// Full key, including any namespace (`addr:street`).
    pub key: String,
    /// Cleaned value.
    pub value: String,
    /// Namespace of the key, or [`REGULAR_KEY_TYPE`].
    pub key_type: String,
    /// Validation marker, if the value failed a check.
    pub flag: Option<CleaningFlag>,
}

impl Tag {
    /// Construct an unflagged tag, deriving `key_type` from the key.
    pub fn new(entity: EntityRef, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let key_type = key_type(&key).to_owned();
        Self {
            entity,
            key,
            value: value.into(),
            key_type,
            flag: None,
        }
    }

    /// Attach a cleaning flag.
    #[must_use]
    pub fn with_flag(mut self, flag: Option<CleaningFlag>) -> Self {
        self.flag = flag;
        self
    }
}

/// Derive the namespace of a tag key.
///
/// Keys that start with a lower-case `[a-z_]+:[a-z_]+` prefix report the part
/// before the first colon; all other keys are `regular`.
///
/// # Examples
/// ```
/// use wrangle_core::key_type;
///
/// assert_eq!(key_type("addr:postcode"), "addr");
/// assert_eq!(key_type("name"), "regular");
/// assert_eq!(key_type("Addr:street"), "regular");
/// ```
#[must_use]
pub fn key_type(key: &str) -> &str {
    let Some((namespace, rest)) = key.split_once(':') else {
        return REGULAR_KEY_TYPE;
    };
    let is_lower = |c: char| c.is_ascii_lowercase() || c == '_';
    let rest_starts_lower = rest.chars().next().is_some_and(is_lower);
    if !namespace.is_empty() && namespace.chars().all(is_lower) && rest_starts_lower {
        namespace
    } else {
        REGULAR_KEY_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("addr:street", "addr")]
    #[case("contact:phone", "contact")]
    #[case("old:addr:postcode", "old")]
    #[case("name", "regular")]
    #[case("addr:", "regular")]
    #[case(":street", "regular")]
    #[case("addr:Street", "regular")]
    fn derives_key_type(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(key_type(key), expected);
    }

    #[rstest]
    #[case(CleaningFlag::IncompletePostcode)]
    #[case(CleaningFlag::InvalidPostcode)]
    #[case(CleaningFlag::InvalidHouseNumber)]
    #[case(CleaningFlag::InvalidPhone)]
    fn flags_parse_from_stored_form(#[case] flag: CleaningFlag) {
        assert_eq!(flag.as_str().parse::<CleaningFlag>(), Ok(flag));
    }
}
