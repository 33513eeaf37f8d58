//! Object identifiers.
//!
//! An [`ObjectId`] is an opaque string token naming one entity within one
//! world. Ids are conventionally of the form `prefix:tail` (e.g. `unit:17`),
//! where the prefix names the kind of object, but nothing in the codec relies
//! on that convention except the legacy identifier rewrites.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Separator between an id prefix and its tail.
pub const ID_SEPARATOR: char = ':';

/// Error returned when parsing an invalid [`ObjectId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectIdError {
    message: String,
}

impl ObjectIdError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ObjectIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ObjectIdError {}

/// Stable identifier of an entity within a world.
///
/// Ordering is lexical and stable across runs, which keeps registry dumps and
/// save files deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse an identifier, rejecting empty or whitespace-bearing input.
    pub fn parse(input: &str) -> Result<Self, ObjectIdError> {
        if input.is_empty() {
            return Err(ObjectIdError::new("ObjectId cannot be empty"));
        }
        if input.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ObjectIdError::new(format!(
                "ObjectId {input:?} contains whitespace or control characters"
            )));
        }
        Ok(Self(input.to_string()))
    }

    /// Build an id from a prefix and a numeric tail, e.g. `unit:17`.
    pub fn with_prefix(prefix: &str, tail: impl fmt::Display) -> Self {
        Self(format!("{prefix}{ID_SEPARATOR}{tail}"))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the first `:`, if there is one.
    pub fn prefix(&self) -> Option<&str> {
        self.0.split_once(ID_SEPARATOR).map(|(prefix, _)| prefix)
    }

    /// The part after the first `:`, or the whole id when there is no prefix.
    pub fn tail(&self) -> &str {
        match self.0.split_once(ID_SEPARATOR) {
            Some((_, tail)) => tail,
            None => &self.0,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_id() {
        let id = ObjectId::parse("unit:17").unwrap();
        assert_eq!(id.prefix(), Some("unit"));
        assert_eq!(id.tail(), "17");
        assert_eq!(id.to_string(), "unit:17");
    }

    #[test]
    fn bare_id_has_no_prefix() {
        let id = ObjectId::parse("model.unit.freeColonist").unwrap();
        assert_eq!(id.prefix(), None);
        assert_eq!(id.tail(), "model.unit.freeColonist");
    }

    #[test]
    fn with_prefix_matches_parse() {
        assert_eq!(
            ObjectId::with_prefix("colony", 3),
            ObjectId::parse("colony:3").unwrap()
        );
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(ObjectId::parse("").is_err());
        assert!(ObjectId::parse("unit: 4").is_err());
        assert!(ObjectId::parse("unit:4\n").is_err());
    }
}
