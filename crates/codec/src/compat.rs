//! Identifier rewrites for documents written by older versions.
//!
//! The table is closed: each entry names one historical prefix. Rewrites are
//! applied only to the reserved identifier attribute, only while reading.

use std::borrow::Cow;

/// One legacy prefix and its current spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompatibilityRule {
    /// Prefix (before the `:`) as older versions wrote it.
    pub legacy_prefix: &'static str,
    /// Prefix the current format uses.
    pub current_prefix: &'static str,
}

/// Known legacy identifier prefixes, checked in order.
pub const LEGACY_ID_RULES: &[CompatibilityRule] = &[
    CompatibilityRule {
        legacy_prefix: "tileitemcontainer",
        current_prefix: "tileItemContainer",
    },
    CompatibilityRule {
        legacy_prefix: "goodscontainer",
        current_prefix: "goodsContainer",
    },
];

/// Prefixes this short or shorter are never treated as legacy.
pub const LEGACY_PREFIX_MIN_LEN: usize = 8;

/// Rewrite `id` to its current form if it carries a legacy prefix.
///
/// Returns the input unchanged (borrowed) otherwise.
pub fn upgrade_id(id: &str) -> Cow<'_, str> {
    let Some((prefix, tail)) = id.split_once(':') else {
        return Cow::Borrowed(id);
    };
    if prefix.len() <= LEGACY_PREFIX_MIN_LEN {
        return Cow::Borrowed(id);
    }
    match LEGACY_ID_RULES
        .iter()
        .find(|rule| rule.legacy_prefix == prefix)
    {
        Some(rule) => Cow::Owned(format!("{}:{tail}", rule.current_prefix)),
        None => Cow::Borrowed(id),
    }
}
