//! Error types shared by the markup cursor, graph reader and writer.

use std::fmt;
use std::io;

use colonia_core::{ObjectId, ScopeError};
use thiserror::Error;

/// Convenience alias used throughout the codec.
pub type Result<T, E = CodecError> = std::result::Result<T, E>;

/// Errors that abort a read or write.
///
/// Malformed optional attributes never show up here: the attribute accessors
/// log them and fall back to the caller's default.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The byte source or sink failed, or ended before the document did.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
    /// Structural problem in the markup: unexpected or unclosed tag, missing
    /// or malformed required attribute.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// No constructor is registered for the type name.
    #[error("no type registered under {type_name:?}")]
    UnknownType {
        /// Tag or type name that was looked up.
        type_name: String,
    },
    /// A resolved reference has a different concrete type than expected.
    #[error("object {id} is a {found}, expected {expected}")]
    TypeMismatch {
        /// Identifier of the offending object.
        id: ObjectId,
        /// Type the caller asked for.
        expected: String,
        /// Type registered for the id.
        found: String,
    },
    /// An identifier does not name any live object.
    #[error("object {0} is not present")]
    Unresolved(ObjectId),
    /// The write scope is inconsistent.
    #[error("invalid write scope: {0}")]
    Scope(#[from] ScopeError),
    /// The markup writer was driven out of order (attribute after content,
    /// unbalanced end element, invalid name).
    #[error("markup write failed: {0}")]
    Write(String),
    /// The operation is not available in the requested mode.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Structural parse failure, carrying the element it happened at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ParseError {
    /// What went wrong.
    pub message: String,
    /// Local name of the element the cursor was at, if any.
    pub tag: Option<String>,
    /// Attributes of that element, for diagnostics.
    pub attributes: Vec<(String, String)>,
}

impl ParseError {
    /// A parse error with no element context.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tag: None,
            attributes: Vec::new(),
        }
    }

    /// A parse error at a given element.
    pub fn at(
        message: impl Into<String>,
        tag: impl Into<String>,
        attributes: Vec<(String, String)>,
    ) -> Self {
        Self {
            message: message.into(),
            tag: Some(tag.into()),
            attributes,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.message)?;
        if let Some(tag) = &self.tag {
            write!(f, " (at <{tag}")?;
            for (name, value) in &self.attributes {
                write!(f, " {name}={value:?}")?;
            }
            write!(f, ">)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_includes_context() {
        let err = ParseError::at(
            "unit expected, not: colony",
            "colony",
            vec![("id".into(), "colony:1".into())],
        );
        assert_eq!(
            err.to_string(),
            "parse error: unit expected, not: colony (at <colony id=\"colony:1\">)"
        );
    }

    #[test]
    fn parse_error_without_context() {
        assert_eq!(ParseError::new("boom").to_string(), "parse error: boom");
    }
}
