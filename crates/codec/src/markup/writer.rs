//! In-memory markup writer.

use std::borrow::Cow;
use std::fmt::Display;

use super::{item_key, ARRAY_SIZE_ATTRIBUTE};
use crate::error::{CodecError, Result};

/// Builds one document in memory.
///
/// Output never contains a raw newline or carriage return: both are written
/// as character references so the document can travel inside a
/// newline-terminated network frame.
#[derive(Debug, Default)]
pub struct MarkupWriter {
    out: String,
    open: Vec<String>,
    start_open: bool,
}

impl MarkupWriter {
    /// Empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements currently open.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Markup written so far (a start tag may still be open).
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// Open element `name`.
    pub fn write_start(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.close_start();
        self.out.push('<');
        self.out.push_str(name);
        self.open.push(name.to_string());
        self.start_open = true;
        Ok(())
    }

    /// Add an attribute to the element just opened.
    pub fn write_attribute(&mut self, name: &str, value: impl Display) -> Result<()> {
        if !self.start_open {
            return Err(CodecError::Write(format!(
                "attribute {name} written outside a start tag"
            )));
        }
        validate_name(name)?;
        let value = value.to_string();
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        self.out.push_str(&escape_attribute(&value));
        self.out.push('"');
        Ok(())
    }

    /// Write an inline list as a size attribute plus `item-N` attributes.
    pub fn write_indexed_attributes<T: Display>(&mut self, items: &[T]) -> Result<()> {
        self.write_attribute(ARRAY_SIZE_ATTRIBUTE, items.len())?;
        for (index, item) in items.iter().enumerate() {
            self.write_attribute(&item_key(index), item)?;
        }
        Ok(())
    }

    /// Write character data inside the current element.
    pub fn write_text(&mut self, text: &str) -> Result<()> {
        if self.open.is_empty() {
            return Err(CodecError::Write("text written outside any element".into()));
        }
        self.close_start();
        self.out.push_str(&escape_text(text));
        Ok(())
    }

    /// Close the innermost open element.
    pub fn write_end(&mut self) -> Result<()> {
        let name = self
            .open
            .pop()
            .ok_or_else(|| CodecError::Write("end element without a start".into()))?;
        if self.start_open {
            self.out.push_str("/>");
            self.start_open = false;
        } else {
            self.out.push_str("</");
            self.out.push_str(&name);
            self.out.push('>');
        }
        Ok(())
    }

    /// Finish the document, failing if elements are still open.
    pub fn finish(self) -> Result<String> {
        if let Some(open) = self.open.last() {
            return Err(CodecError::Write(format!("element <{open}> left open")));
        }
        Ok(self.out)
    }

    fn close_start(&mut self) {
        if self.start_open {
            self.out.push('>');
            self.start_open = false;
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.')
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if valid {
        Ok(())
    } else {
        Err(CodecError::Write(format!("invalid markup name {name:?}")))
    }
}

/// Escape an attribute value for double-quoted output.
pub fn escape_attribute(value: &str) -> Cow<'_, str> {
    escape(value, true)
}

/// Escape character data.
pub fn escape_text(text: &str) -> Cow<'_, str> {
    escape(text, false)
}

fn escape(input: &str, attribute: bool) -> Cow<'_, str> {
    let needs = |c: char| match c {
        '&' | '<' | '>' | '\n' | '\r' => true,
        '"' | '\t' => attribute,
        _ => false,
    };
    if !input.chars().any(needs) {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len() + 8);
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '"' if attribute => out.push_str("&quot;"),
            '\t' if attribute => out.push_str("&#9;"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}
