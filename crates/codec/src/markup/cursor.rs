//! Forward-only cursor over a markup stream.

use std::fmt::Display;
use std::io::Read;
use std::str::FromStr;

use tracing::{trace, warn};

use super::lexer::{Attribute, Lexer, MarkupEvent};
use super::{item_key, ARRAY_SIZE_ATTRIBUTE};
use crate::error::{CodecError, ParseError, Result};

/// Kind of tag the cursor stopped at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// A start tag; its attributes are available.
    Start,
    /// An end tag.
    End,
}

#[derive(Debug)]
enum Position {
    Begin,
    Start {
        name: String,
        attributes: Vec<Attribute>,
    },
    End {
        name: String,
    },
    Eof,
}

/// Options for [`MarkupReader`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CursorOptions {
    /// Emit a trace event for every tag transition.
    pub trace: bool,
}

/// Forward-only reader positioned on one tag at a time.
///
/// Navigation skips whitespace between tags; any other character data between
/// tags is a parse error except where [`MarkupReader::element_text`] asks for
/// it explicitly.
pub struct MarkupReader<'a> {
    lexer: Lexer<'a>,
    position: Position,
    depth: usize,
    trace: bool,
}

impl<'a> MarkupReader<'a> {
    /// Cursor over `source`, positioned before the first tag.
    pub fn new<R: Read + 'a>(source: R) -> Self {
        Self::with_options(source, CursorOptions::default())
    }

    /// Cursor with explicit options.
    pub fn with_options<R: Read + 'a>(source: R, options: CursorOptions) -> Self {
        Self {
            lexer: Lexer::new(source),
            position: Position::Begin,
            depth: 0,
            trace: options.trace,
        }
    }

    /// Nesting depth of the current tag (1 for the document element).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Advance to the next start or end tag.
    ///
    /// Reaching the end of the document here is a parse error; use
    /// [`MarkupReader::try_next_tag`] where the document may legitimately end.
    pub fn next_tag(&mut self) -> Result<TagKind> {
        match self.try_next_tag()? {
            Some(kind) => Ok(kind),
            None => Err(self.parse_error("unexpected end of document")),
        }
    }

    /// Advance to the next tag, or `None` at the end of the document.
    pub fn try_next_tag(&mut self) -> Result<Option<TagKind>> {
        self.advance(false)
    }

    fn advance(&mut self, allow_text: bool) -> Result<Option<TagKind>> {
        if let Position::End { .. } = self.position {
            self.depth = self.depth.saturating_sub(1);
        }
        loop {
            match self.lexer.next_event()? {
                MarkupEvent::Text(text) => {
                    if allow_text || text.trim().is_empty() {
                        continue;
                    }
                    return Err(self.parse_error(format!(
                        "unexpected character data {:?}",
                        truncate(&text, 40)
                    )));
                }
                MarkupEvent::Start { name, attributes } => {
                    self.depth += 1;
                    if self.trace {
                        trace!(depth = self.depth, tag = %name, "enter");
                    }
                    self.position = Position::Start { name, attributes };
                    return Ok(Some(TagKind::Start));
                }
                MarkupEvent::End { name } => {
                    if self.trace {
                        trace!(depth = self.depth, tag = %name, "leave");
                    }
                    self.position = Position::End { name };
                    return Ok(Some(TagKind::End));
                }
                MarkupEvent::Eof => {
                    if self.trace {
                        trace!("end of document");
                    }
                    self.position = Position::Eof;
                    return Ok(None);
                }
            }
        }
    }

    /// Local name of the current tag, or a `#`-prefixed marker outside tags.
    pub fn local_name(&self) -> &str {
        match &self.position {
            Position::Begin => "#document",
            Position::Start { name, .. } | Position::End { name } => name,
            Position::Eof => "#eof",
        }
    }

    /// Whether the cursor is on a start tag.
    pub fn is_start_tag(&self) -> bool {
        matches!(self.position, Position::Start { .. })
    }

    /// Whether the cursor is on an end tag.
    pub fn is_end_tag(&self) -> bool {
        matches!(self.position, Position::End { .. })
    }

    /// Whether the current tag (start or end) is named `name`.
    pub fn at_tag(&self, name: &str) -> bool {
        match &self.position {
            Position::Start { name: current, .. } | Position::End { name: current } => {
                current == name
            }
            _ => false,
        }
    }

    /// Fail unless the current tag is named `name`.
    pub fn expect_tag(&self, name: &str) -> Result<()> {
        if self.at_tag(name) {
            Ok(())
        } else {
            Err(self.parse_error(format!("{name} expected, not: {}", self.local_name())))
        }
    }

    /// Advance to the next start tag named `name`, failing on anything else.
    pub fn enter_tag(&mut self, name: &str) -> Result<()> {
        if self.next_tag()? != TagKind::Start {
            return Err(self.parse_error(format!("start of {name} expected")));
        }
        self.expect_tag(name)
    }

    /// Advance; true when a child start tag follows, false at the parent's end tag.
    pub fn more_tags(&mut self) -> Result<bool> {
        Ok(self.next_tag()? == TagKind::Start)
    }

    /// Advance to the end tag of `name`, skipping whole elements named in
    /// `alternates` along the way.
    pub fn close_tag(&mut self, name: &str, alternates: &[&str]) -> Result<()> {
        loop {
            match self.next_tag()? {
                TagKind::End => return self.expect_tag(name),
                TagKind::Start if alternates.contains(&self.local_name()) => {
                    let skipped = self.local_name().to_string();
                    self.swallow_tag(&skipped)?;
                }
                TagKind::Start => {
                    return Err(self.parse_error(format!(
                        "end of {name} expected, found start of {}",
                        self.local_name()
                    )));
                }
            }
        }
    }

    /// Skip the current element `name` and everything inside it, leaving the
    /// cursor on its end tag.
    pub fn swallow_tag(&mut self, name: &str) -> Result<()> {
        self.expect_tag(name)?;
        if !self.is_start_tag() {
            return Err(self.parse_error(format!("start of {name} expected")));
        }
        let mut nested = 0usize;
        loop {
            match self.advance(true)? {
                Some(TagKind::Start) => nested += 1,
                Some(TagKind::End) if nested == 0 => return self.expect_tag(name),
                Some(TagKind::End) => nested -= 1,
                None => return Err(self.parse_error(format!("end of {name} expected"))),
            }
        }
    }

    /// Read the character data of the current element, leaving the cursor on
    /// its end tag. Child elements are a parse error.
    pub fn element_text(&mut self) -> Result<String> {
        let name = match &self.position {
            Position::Start { name, .. } => name.clone(),
            _ => return Err(self.parse_error("element text requested outside a start tag")),
        };
        let mut text = String::new();
        loop {
            match self.lexer.next_event()? {
                MarkupEvent::Text(chunk) => text.push_str(&chunk),
                MarkupEvent::End { name: end } => {
                    if self.trace {
                        trace!(depth = self.depth, tag = %end, "leave");
                    }
                    self.position = Position::End { name: end };
                    return Ok(text);
                }
                MarkupEvent::Start { name: child, .. } => {
                    return Err(self.parse_error(format!(
                        "unexpected element <{child}> inside text of <{name}>"
                    )));
                }
                MarkupEvent::Eof => {
                    self.position = Position::Eof;
                    return Err(self.parse_error(format!("end of {name} expected")));
                }
            }
        }
    }

    /// Attributes of the current start tag (empty elsewhere).
    pub fn attributes(&self) -> &[Attribute] {
        match &self.position {
            Position::Start { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Number of attributes on the current start tag.
    pub fn attribute_count(&self) -> usize {
        self.attributes().len()
    }

    /// Raw value of attribute `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether attribute `name` is present.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Parse attribute `name`, falling back to `default` when it is absent or
    /// malformed. Malformed values are logged, never fatal.
    pub fn get_parsed<T>(&self, name: &str, default: T) -> T
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.attribute(name) {
            None => default,
            Some(raw) => match raw.parse::<T>() {
                Ok(value) => value,
                Err(err) => {
                    warn!(
                        tag = self.local_name(),
                        attribute = name,
                        value = raw,
                        "malformed attribute ({err}), using default"
                    );
                    default
                }
            },
        }
    }

    /// Boolean attribute (`true`/`false`).
    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        self.get_parsed(name, default)
    }

    /// 32-bit integer attribute.
    pub fn get_int(&self, name: &str, default: i32) -> i32 {
        self.get_parsed(name, default)
    }

    /// 64-bit integer attribute.
    pub fn get_long(&self, name: &str, default: i64) -> i64 {
        self.get_parsed(name, default)
    }

    /// Floating point attribute.
    pub fn get_float(&self, name: &str, default: f64) -> f64 {
        self.get_parsed(name, default)
    }

    /// String attribute.
    pub fn get_string(&self, name: &str, default: &str) -> String {
        self.attribute(name).unwrap_or(default).to_string()
    }

    /// Enumerated attribute; any `FromStr` enum works.
    pub fn get_enum<E>(&self, name: &str, default: E) -> E
    where
        E: FromStr,
        E::Err: Display,
    {
        self.get_parsed(name, default)
    }

    /// Attribute that must be present.
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.attribute(name)
            .ok_or_else(|| self.parse_error(format!("missing required attribute {name}")))
    }

    /// Attribute that must be present and well formed.
    pub fn require<T>(&self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.require_str(name)?;
        raw.parse::<T>()
            .map_err(|err| self.parse_error(format!("malformed attribute {name}={raw:?}: {err}")))
    }

    /// Read the inline list stored as a size attribute plus `item-N`
    /// attributes on the current element. A missing size means an empty list.
    pub fn read_indexed_attributes(&self) -> Result<Vec<String>> {
        if !self.has_attribute(ARRAY_SIZE_ATTRIBUTE) {
            return Ok(Vec::new());
        }
        let size = self.indexed_size()?;
        (0..size)
            .map(|index| self.require_str(&item_key(index)).map(str::to_string))
            .collect()
    }

    /// Typed variant of [`MarkupReader::read_indexed_attributes`]; malformed
    /// items fall back to `default`.
    pub fn read_indexed<T>(&self, default: T) -> Result<Vec<T>>
    where
        T: FromStr + Clone,
        T::Err: Display,
    {
        if !self.has_attribute(ARRAY_SIZE_ATTRIBUTE) {
            return Ok(Vec::new());
        }
        let size = self.indexed_size()?;
        let mut items = Vec::with_capacity(size);
        for index in 0..size {
            let key = item_key(index);
            if !self.has_attribute(&key) {
                return Err(self.parse_error(format!("missing required attribute {key}")));
            }
            items.push(self.get_parsed(&key, default.clone()));
        }
        Ok(items)
    }

    /// Declared inline list size. Each item needs its own attribute, so a size
    /// beyond the attribute count cannot be satisfied.
    fn indexed_size(&self) -> Result<usize> {
        let size: usize = self.require(ARRAY_SIZE_ATTRIBUTE)?;
        if size > self.attribute_count() {
            return Err(self.parse_error(format!(
                "{ARRAY_SIZE_ATTRIBUTE}={size} exceeds the {} attributes present",
                self.attribute_count()
            )));
        }
        Ok(size)
    }

    /// Read an element named `tag` that carries only an inline list, leaving
    /// the cursor on its end tag. The cursor must be on its start tag.
    pub fn read_array_element(&mut self, tag: &str) -> Result<Vec<String>> {
        self.expect_tag(tag)?;
        let items = self.read_indexed_attributes()?;
        self.close_tag(tag, &[])?;
        Ok(items)
    }

    /// Build a parse error that records the current tag and its attributes.
    pub fn parse_error(&self, message: impl Into<String>) -> CodecError {
        match &self.position {
            Position::Start { name, attributes } => {
                ParseError::at(message, name.clone(), attributes.clone()).into()
            }
            Position::End { name } => {
                ParseError::at(message, format!("/{name}"), Vec::new()).into()
            }
            Position::Begin | Position::Eof => ParseError::new(message).into(),
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Stance {
        Peace,
        War,
    }

    impl FromStr for Stance {
        type Err = String;

        fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
            match s {
                "peace" => Ok(Stance::Peace),
                "war" => Ok(Stance::War),
                other => Err(format!("unknown stance {other}")),
            }
        }
    }

    fn reader(input: &str) -> MarkupReader<'_> {
        MarkupReader::new(input.as_bytes())
    }

    #[test]
    fn navigates_nested_tags() {
        let mut xr = reader("<game>\n  <player id=\"player:1\"/>\n  <tile/>\n</game>");
        xr.enter_tag("game").unwrap();
        assert!(xr.more_tags().unwrap());
        assert!(xr.at_tag("player"));
        assert_eq!(xr.attribute("id"), Some("player:1"));
        assert_eq!(xr.depth(), 2);
        xr.close_tag("player", &[]).unwrap();
        assert!(xr.more_tags().unwrap());
        xr.expect_tag("tile").unwrap();
        xr.close_tag("tile", &[]).unwrap();
        assert!(!xr.more_tags().unwrap());
        xr.expect_tag("game").unwrap();
        assert_eq!(xr.try_next_tag().unwrap(), None);
    }

    #[test]
    fn expect_tag_reports_context() {
        let mut xr = reader("<colony id=\"colony:1\"/>");
        xr.next_tag().unwrap();
        let err = xr.expect_tag("unit").unwrap_err();
        match err {
            CodecError::Parse(parse) => {
                assert_eq!(parse.tag.as_deref(), Some("colony"));
                assert_eq!(
                    parse.attributes,
                    vec![("id".to_string(), "colony:1".to_string())]
                );
                assert!(parse.message.contains("unit expected"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn soft_attribute_fallback() {
        let mut xr = reader("<unit moves=\"notanumber\" hidden=\"maybe\" stance=\"war\"/>");
        xr.next_tag().unwrap();
        assert_eq!(xr.get_int("moves", 7), 7);
        assert!(!xr.get_bool("hidden", false));
        assert_eq!(xr.get_enum("stance", Stance::Peace), Stance::War);
        assert_eq!(xr.get_enum("missing", Stance::Peace), Stance::Peace);
        assert_eq!(xr.get_long("missing", -1), -1);
        assert_eq!(xr.get_string("name", "anon"), "anon");
    }

    #[test]
    fn required_attributes_are_hard_errors() {
        let mut xr = reader("<unit moves=\"x\"/>");
        xr.next_tag().unwrap();
        assert!(xr.require::<i32>("moves").is_err());
        assert!(xr.require_str("id").is_err());
    }

    #[test]
    fn close_tag_skips_alternates() {
        let mut xr = reader("<unit><legacy><deep/></legacy><note/></unit>");
        xr.enter_tag("unit").unwrap();
        xr.close_tag("unit", &["legacy", "note"]).unwrap();
        assert!(xr.is_end_tag());
        assert!(xr.close_tag("unit", &[]).is_err());
    }

    #[test]
    fn close_tag_rejects_unexpected_child() {
        let mut xr = reader("<unit><cargo/></unit>");
        xr.enter_tag("unit").unwrap();
        assert!(xr.close_tag("unit", &["legacy"]).is_err());
    }

    #[test]
    fn swallow_tag_skips_subtree_with_text() {
        let mut xr = reader("<a><b>text<c>more</c></b><d/></a>");
        xr.enter_tag("a").unwrap();
        assert!(xr.more_tags().unwrap());
        xr.swallow_tag("b").unwrap();
        assert!(xr.is_end_tag());
        assert!(xr.more_tags().unwrap());
        assert!(xr.at_tag("d"));
    }

    #[test]
    fn element_text_reads_character_data() {
        let mut xr = reader("<message>hello &amp; welcome</message>");
        xr.enter_tag("message").unwrap();
        assert_eq!(xr.element_text().unwrap(), "hello & welcome");
        xr.expect_tag("message").unwrap();
        assert!(xr.is_end_tag());
    }

    #[test]
    fn stray_text_between_tags_is_rejected() {
        let mut xr = reader("<a>junk<b/></a>");
        xr.enter_tag("a").unwrap();
        assert!(xr.next_tag().is_err());
    }

    #[test]
    fn reads_indexed_attributes() {
        let mut xr =
            reader("<tension childCount=\"3\" item-0=\"5\" item-1=\"oops\" item-2=\"-2\"/>");
        xr.next_tag().unwrap();
        assert_eq!(xr.read_indexed(0i32).unwrap(), vec![5, 0, -2]);
        assert_eq!(xr.read_array_element("tension").unwrap(), vec!["5", "oops", "-2"]);
        assert!(xr.is_end_tag());
    }

    #[test]
    fn missing_indexed_item_is_fatal() {
        let mut xr = reader("<list childCount=\"2\" item-0=\"a\"/>");
        xr.next_tag().unwrap();
        assert!(xr.read_indexed_attributes().is_err());
    }

    #[test]
    fn oversized_count_is_rejected_before_reading_items() {
        let mut xr = reader("<list childCount=\"18446744073709551615\"/>");
        xr.next_tag().unwrap();
        assert!(xr.read_indexed(0i32).is_err());
        assert!(xr.read_indexed_attributes().is_err());

        let mut xr = reader("<list childCount=\"3\" item-0=\"1\" item-1=\"2\"/>");
        xr.next_tag().unwrap();
        let err = xr.read_indexed(0i32).unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{err}");
    }

    #[test]
    fn absent_size_means_empty_list() {
        let mut xr = reader("<list/>");
        xr.next_tag().unwrap();
        assert!(xr.read_indexed_attributes().unwrap().is_empty());
    }

    #[test]
    fn end_of_document_inside_next_tag_is_error() {
        let mut xr = reader("<a/>");
        xr.next_tag().unwrap();
        xr.next_tag().unwrap();
        assert!(xr.next_tag().is_err());
    }
}
