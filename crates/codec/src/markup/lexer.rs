//! Pull tokenizer for the tag-structured markup format.
//!
//! Supports the subset the codec produces plus what older save files contain:
//! elements, attributes in either quote style, character data, the five named
//! entities and numeric character references, CDATA sections, comments,
//! processing instructions and a doctype line (the last three are skipped).

use std::io::{self, BufRead, BufReader, Read};

use crate::error::{CodecError, ParseError, Result};

/// Name/value pair on a start tag, in document order.
pub type Attribute = (String, String);

/// One token of markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkupEvent {
    /// Start tag. Self-closing tags are reported as a start followed by an end.
    Start {
        /// Element name.
        name: String,
        /// Attributes in document order.
        attributes: Vec<Attribute>,
    },
    /// End tag.
    End {
        /// Element name.
        name: String,
    },
    /// Character data (entities already decoded).
    Text(String),
    /// The source is exhausted and every element was closed.
    Eof,
}

/// Tokenizer over any byte source.
pub struct Lexer<'a> {
    input: BufReader<Box<dyn Read + 'a>>,
    open: Vec<String>,
    pending_end: Option<String>,
    offset: u64,
}

impl<'a> Lexer<'a> {
    /// Tokenize `source`.
    pub fn new<R: Read + 'a>(source: R) -> Self {
        Self {
            input: BufReader::new(Box::new(source)),
            open: Vec::new(),
            pending_end: None,
            offset: 0,
        }
    }

    /// Number of bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Names of the currently open elements, outermost first.
    pub fn open_elements(&self) -> &[String] {
        &self.open
    }

    /// Produce the next event.
    pub fn next_event(&mut self) -> Result<MarkupEvent> {
        if let Some(name) = self.pending_end.take() {
            return Ok(MarkupEvent::End { name });
        }
        loop {
            match self.peek()? {
                None => {
                    if let Some(open) = self.open.last() {
                        return Err(self.syntax(format!("input ended inside <{open}>")));
                    }
                    return Ok(MarkupEvent::Eof);
                }
                Some(b'<') => {
                    self.bump()?;
                    match self.peek()? {
                        Some(b'?') => {
                            self.read_until(b"?>", "processing instruction")?;
                        }
                        Some(b'!') => {
                            self.bump()?;
                            if let Some(text) = self.read_declaration()? {
                                return Ok(MarkupEvent::Text(text));
                            }
                        }
                        Some(b'/') => {
                            self.bump()?;
                            return self.read_end_tag();
                        }
                        _ => return self.read_start_tag(),
                    }
                }
                Some(_) => return self.read_text(),
            }
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        loop {
            match self.input.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(CodecError::Io(err)),
            }
        }
    }

    fn bump(&mut self) -> Result<Option<u8>> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.input.consume(1);
            self.offset += 1;
        }
        Ok(byte)
    }

    fn syntax(&self, message: impl AsRef<str>) -> CodecError {
        ParseError::new(format!("{} (byte {})", message.as_ref(), self.offset)).into()
    }

    fn expect_byte(&mut self, want: u8) -> Result<()> {
        match self.bump()? {
            Some(got) if got == want => Ok(()),
            Some(got) => Err(self.syntax(format!(
                "expected {:?}, found {:?}",
                want as char, got as char
            ))),
            None => Err(self.syntax(format!("expected {:?}, found end of input", want as char))),
        }
    }

    fn expect_literal(&mut self, literal: &[u8]) -> Result<()> {
        for &byte in literal {
            self.expect_byte(byte)?;
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(byte) = self.peek()? {
            if !byte.is_ascii_whitespace() {
                break;
            }
            self.bump()?;
        }
        Ok(())
    }

    fn read_name(&mut self) -> Result<String> {
        let mut name = Vec::new();
        while let Some(byte) = self.peek()? {
            if !is_name_byte(byte) {
                break;
            }
            name.push(byte);
            self.bump()?;
        }
        if name.is_empty() {
            return Err(self.syntax("expected a name"));
        }
        String::from_utf8(name).map_err(|_| self.syntax("name is not valid UTF-8"))
    }

    /// Consume through `terminator`, returning what preceded it.
    fn read_until(&mut self, terminator: &[u8], what: &str) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        loop {
            match self.bump()? {
                Some(byte) => {
                    bytes.push(byte);
                    if bytes.ends_with(terminator) {
                        bytes.truncate(bytes.len() - terminator.len());
                        return Ok(bytes);
                    }
                }
                None => return Err(self.syntax(format!("unterminated {what}"))),
            }
        }
    }

    /// After `<!`: comment, CDATA or doctype. Only CDATA yields text.
    fn read_declaration(&mut self) -> Result<Option<String>> {
        match self.peek()? {
            Some(b'-') => {
                self.expect_literal(b"--")?;
                self.read_until(b"-->", "comment")?;
                Ok(None)
            }
            Some(b'[') => {
                self.expect_literal(b"[CDATA[")?;
                let raw = self.read_until(b"]]>", "CDATA section")?;
                let text =
                    String::from_utf8(raw).map_err(|_| self.syntax("CDATA is not valid UTF-8"))?;
                Ok(Some(text))
            }
            _ => {
                self.read_until(b">", "declaration")?;
                Ok(None)
            }
        }
    }

    fn read_start_tag(&mut self) -> Result<MarkupEvent> {
        let name = self.read_name()?;
        let mut attributes: Vec<Attribute> = Vec::new();
        loop {
            self.skip_whitespace()?;
            match self.peek()? {
                Some(b'/') => {
                    self.bump()?;
                    self.expect_byte(b'>')?;
                    self.pending_end = Some(name.clone());
                    return Ok(MarkupEvent::Start { name, attributes });
                }
                Some(b'>') => {
                    self.bump()?;
                    self.open.push(name.clone());
                    return Ok(MarkupEvent::Start { name, attributes });
                }
                Some(_) => {
                    let key = self.read_name()?;
                    self.skip_whitespace()?;
                    self.expect_byte(b'=')?;
                    self.skip_whitespace()?;
                    let quote = match self.bump()? {
                        Some(q @ (b'"' | b'\'')) => q,
                        _ => return Err(self.syntax(format!("attribute {key} is not quoted"))),
                    };
                    let raw = self.read_until(&[quote], "attribute value")?;
                    let value = self.decode(raw)?;
                    if attributes.iter().any(|(existing, _)| *existing == key) {
                        return Err(self.syntax(format!("duplicate attribute {key} on <{name}>")));
                    }
                    attributes.push((key, value));
                }
                None => return Err(self.syntax(format!("input ended inside <{name}"))),
            }
        }
    }

    fn read_end_tag(&mut self) -> Result<MarkupEvent> {
        let name = self.read_name()?;
        self.skip_whitespace()?;
        self.expect_byte(b'>')?;
        match self.open.pop() {
            Some(open) if open == name => Ok(MarkupEvent::End { name }),
            Some(open) => Err(self.syntax(format!("</{name}> does not close <{open}>"))),
            None => Err(self.syntax(format!("</{name}> has no matching start tag"))),
        }
    }

    fn read_text(&mut self) -> Result<MarkupEvent> {
        let mut raw = Vec::new();
        while let Some(byte) = self.peek()? {
            if byte == b'<' {
                break;
            }
            raw.push(byte);
            self.bump()?;
        }
        Ok(MarkupEvent::Text(self.decode(raw)?))
    }

    fn decode(&self, raw: Vec<u8>) -> Result<String> {
        let text = String::from_utf8(raw).map_err(|_| self.syntax("text is not valid UTF-8"))?;
        unescape(&text).map_err(|message| self.syntax(message))
    }
}

fn is_name_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.' | b':') || byte >= 0x80
}

/// Decode entity and character references.
pub fn unescape(text: &str) -> std::result::Result<String, String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| format!("unterminated entity in {text:?}"))?;
        let entity = &after[..semi];
        let decoded = match entity {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "quot" => '"',
            "apos" => '\'',
            _ => {
                let code = if let Some(hex) = entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(dec) = entity.strip_prefix('#') {
                    dec.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32)
                    .ok_or_else(|| format!("unknown entity &{entity};"))?
            }
        };
        out.push(decoded);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
