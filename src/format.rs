//! Re-layout of markup documents.

use anyhow::{Context, Result};
use colonia_codec::markup::{Lexer, MarkupEvent, MarkupWriter};

/// Strip inter-tag whitespace so the document fits on one line and can be
/// sent as a single framed message. Blank text that is an element's only
/// content is kept.
pub fn compact(markup: &str) -> Result<String> {
    let mut lexer = Lexer::new(markup.as_bytes());
    let mut out = MarkupWriter::new();
    // Blank text right after a start tag, written only if the element ends next.
    let mut held: Option<String> = None;
    let mut after_start = false;
    loop {
        match lexer.next_event().context("document does not parse")? {
            MarkupEvent::Start { name, attributes } => {
                held = None;
                after_start = true;
                out.write_start(&name)?;
                for (key, value) in &attributes {
                    out.write_attribute(key, value)?;
                }
            }
            MarkupEvent::End { .. } => {
                if let Some(text) = held.take() {
                    out.write_text(&text)?;
                }
                after_start = false;
                out.write_end()?;
            }
            MarkupEvent::Text(text) if text.trim().is_empty() => {
                if after_start {
                    held.get_or_insert_with(String::new).push_str(&text);
                }
            }
            MarkupEvent::Text(text) => {
                if let Some(blank) = held.take() {
                    out.write_text(&blank)?;
                }
                after_start = false;
                out.write_text(&text)?;
            }
            MarkupEvent::Eof => break,
        }
    }
    Ok(out.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colonia_codec::markup::pretty_print;

    #[test]
    fn pretty_then_compact_restores_single_line() {
        let original = concat!(
            "<game id=\"game:1\"><player id=\"player:1\"><motto>a&#10;b</motto></player>",
            "<tile id=\"tile:1\"/></game>"
        );
        let pretty = pretty_print(original).unwrap();
        assert!(pretty.contains('\n'));
        let compacted = compact(&pretty).unwrap();
        assert!(!compacted.contains('\n'));
        assert_eq!(compact(&compacted).unwrap(), compacted);
        assert!(compacted.contains("<motto>a&#10;b</motto>"));
    }

    #[test]
    fn blank_sole_content_is_kept() {
        let pretty = "<player id=\"player:1\">\n  <motto>   </motto>\n  <unit/>\n</player>\n";
        assert_eq!(
            compact(pretty).unwrap(),
            "<player id=\"player:1\"><motto>   </motto><unit/></player>"
        );
    }

    #[test]
    fn rejects_unbalanced_input() {
        assert!(compact("<game><player>").is_err());
    }
}
