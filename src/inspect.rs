//! Structural summary of a markup document, without an entity model.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;

use anyhow::{Context, Result};
use colonia_codec::compat::upgrade_id;
use colonia_codec::markup::{Lexer, MarkupEvent};
use colonia_codec::{ID_ATTRIBUTE, LEGACY_ID_ATTRIBUTE};
use colonia_core::ObjectId;
use tracing::trace;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DocumentSummary {
    pub elements: usize,
    pub max_depth: usize,
    pub tags: BTreeMap<String, usize>,
    /// Ids whose content the document carries, after legacy upgrades.
    pub objects: BTreeSet<ObjectId>,
    /// Ids whose content appears more than once.
    pub duplicates: BTreeSet<ObjectId>,
    /// Identifiers written with a legacy prefix or attribute name.
    pub legacy_ids: usize,
    /// Reference-shaped attribute values naming no object in the document.
    pub unresolved: BTreeSet<String>,
}

pub fn summarize<R: Read>(source: R, trace_markup: bool) -> Result<DocumentSummary> {
    let mut lexer = Lexer::new(source);
    let mut summary = DocumentSummary::default();
    let mut depth = 0usize;
    let mut candidates: Vec<String> = Vec::new();
    loop {
        match lexer.next_event().context("document does not parse")? {
            MarkupEvent::Start { name, attributes } => {
                depth += 1;
                if trace_markup {
                    trace!(depth, tag = %name, "enter");
                }
                summary.elements += 1;
                summary.max_depth = summary.max_depth.max(depth);
                *summary.tags.entry(name).or_default() += 1;
                let mut seen_id = false;
                for (key, value) in attributes {
                    if key == ID_ATTRIBUTE || (key == LEGACY_ID_ATTRIBUTE && !seen_id) {
                        seen_id = true;
                        let upgraded = upgrade_id(&value);
                        if key == LEGACY_ID_ATTRIBUTE || upgraded != value.as_str() {
                            summary.legacy_ids += 1;
                        }
                        let id = ObjectId::parse(&upgraded)
                            .with_context(|| format!("bad identifier {value:?}"))?;
                        if !summary.objects.insert(id.clone()) {
                            summary.duplicates.insert(id);
                        }
                    } else if value.contains(colonia_core::object_id::ID_SEPARATOR) {
                        candidates.push(value);
                    }
                }
            }
            MarkupEvent::End { name } => {
                if trace_markup {
                    trace!(depth, tag = %name, "leave");
                }
                depth = depth.saturating_sub(1);
            }
            MarkupEvent::Text(_) => {}
            MarkupEvent::Eof => break,
        }
    }

    let prefixes: BTreeSet<&str> = summary.objects.iter().filter_map(ObjectId::prefix).collect();
    summary.unresolved = candidates
        .into_iter()
        .filter(|value| {
            let Ok(id) = ObjectId::parse(value) else {
                return false;
            };
            id.prefix().is_some_and(|prefix| prefixes.contains(prefix))
                && !summary.objects.contains(&id)
        })
        .collect();
    Ok(summary)
}

impl fmt::Display for DocumentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} elements, depth {}, {} objects",
            self.elements,
            self.max_depth,
            self.objects.len()
        )?;
        for (tag, count) in &self.tags {
            writeln!(f, "  {tag:<24} {count}")?;
        }
        if self.legacy_ids > 0 {
            writeln!(f, "legacy identifiers: {}", self.legacy_ids)?;
        }
        if !self.duplicates.is_empty() {
            let ids: Vec<&str> = self.duplicates.iter().map(ObjectId::as_str).collect();
            writeln!(f, "written more than once: {}", ids.join(", "))?;
        }
        if !self.unresolved.is_empty() {
            let ids: Vec<&str> = self.unresolved.iter().map(String::as_str).collect();
            writeln!(f, "unresolved references: {}", ids.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<savedGame version="2">
  <game id="game:1" turn="3">
    <player id="player:1" name="A"><motto>hi</motto></player>
    <tile ID="tile:1" x="0" y="0" owner="player:1">
      <tileItemContainer id="tileitemcontainer:1" tile="tile:1"/>
      <unit id="unit:1" owner="player:1" escort="unit:9" location="tile:1"/>
    </tile>
  </game>
</savedGame>"#;

    #[test]
    fn counts_tags_objects_and_depth() {
        let summary = summarize(DOC.as_bytes(), false).unwrap();
        assert_eq!(summary.elements, 7);
        assert_eq!(summary.max_depth, 4);
        assert_eq!(summary.tags.get("tile"), Some(&1));
        assert_eq!(summary.objects.len(), 5);
        assert!(summary
            .objects
            .contains(&ObjectId::parse("tileItemContainer:1").unwrap()));
    }

    #[test]
    fn reports_legacy_ids_and_unresolved_references() {
        let summary = summarize(DOC.as_bytes(), true).unwrap();
        assert_eq!(summary.legacy_ids, 2);
        assert_eq!(
            summary.unresolved.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["unit:9"]
        );
        assert!(summary.duplicates.is_empty());
        let text = summary.to_string();
        assert!(text.contains("unresolved references: unit:9"));
    }

    #[test]
    fn duplicate_content_is_reported() {
        let summary =
            summarize(&b"<update><unit id=\"unit:1\"/><unit id=\"unit:1\"/></update>"[..], false)
                .unwrap();
        assert_eq!(summary.objects.len(), 1);
        assert_eq!(summary.duplicates.len(), 1);
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(summarize(&b"<game><unit></game>"[..], false).is_err());
    }
}
