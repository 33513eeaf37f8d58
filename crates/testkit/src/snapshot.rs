//! Structural snapshots of markup documents.
//!
//! A snapshot flattens a document into element paths and attribute paths so
//! that documents can be compared as sets (for redaction checks) or pinned as
//! canonical JSON golden files.
//!
//! By default, golden comparisons read the file on disk. To update goldens,
//! rerun with `COLONIA_UPDATE_SNAPSHOTS=1`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colonia_codec::markup::{Lexer, MarkupEvent};
use colonia_codec::{to_markup, Entity, ID_ATTRIBUTE};
use colonia_core::WriteScope;
use serde::Serialize;
use serde_json::Value;

/// Environment variable that enables snapshot updates.
pub const UPDATE_SNAPSHOTS_ENV: &str = "COLONIA_UPDATE_SNAPSHOTS";

/// One element of a flattened document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementSnapshot {
    /// Slash-separated path of `tag[id]` segments from the document element.
    pub path: String,
    /// Attributes other than the identifier.
    pub attributes: BTreeMap<String, String>,
    /// Character data, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Flatten `markup` into its elements, in document order.
pub fn flatten(markup: &str) -> Result<Vec<ElementSnapshot>> {
    let mut lexer = Lexer::new(markup.as_bytes());
    let mut path: Vec<String> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut elements: Vec<ElementSnapshot> = Vec::new();
    loop {
        match lexer.next_event().context("markup does not parse")? {
            MarkupEvent::Start { name, attributes } => {
                let segment = match attributes.iter().find(|(key, _)| key == ID_ATTRIBUTE) {
                    Some((_, id)) => format!("{name}[{id}]"),
                    None => name,
                };
                path.push(segment);
                open.push(elements.len());
                elements.push(ElementSnapshot {
                    path: path.join("/"),
                    attributes: attributes
                        .into_iter()
                        .filter(|(key, _)| key != ID_ATTRIBUTE)
                        .collect(),
                    text: None,
                });
            }
            MarkupEvent::End { .. } => {
                path.pop();
                open.pop();
            }
            MarkupEvent::Text(text) => {
                if let Some(&index) = open.last() {
                    if !text.trim().is_empty() {
                        elements[index]
                            .text
                            .get_or_insert_with(String::new)
                            .push_str(&text);
                    }
                }
            }
            MarkupEvent::Eof => return Ok(elements),
        }
    }
}

/// Every element path and every `path@attribute` in `markup`.
pub fn attribute_paths(markup: &str) -> Result<BTreeSet<String>> {
    let mut paths = BTreeSet::new();
    for element in flatten(markup)? {
        for key in element.attributes.keys() {
            paths.insert(format!("{}@{key}", element.path));
        }
        if element.text.is_some() {
            paths.insert(format!("{}#text", element.path));
        }
        paths.insert(element.path);
    }
    Ok(paths)
}

/// `entity` serialized under `scope`, flattened to attribute paths.
pub fn scoped_paths(entity: &dyn Entity, scope: WriteScope) -> Result<BTreeSet<String>> {
    let markup = to_markup(entity, scope).context("entity does not serialize")?;
    attribute_paths(&markup)
}

/// Assert that the flattened `markup` matches the JSON snapshot at `path`.
///
/// If `COLONIA_UPDATE_SNAPSHOTS=1` is set, the snapshot file is
/// written/overwritten with the current value instead.
pub fn assert_markup_snapshot<P: AsRef<Path>>(path: P, markup: &str) -> Result<()> {
    let path = path.as_ref();
    let actual = canonical_json(&flatten(markup)?)?;

    if should_update_snapshots() {
        write_snapshot(path, &actual)?;
        return Ok(());
    }

    let expected = fs::read_to_string(path).with_context(|| {
        format!(
            "Snapshot missing at {} (run with {}=1 to create/update)",
            path.display(),
            UPDATE_SNAPSHOTS_ENV
        )
    })?;

    if expected != actual {
        anyhow::bail!(
            "Snapshot mismatch at {} (run with {}=1 to update)",
            path.display(),
            UPDATE_SNAPSHOTS_ENV
        );
    }

    Ok(())
}

fn should_update_snapshots() -> bool {
    matches!(
        std::env::var(UPDATE_SNAPSHOTS_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

/// Write `markup`'s snapshot to `path`, creating parent directories.
pub fn write_markup_snapshot<P: AsRef<Path>>(path: P, markup: &str) -> Result<()> {
    write_snapshot(path.as_ref(), &canonical_json(&flatten(markup)?)?)
}

fn write_snapshot(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create snapshot directory {}", parent.display()))?;
    }
    fs::write(path, contents)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))
}

fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).context("Failed to serialize snapshot value")?;
    let mut s = serde_json::to_string_pretty(&sort_keys(value))
        .context("Failed to format snapshot JSON")?;
    s.push('\n');
    Ok(s)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(values) => Value::Array(values.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_paths_by_id() {
        let elements = flatten(
            concat!(
                "<game id=\"game:1\" turn=\"3\">",
                "<player id=\"player:1\"><motto>hi</motto></player></game>"
            ),
        )
        .unwrap();
        let paths: Vec<&str> = elements.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "game[game:1]",
                "game[game:1]/player[player:1]",
                "game[game:1]/player[player:1]/motto"
            ]
        );
        assert_eq!(elements[0].attributes.get("turn").map(String::as_str), Some("3"));
        assert_eq!(elements[2].text.as_deref(), Some("hi"));
    }

    #[test]
    fn attribute_paths_include_elements_and_attributes() {
        let paths = attribute_paths("<unit id=\"unit:1\" moves=\"2\"/>").unwrap();
        assert!(paths.contains("unit[unit:1]"));
        assert!(paths.contains("unit[unit:1]@moves"));
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn golden_roundtrip_and_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let golden = dir.path().join("nested/unit.json");
        write_markup_snapshot(&golden, "<unit id=\"unit:1\" moves=\"2\"/>").unwrap();
        if !should_update_snapshots() {
            assert_markup_snapshot(&golden, "<unit id=\"unit:1\" moves=\"2\"/>").unwrap();
            assert!(assert_markup_snapshot(&golden, "<unit id=\"unit:1\" moves=\"3\"/>").is_err());
        }
    }
}
