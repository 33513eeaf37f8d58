//! Tag-structured markup: tokenizer, forward-only cursor, buffered writer and
//! pretty printer.
//!
//! The cursor and writer know nothing about object graphs; they are the layer
//! the graph reader and writer drive tag by tag.

mod cursor;
mod lexer;
mod pretty;
mod writer;

pub use cursor::{CursorOptions, MarkupReader, TagKind};
pub use lexer::{unescape, Attribute, Lexer, MarkupEvent};
pub use pretty::pretty_print;
pub use writer::{escape_attribute, escape_text, MarkupWriter};

/// Reserved attribute holding the length of an inline list.
pub const ARRAY_SIZE_ATTRIBUTE: &str = "childCount";

/// Prefix of the positional keys of an inline list (`item-0`, `item-1`, ...).
pub const ARRAY_ITEM_PREFIX: &str = "item-";

/// Key of the `index`th entry of an inline list.
pub fn item_key(index: usize) -> String {
    format!("{ARRAY_ITEM_PREFIX}{index}")
}
