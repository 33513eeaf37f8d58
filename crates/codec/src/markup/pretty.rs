//! Indenting transform for finished documents.

use super::lexer::{Attribute, Lexer, MarkupEvent};
use super::writer::{escape_attribute, escape_text};
use crate::error::{ParseError, Result};

const INDENT: &str = "  ";

enum Node {
    Element {
        name: String,
        attributes: Vec<Attribute>,
        children: Vec<Node>,
    },
    Text(String),
}

/// Re-indent a document, one element per line.
///
/// Whitespace-only text next to child elements is layout and is dropped.
/// Other character data is kept, on the same line when it is an element's only
/// content, so an element holding nothing but blanks keeps them.
pub fn pretty_print(markup: &str) -> Result<String> {
    let mut lexer = Lexer::new(markup.as_bytes());
    let mut stack: Vec<Node> = Vec::new();
    let mut roots: Vec<Node> = Vec::new();
    loop {
        match lexer.next_event()? {
            MarkupEvent::Start { name, attributes } => stack.push(Node::Element {
                name,
                attributes,
                children: Vec::new(),
            }),
            MarkupEvent::End { .. } => {
                let mut node = stack
                    .pop()
                    .ok_or_else(|| ParseError::new("unbalanced end tag"))?;
                if let Node::Element { children, .. } = &mut node {
                    drop_layout_text(children);
                }
                push_node(&mut stack, &mut roots, node);
            }
            MarkupEvent::Text(text) => {
                if !stack.is_empty() || !is_blank(&text) {
                    push_node(&mut stack, &mut roots, Node::Text(text));
                }
            }
            MarkupEvent::Eof => break,
        }
    }
    let mut out = String::with_capacity(markup.len() * 2);
    for root in &roots {
        render(root, 0, &mut out);
    }
    Ok(out)
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

fn drop_layout_text(children: &mut Vec<Node>) {
    if let [Node::Text(_)] = children.as_slice() {
        return;
    }
    children.retain(|child| !matches!(child, Node::Text(text) if is_blank(text)));
}

fn push_node(stack: &mut [Node], roots: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(Node::Element { children, .. }) => children.push(node),
        _ => roots.push(node),
    }
}

fn render(node: &Node, level: usize, out: &mut String) {
    let indent = INDENT.repeat(level);
    match node {
        Node::Text(text) => {
            out.push_str(&indent);
            out.push_str(&escape_text(text));
            out.push('\n');
        }
        Node::Element {
            name,
            attributes,
            children,
        } => {
            out.push_str(&indent);
            out.push('<');
            out.push_str(name);
            for (key, value) in attributes {
                out.push(' ');
                out.push_str(key);
                out.push_str("=\"");
                out.push_str(&escape_attribute(value));
                out.push('"');
            }
            match children.as_slice() {
                [] => out.push_str("/>\n"),
                [Node::Text(text)] => {
                    out.push('>');
                    out.push_str(&escape_text(text));
                    out.push_str("</");
                    out.push_str(name);
                    out.push_str(">\n");
                }
                _ => {
                    out.push_str(">\n");
                    for child in children {
                        render(child, level + 1, out);
                    }
                    out.push_str(&indent);
                    out.push_str("</");
                    out.push_str(name);
                    out.push_str(">\n");
                }
            }
        }
    }
}
