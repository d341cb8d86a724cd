//! Document adapter, save direction.
//!
//! Walks the node tree and renders block-style YAML. Sequences whose
//! elements are all scalars render in compact flow style (`[1, 2, 3]`),
//! which is how fixed-size numeric vectors come out. The annotated variant
//! appends an `# unread` comment to every scalar entry whose node was never
//! read by a typed get; flow style is skipped for a sequence containing
//! unread elements so the comments have a place to go.
//!
//! Emission is hand-written rather than delegated to the external emitter
//! because comments are not expressible through it. Scalars are quoted
//! whenever their unquoted form would re-parse to different canonical text,
//! so a saved tree loads back equivalently.

use std::fmt::Write;

use crate::node::{Children, NodeId, PropertyNode};
use crate::tree::PropertyTree;

const UNREAD_MARKER: &str = "  # unread";

pub(crate) fn emit(tree: &PropertyTree, root: NodeId, annotate: bool) -> String {
    let mut out = String::new();
    let node = tree.node(root);
    match &node.children {
        Children::None => {
            out.push_str(&format_scalar(&node.raw, false));
            if annotate && !node.has_been_read {
                out.push_str(UNREAD_MARKER);
            }
            out.push('\n');
        }
        Children::Map(map) if map.is_empty() => out.push_str("{}\n"),
        Children::Array(items) if items.is_empty() => out.push_str("[]\n"),
        _ => emit_block(tree, root, 0, annotate, &mut out),
    }
    out
}

/// Emit a composite node's children as block-style lines at `depth`.
fn emit_block(tree: &PropertyTree, id: NodeId, depth: usize, annotate: bool, out: &mut String) {
    let pad = "  ".repeat(depth);
    match &tree.node(id).children {
        Children::None => unreachable!("scalars are emitted by the parent"),
        Children::Map(map) => {
            for (key, child) in map {
                let child_node = tree.node(*child);
                let _ = write!(out, "{pad}{}:", format_scalar(key, false));
                emit_entry_value(tree, *child, child_node, depth, annotate, out);
            }
        }
        Children::Array(items) => {
            for child in items {
                let child_node = tree.node(*child);
                let _ = write!(out, "{pad}-");
                emit_entry_value(tree, *child, child_node, depth, annotate, out);
            }
        }
    }
}

/// Finish the line started with `key:` or `-`, then recurse if needed.
fn emit_entry_value(
    tree: &PropertyTree,
    id: NodeId,
    node: &PropertyNode,
    depth: usize,
    annotate: bool,
    out: &mut String,
) {
    match &node.children {
        Children::None => {
            let _ = write!(out, " {}", format_scalar(&node.raw, false));
            if annotate && !node.has_been_read {
                out.push_str(UNREAD_MARKER);
            }
            out.push('\n');
        }
        Children::Map(map) if map.is_empty() => {
            out.push_str(" {}\n");
        }
        Children::Array(items) if items.is_empty() => {
            out.push_str(" []\n");
        }
        Children::Array(items) if flow_eligible(tree, items, annotate) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|item| format_scalar(&tree.node(*item).raw, true))
                .collect();
            let _ = writeln!(out, " [{}]", rendered.join(", "));
        }
        _ => {
            out.push('\n');
            emit_block(tree, id, depth + 1, annotate, out);
        }
    }
}

/// Flow style applies when every element is scalar, and (in annotate mode)
/// every element has been read.
fn flow_eligible(tree: &PropertyTree, items: &[NodeId], annotate: bool) -> bool {
    items.iter().all(|item| {
        let node = tree.node(*item);
        matches!(node.children, Children::None) && (!annotate || node.has_been_read)
    })
}

fn format_scalar(raw: &str, flow: bool) -> String {
    if needs_quoting(raw, flow) {
        quote(raw)
    } else {
        raw.to_string()
    }
}

/// Whether the unquoted plain form would collide with document syntax or
/// re-parse to different canonical text.
fn needs_quoting(raw: &str, flow: bool) -> bool {
    if raw.is_empty() || raw != raw.trim() {
        return true;
    }
    if raw.chars().any(|c| {
        matches!(
            c,
            ':' | ',' | '#' | '{' | '}' | '[' | ']' | '&' | '*' | '!' | '|' | '>' | '%' | '@'
                | '`' | '"' | '\'' | '\\' | '\n' | '\t'
        )
    }) {
        return true;
    }
    if matches!(raw.chars().next(), Some('-' | '?')) && !parses_numeric(raw) {
        return true;
    }
    if flow && raw.contains(' ') {
        return true;
    }
    !round_trips_plain(raw)
}

fn parses_numeric(raw: &str) -> bool {
    raw.parse::<i64>().is_ok() || raw.parse::<f64>().is_ok()
}

/// Whether the load adapter would store exactly this text for the plain
/// (unquoted) scalar, mirroring the external parser's scalar typing.
fn round_trips_plain(raw: &str) -> bool {
    match raw {
        // Null-likes load as null and leave the node unset.
        "~" | "null" | "Null" | "NULL" => return false,
        "true" | "false" => return true,
        _ => {}
    }
    // Radix-prefixed integers load in decimal canonical form.
    if raw.starts_with("0x") || raw.starts_with("0o") {
        return false;
    }
    if let Ok(i) = raw.parse::<i64>() {
        return i.to_string() == raw;
    }
    // Float-shaped scalars keep their original text when loaded.
    true
}

fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
