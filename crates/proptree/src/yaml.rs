//! Document adapter, load direction.
//!
//! Maps the generic tri-kind document representation (`yaml_rust2::Yaml`:
//! scalar, ordered sequence, keyed mapping) onto the node tree. The parser
//! itself is the external collaborator; its output is assumed correct.
//!
//! Application is overwrite-in-place: the document is walked over the
//! *existing* nodes, so children present in the old tree but absent from
//! the new document survive with their last state. That stickiness is
//! inherited behavior, kept deliberately (see DESIGN.md).

use yaml_rust2::{Yaml, YamlLoader};

use crate::error::{Error, Result};
use crate::node::NodeId;
use crate::tree::PropertyTree;

/// Parse one document from text. Multi-document input keeps the first
/// document, matching single-document configuration files.
pub(crate) fn parse_document(text: &str) -> Result<Yaml> {
    let mut docs = YamlLoader::load_from_str(text)?;
    if docs.is_empty() {
        return Err(Error::EmptyDocument);
    }
    Ok(docs.swap_remove(0))
}

/// Apply a parsed document onto the subtree rooted at `id`.
///
/// Mappings commit the node to `Map` kind, sequences to `Array`; scalars
/// overwrite the node's canonical text (marking `VALUE` when it changed).
/// `Null` values create the node but leave it unset, so a later typed read
/// still materializes the caller's default.
pub(crate) fn apply_document(tree: &mut PropertyTree, id: NodeId, doc: &Yaml) {
    match doc {
        Yaml::Hash(entries) => {
            tree.force_map(id);
            for (key, value) in entries.iter() {
                let Some(key) = scalar_text(key) else {
                    continue; // non-scalar keys have no path representation
                };
                let child = tree
                    .child_by_key(id, &key)
                    .expect("node was committed to map kind");
                apply_document(tree, child, value);
            }
        }
        Yaml::Array(items) => {
            tree.force_array(id);
            for (index, item) in items.iter().enumerate() {
                let child = tree
                    .child_by_index(id, index)
                    .expect("node was committed to array kind");
                apply_document(tree, child, item);
            }
        }
        Yaml::Null | Yaml::BadValue => {}
        scalar => {
            if let Some(text) = scalar_text(scalar) {
                tree.set_raw(id, text);
            }
        }
    }
}

/// Canonical text of a scalar document node.
pub(crate) fn scalar_text(yaml: &Yaml) -> Option<String> {
    match yaml {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Integer(i) => Some(i.to_string()),
        Yaml::Real(s) => Some(s.clone()),
        Yaml::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn apply_builds_kinds_and_raw_text() {
        let mut tree = PropertyTree::new();
        tree.load_str("a: 1\nb:\n  - x\n  - 2.5\n").unwrap();

        let root = tree.root();
        assert_eq!(tree.node(root).kind(), NodeKind::Map);

        let a = tree.node(root).find_child("a").unwrap();
        assert_eq!(tree.node(a).kind(), NodeKind::Scalar);
        assert_eq!(tree.node(a).raw_value(), "1");

        let b = tree.node(root).find_child("b").unwrap();
        assert_eq!(tree.node(b).kind(), NodeKind::Array);
        assert_eq!(tree.node(b).child_count(), 2);
        let second = tree.node(b).find_index(1).unwrap();
        assert_eq!(tree.node(second).raw_value(), "2.5");
        assert_eq!(tree.node(second).path(), "b.1");
    }

    #[test]
    fn reapply_keeps_stale_children() {
        let mut tree = PropertyTree::new();
        tree.load_str("a: 1\nb: 2\n").unwrap();
        tree.load_str("a: 3\n").unwrap();

        let root = tree.root();
        let a = tree.node(root).find_child("a").unwrap();
        assert_eq!(tree.node(a).raw_value(), "3");

        // `b` was absent from the second document but is not pruned.
        let b = tree.node(root).find_child("b").unwrap();
        assert_eq!(tree.node(b).raw_value(), "2");
    }

    #[test]
    fn null_value_leaves_node_unset() {
        let mut tree = PropertyTree::new();
        tree.load_str("a: ~\n").unwrap();
        let root = tree.root();
        let a = tree.node(root).find_child("a").unwrap();
        assert!(!tree.node(a).is_set());
        assert_eq!(tree.get(a, 11i64).unwrap(), 11);
    }

    #[test]
    fn kind_flip_replaces_children() {
        let mut tree = PropertyTree::new();
        tree.load_str("a:\n  x: 1\n").unwrap();
        tree.load_str("a:\n  - 1\n  - 2\n").unwrap();

        let root = tree.root();
        let a = tree.node(root).find_child("a").unwrap();
        assert_eq!(tree.node(a).kind(), NodeKind::Array);
        assert_eq!(tree.node(a).child_count(), 2);
        assert!(tree.node(a).find_child("x").is_none());
    }

    #[test]
    fn scalar_over_composite_keeps_kind() {
        // Promotion is monotonic: a node that becomes scalar in the new
        // document keeps its composite children; only its raw text updates.
        let mut tree = PropertyTree::new();
        tree.load_str("a:\n  x: 1\n").unwrap();
        tree.load_str("a: flat\n").unwrap();

        let root = tree.root();
        let a = tree.node(root).find_child("a").unwrap();
        assert_eq!(tree.node(a).kind(), NodeKind::Map);
        assert_eq!(tree.node(a).raw_value(), "flat");
        assert!(tree.node(a).find_child("x").is_some());
    }

    #[test]
    fn empty_document_is_an_error() {
        assert!(matches!(parse_document(""), Err(Error::EmptyDocument)));
    }

    #[test]
    fn malformed_document_is_an_error() {
        let result = parse_document("a: [unclosed\nb: 2");
        assert!(matches!(result, Err(Error::Parse { .. })));
    }
}
