//! Nodes of the property tree.
//!
//! Nodes live in an arena owned by [`PropertyTree`](crate::PropertyTree) and
//! are addressed by [`NodeId`]. The parent link is a plain index — a
//! non-owning back-reference used only to propagate dirty marks upward.
//! Ownership flows strictly downward: dropping the tree drops every node,
//! and nodes are never removed individually.

use std::fmt;

use indexmap::IndexMap;

use crate::convert::TypeTag;

/// Index of a node in its tree's arena.
///
/// Ids are only meaningful for the tree that handed them out, and they stay
/// valid for the tree's whole lifetime (nodes are never deleted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// The structural category of a node's content.
///
/// Every node starts as `Scalar` and is irreversibly promoted to `Map` on
/// first keyed-child access or `Array` on first indexed-child access. A node
/// committed to one composite kind must never be accessed as the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Leaf: holds canonical scalar text.
    Scalar,
    /// Keyed children, insertion-ordered.
    Map,
    /// Indexed children.
    Array,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Scalar => write!(f, "a scalar"),
            NodeKind::Map => write!(f, "a map"),
            NodeKind::Array => write!(f, "an array"),
        }
    }
}

/// Children of a node. The variant *is* the node's kind.
#[derive(Debug, Clone)]
pub(crate) enum Children {
    /// No children: the node is a scalar.
    None,
    /// Keyed children, insertion-ordered.
    Map(IndexMap<String, NodeId>),
    /// Indexed children.
    Array(Vec<NodeId>),
}

/// One entry in the property tree.
#[derive(Debug, Clone)]
pub struct PropertyNode {
    /// Dot-joined path from the root; empty for the root itself.
    pub(crate) path: String,
    /// Canonical textual encoding of the scalar content. Meaningful only
    /// while the node is scalar-kinded.
    pub(crate) raw: String,
    /// True once a value was explicitly written or a read materialized a
    /// default.
    pub(crate) is_set: bool,
    /// True once any typed get has executed; drives the unused-entry audit.
    pub(crate) has_been_read: bool,
    /// Last observed type tag from a typed access.
    pub(crate) type_tag: Option<TypeTag>,
    /// Non-owning back-reference; `None` for the root.
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Children,
}

impl PropertyNode {
    pub(crate) fn new(path: String, parent: Option<NodeId>) -> Self {
        Self {
            path,
            raw: String::new(),
            is_set: false,
            has_been_read: false,
            type_tag: None,
            parent,
            children: Children::None,
        }
    }

    /// The node's structural kind.
    pub fn kind(&self) -> NodeKind {
        match self.children {
            Children::None => NodeKind::Scalar,
            Children::Map(_) => NodeKind::Map,
            Children::Array(_) => NodeKind::Array,
        }
    }

    /// Dot-joined path from the root (empty for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Canonical scalar text. Empty until a value is set.
    pub fn raw_value(&self) -> &str {
        &self.raw
    }

    /// Whether a value has been written or a default materialized.
    pub fn is_set(&self) -> bool {
        self.is_set
    }

    /// Whether any typed get has executed on this node.
    pub fn has_been_read(&self) -> bool {
        self.has_been_read
    }

    /// The parent node, if any.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Number of children (indexed or keyed); zero for scalars.
    pub fn child_count(&self) -> usize {
        match &self.children {
            Children::None => 0,
            Children::Map(map) => map.len(),
            Children::Array(items) => items.len(),
        }
    }

    /// Look up a keyed child without creating it.
    pub fn find_child(&self, key: &str) -> Option<NodeId> {
        match &self.children {
            Children::Map(map) => map.get(key).copied(),
            _ => None,
        }
    }

    /// Look up an indexed child without creating it.
    pub fn find_index(&self, index: usize) -> Option<NodeId> {
        match &self.children {
            Children::Array(items) => items.get(index).copied(),
            _ => None,
        }
    }

    /// The keys of a map node, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        let map = match &self.children {
            Children::Map(map) => Some(map),
            _ => None,
        };
        map.into_iter().flat_map(|m| m.keys().map(String::as_str))
    }

    /// Child path for a local segment under this node.
    pub(crate) fn child_path(&self, segment: &str) -> String {
        if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.path, segment)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_is_unset_scalar() {
        let node = PropertyNode::new(String::new(), None);
        assert_eq!(node.kind(), NodeKind::Scalar);
        assert!(!node.is_set());
        assert!(!node.has_been_read());
        assert_eq!(node.child_count(), 0);
    }

    #[test]
    fn child_path_joins_with_dot() {
        let root = PropertyNode::new(String::new(), None);
        assert_eq!(root.child_path("a"), "a");
        let nested = PropertyNode::new("a.b".into(), Some(NodeId(1)));
        assert_eq!(nested.child_path("c"), "a.b.c");
    }
}
