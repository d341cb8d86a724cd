//! Change notification types.
//!
//! Mutations do not notify immediately. They enqueue `(node, flags)` dirty
//! marks on the tree, which [`PropertyTree::tick`](crate::PropertyTree::tick)
//! later drains into synchronous subscriber calls. The one exception is the
//! tree-level "reloaded" channel, which fires inside
//! [`PropertyTree::reload`](crate::PropertyTree::reload) itself.

use crate::node::NodeId;
use crate::tree::PropertyTree;

bitflags::bitflags! {
    /// What changed about a node.
    ///
    /// `VALUE`, `TYPE`, and `STRUCTURE` are independent categories: a mark
    /// enqueued with several category bits is split into one dirty entry per
    /// category, so each category is delivered separately (and at most once
    /// per drain cycle). `RECURSIVE` is a qualifier that rides along on a
    /// category entry; it never forms an entry of its own.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeFlags: u8 {
        /// The scalar value changed.
        const VALUE = 0b0001;
        /// The observed access type changed.
        const TYPE = 0b0010;
        /// A child was created or the child container was replaced.
        const STRUCTURE = 0b0100;
        /// Qualifier: the change covers descendants, not just this node.
        const RECURSIVE = 0b1000;
    }
}

impl ChangeFlags {
    /// The category bits, without qualifiers.
    pub fn category(self) -> ChangeFlags {
        self & (ChangeFlags::VALUE | ChangeFlags::TYPE | ChangeFlags::STRUCTURE)
    }
}

/// A single change notification, delivered during a tick drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    /// The node the mark was enqueued for.
    pub node: NodeId,
    /// One category bit, possibly with the `RECURSIVE` qualifier.
    pub flags: ChangeFlags,
}

/// Callback invoked for a node's change notifications.
///
/// Receives the tree mutably so the handler can read the node's current
/// typed value (which itself updates read/type state).
pub type NodeCallback = Box<dyn FnMut(&mut PropertyTree, ChangeEvent)>;

/// Callback invoked synchronously after a successful reload.
pub type ReloadCallback = Box<dyn FnMut(&mut PropertyTree)>;

/// Handle identifying one subscription, for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_strips_qualifier() {
        let flags = ChangeFlags::STRUCTURE | ChangeFlags::RECURSIVE;
        assert_eq!(flags.category(), ChangeFlags::STRUCTURE);
    }

    #[test]
    fn categories_are_disjoint_bits() {
        assert!((ChangeFlags::VALUE & ChangeFlags::TYPE).is_empty());
        assert!((ChangeFlags::TYPE & ChangeFlags::STRUCTURE).is_empty());
    }
}
