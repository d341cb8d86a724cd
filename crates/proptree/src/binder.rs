//! Convenience for wiring a node's value to a setter.
//!
//! Pure glue over the notification channel: the setter is invoked once with
//! the node's current typed value at bind time, and again for every
//! subsequent notification delivered for that node.

use crate::convert::PropertyValue;
use crate::error::Result;
use crate::event::SubscriberId;
use crate::node::NodeId;
use crate::tree::PropertyTree;

/// Bind a node's typed value to `apply`.
///
/// `apply` is called immediately with the current value (reading with
/// `default`, which materializes it if the node is unset) and then on every
/// change notification for the node. Returns the subscription handle so the
/// binding can be dropped with
/// [`PropertyTree::unsubscribe`](PropertyTree::unsubscribe).
///
/// ```no_run
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use proptree::{bind, PropertyTree};
///
/// let mut tree = PropertyTree::load("settings.yaml")?;
/// let volume = tree.node_at_path(tree.root(), "audio.volume")?;
/// let level = Rc::new(Cell::new(0.0f32));
/// let target = level.clone();
/// bind(&mut tree, volume, 0.5f32, move |v| target.set(v))?;
/// # Ok::<(), proptree::Error>(())
/// ```
pub fn bind<T, F>(
    tree: &mut PropertyTree,
    node: NodeId,
    default: T,
    mut apply: F,
) -> Result<SubscriberId>
where
    T: PropertyValue + Clone + 'static,
    F: FnMut(T) + 'static,
{
    let current = tree.get(node, default.clone())?;
    apply(current);
    Ok(tree.subscribe(node, move |tree, event| {
        match tree.get(event.node, default.clone()) {
            Ok(value) => apply(value),
            Err(err) => {
                tracing::debug!(error = %err, "bound node is no longer readable");
            }
        }
    }))
}
