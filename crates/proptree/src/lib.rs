//! # proptree
//!
//! A hierarchical, file-backed property store: a tree of typed, lazily
//! materialized nodes with path-addressed reads and writes, batched change
//! notification, hot file reload, and round-trip serialization to YAML.
//!
//! Intended as a live configuration layer: callers read typed values with
//! defaults, optionally write values back, and subscribe to change
//! notifications so dependent state can resynchronize without restarting
//! the process.
//!
//! ## Example
//!
//! ```rust,no_run
//! use proptree::PropertyTree;
//!
//! let mut tree = PropertyTree::load("settings.yaml")?;
//!
//! // Typed reads with defaults; missing paths are materialized.
//! let port: u32 = tree.get_at("server.port", 8080)?;
//! let color: [f32; 3] = tree.get_at("display.clear-color", [0.0, 0.0, 0.0])?;
//!
//! // Change notifications are batched and delivered on tick.
//! let node = tree.node_at_path(tree.root(), "server.port")?;
//! tree.subscribe(node, |_, event| println!("changed: {:?}", event.flags));
//!
//! loop {
//!     // Host's periodic schedule: polls the file, reloads on change,
//!     // drains pending notifications.
//!     tree.tick()?;
//!     # break;
//! }
//! # Ok::<(), proptree::Error>(())
//! ```
//!
//! ## Model
//!
//! - Every node starts as a scalar and is irreversibly promoted to a map or
//!   array by its first keyed or indexed child access; accessing a node as
//!   the wrong composite kind is a hard error.
//! - Reads are **not** side-effect-free: looking up a path creates every
//!   missing node along it. [`PropertyTree::has_path`] and
//!   [`PropertyTree::has_key`] probe without materializing.
//! - Mutations enqueue `(node, flag)` dirty marks; [`PropertyTree::tick`]
//!   drains them into synchronous per-node notifications. Reload fires a
//!   separate tree-level notification.
//! - Composite values such as `[f32; 3]` are stored structurally: component
//!   `i` lives at child index `i`, and they serialize as compact flow
//!   sequences.
//!
//! Single-threaded by design: the host drives everything through one
//! logical thread and its own periodic tick.

mod binder;
mod convert;
mod emit;
mod error;
mod event;
mod node;
mod tree;
mod yaml;

pub use binder::bind;
pub use convert::{PropertyValue, TypeTag};
pub use error::{Error, Result};
pub use event::{ChangeEvent, ChangeFlags, SubscriberId};
pub use node::{NodeId, NodeKind, PropertyNode};
pub use tree::PropertyTree;
