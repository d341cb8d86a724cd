//! The property tree: node arena, typed access, dirty tracking, and the
//! load / reload / save lifecycle.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use indexmap::{IndexMap, IndexSet};

use crate::convert::PropertyValue;
use crate::emit;
use crate::error::{Error, Result};
use crate::event::{ChangeEvent, ChangeFlags, NodeCallback, ReloadCallback, SubscriberId};
use crate::node::{Children, NodeId, NodeKind, PropertyNode};
use crate::yaml;

/// How often `tick` checks the backing file for external changes.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A hierarchical, file-backed property store.
///
/// The tree owns every node (they live in an arena addressed by [`NodeId`]
/// and are only freed when the tree is dropped), the backing file identity,
/// and the batched dirty set. Application code reads typed values with
/// defaults via [`get`](Self::get) / [`get_at`](Self::get_at), optionally
/// writes them back, and subscribes to per-node change notifications that
/// are delivered when the host calls [`tick`](Self::tick).
///
/// Reads are not side-effect-free: looking up a path materializes every
/// missing node along it ("create on read"). Use the presence queries
/// ([`has_path`](Self::has_path), [`has_key`](Self::has_key)) to probe
/// without materializing.
///
/// The tree is single-threaded by design. All mutation, dirty-set
/// accumulation, and notification delivery happen synchronously on the
/// caller's thread; a multi-threaded host must serialize access itself.
pub struct PropertyTree {
    nodes: Vec<PropertyNode>,
    root: NodeId,
    source: Option<PathBuf>,
    last_modified: Option<SystemTime>,
    poll_interval: Duration,
    last_poll: Option<Instant>,
    dirty: IndexSet<(NodeId, ChangeFlags)>,
    node_subscribers: HashMap<NodeId, Vec<(SubscriberId, NodeCallback)>>,
    reload_subscribers: Vec<(SubscriberId, ReloadCallback)>,
    next_subscriber: u64,
    // Unsubscribes issued while the subscriber lists are moved out for a
    // delivery cycle; applied when the lists are merged back.
    drain_depth: u32,
    pending_unsubscribes: Vec<SubscriberId>,
}

impl Default for PropertyTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyTree {
    /// Create an empty tree with no backing file.
    pub fn new() -> Self {
        let root = NodeId(0);
        Self {
            nodes: vec![PropertyNode::new(String::new(), None)],
            root,
            source: None,
            last_modified: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            last_poll: None,
            dirty: IndexSet::new(),
            node_subscribers: HashMap::new(),
            reload_subscribers: Vec::new(),
            next_subscriber: 0,
            drain_depth: 0,
            pending_unsubscribes: Vec::new(),
        }
    }

    /// Load a tree from a backing file.
    ///
    /// Records the file's modification time so later
    /// [`reload_if_needed`](Self::reload_if_needed) calls can detect
    /// external edits.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut tree = Self::new();
        tree.source = Some(path.into());
        let (text, modified) = tree.read_source()?;
        let doc = yaml::parse_document(&text)?;
        tree.last_modified = Some(modified);
        let root = tree.root;
        yaml::apply_document(&mut tree, root, &doc);
        Ok(tree)
    }

    /// Apply a document given as text onto the existing root.
    ///
    /// Useful for trees without a backing file. Does not fire the
    /// tree-level reloaded notification.
    pub fn load_str(&mut self, text: &str) -> Result<()> {
        let doc = yaml::parse_document(text)?;
        let root = self.root;
        yaml::apply_document(self, root, &doc);
        Ok(())
    }

    /// The root node id.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Borrow a node for inspection.
    pub fn node(&self, id: NodeId) -> &PropertyNode {
        &self.nodes[id.0 as usize]
    }

    /// The backing file, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Change how often [`tick`](Self::tick) polls the backing file.
    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    fn node_mut(&mut self, id: NodeId) -> &mut PropertyNode {
        &mut self.nodes[id.0 as usize]
    }

    fn alloc(&mut self, path: String, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(PropertyNode::new(path, Some(parent)));
        id
    }

    // ----- typed access ---------------------------------------------------

    /// Read a typed value, falling back to `default`.
    ///
    /// Marks the node as read, records the access type (enqueueing a `TYPE`
    /// notification when it differs from the last access), and decodes the
    /// stored scalar text. An unset node materializes the default as its
    /// state without emitting a `VALUE` notification; stored text that does
    /// not decode as `T` yields the default as well.
    ///
    /// Only a kind mismatch during structural reconstruction is an error.
    pub fn get<T: PropertyValue>(&mut self, id: NodeId, default: T) -> Result<T> {
        self.node_mut(id).has_been_read = true;

        let new_tag = T::tag();
        if self.node(id).type_tag != Some(new_tag) {
            self.node_mut(id).type_tag = Some(new_tag);
            self.mark_dirty(id, ChangeFlags::TYPE);
        }

        if self.node(id).is_set {
            match T::decode(&self.node(id).raw) {
                Some(value) => Ok(value),
                None => {
                    tracing::debug!(
                        path = self.node(id).path(),
                        tag = %new_tag,
                        "stored text does not decode, returning default"
                    );
                    Ok(default)
                }
            }
        } else {
            let value = T::decode_structural(self, id, default)?;
            if !T::STRUCTURAL && self.node(id).kind() == NodeKind::Scalar {
                // Materialize the default silently: the type-change mark
                // from this access already covers it.
                let node = self.node_mut(id);
                node.raw = value.encode();
                node.is_set = true;
            }
            Ok(value)
        }
    }

    /// Write a typed value.
    ///
    /// Structural types promote the node to `Array` and overwrite its
    /// indexed children; everything else stores canonical scalar text.
    /// Enqueues a `VALUE` mark (plus `TYPE` when the access type changed)
    /// on this node and every ancestor.
    pub fn set<T: PropertyValue>(&mut self, id: NodeId, value: T) -> Result<()> {
        if T::STRUCTURAL {
            T::encode_structural(self, id, &value)?;
        } else {
            let node = self.node_mut(id);
            node.raw = value.encode();
            node.is_set = true;
        }

        let new_tag = T::tag();
        let mut flags = ChangeFlags::VALUE;
        if self.node(id).type_tag != Some(new_tag) {
            self.node_mut(id).type_tag = Some(new_tag);
            flags |= ChangeFlags::TYPE;
        }
        self.mark_dirty(id, flags);
        Ok(())
    }

    /// Read a typed value at a dotted path below the root, creating missing
    /// nodes along the way.
    pub fn get_at<T: PropertyValue>(&mut self, path: &str, default: T) -> Result<T> {
        let id = self.node_at_path(self.root, path)?;
        self.get(id, default)
    }

    /// Write a typed value at a dotted path below the root.
    pub fn set_at<T: PropertyValue>(&mut self, path: &str, value: T) -> Result<()> {
        let id = self.node_at_path(self.root, path)?;
        self.set(id, value)
    }

    /// Read a typed value from an indexed child.
    pub fn get_index<T: PropertyValue>(
        &mut self,
        id: NodeId,
        index: usize,
        default: T,
    ) -> Result<T> {
        let child = self.child_by_index(id, index)?;
        self.get(child, default)
    }

    // ----- child access ---------------------------------------------------

    /// Return the keyed child, creating it (and promoting this node to
    /// `Map`) if missing. Creation enqueues a `STRUCTURE` mark; lookup of an
    /// existing child does not.
    pub fn child_by_key(&mut self, id: NodeId, key: &str) -> Result<NodeId> {
        match &self.node(id).children {
            Children::Map(map) => {
                if let Some(child) = map.get(key) {
                    return Ok(*child);
                }
            }
            Children::Array(_) => {
                return Err(Error::KindMismatch {
                    path: self.node(id).path.clone(),
                    requested: NodeKind::Map,
                    actual: NodeKind::Array,
                });
            }
            Children::None => {
                self.node_mut(id).children = Children::Map(IndexMap::new());
            }
        }

        let path = self.node(id).child_path(key);
        let child = self.alloc(path, id);
        if let Children::Map(map) = &mut self.node_mut(id).children {
            map.insert(key.to_string(), child);
        }
        self.mark_dirty(child, ChangeFlags::STRUCTURE);
        Ok(child)
    }

    /// Return the indexed child, creating it (and promoting this node to
    /// `Array`) if missing. Missing slots up to `index` are created as unset
    /// scalars, each enqueueing a `STRUCTURE` mark.
    pub fn child_by_index(&mut self, id: NodeId, index: usize) -> Result<NodeId> {
        match &self.node(id).children {
            Children::Array(items) => {
                if let Some(child) = items.get(index) {
                    return Ok(*child);
                }
            }
            Children::Map(_) => {
                return Err(Error::KindMismatch {
                    path: self.node(id).path.clone(),
                    requested: NodeKind::Array,
                    actual: NodeKind::Map,
                });
            }
            Children::None => {
                self.node_mut(id).children = Children::Array(Vec::new());
            }
        }

        let mut created = Vec::new();
        while self.node(id).child_count() <= index {
            let segment = self.node(id).child_count().to_string();
            let path = self.node(id).child_path(&segment);
            let child = self.alloc(path, id);
            if let Children::Array(items) = &mut self.node_mut(id).children {
                items.push(child);
            }
            created.push(child);
        }
        for child in &created {
            self.mark_dirty(*child, ChangeFlags::STRUCTURE);
        }
        let node = self.node(id);
        Ok(node.find_index(index).expect("slot was just created"))
    }

    /// Walk a dotted path from `id`, creating every missing segment.
    ///
    /// Segments under an `Array`-kinded node are interpreted positionally;
    /// everywhere else they are mapping keys. An empty path names `id`
    /// itself. Looking up a deep nonexistent path is deliberately *not*
    /// side-effect-free.
    pub fn node_at_path(&mut self, id: NodeId, path: &str) -> Result<NodeId> {
        let mut current = id;
        if path.is_empty() {
            return Ok(current);
        }
        for segment in path.split('.') {
            current = if self.node(current).kind() == NodeKind::Array {
                let index: usize =
                    segment.parse().map_err(|_| Error::BadIndexSegment {
                        path: self.node(current).path.clone(),
                        segment: segment.to_string(),
                    })?;
                self.child_by_index(current, index)?
            } else {
                self.child_by_key(current, segment)?
            };
        }
        Ok(current)
    }

    // ----- presence queries (side-effect-free) ----------------------------

    /// Whether `id` has a keyed child named `key`. Never creates nodes.
    pub fn has_child(&self, id: NodeId, key: &str) -> bool {
        self.node(id).find_child(key).is_some()
    }

    /// Whether the dotted path exists below `id`. Never creates nodes.
    pub fn has_path(&self, id: NodeId, path: &str) -> bool {
        self.resolve_existing(id, path).is_some()
    }

    /// Whether `key` exists under the node at `prefix` (empty prefix names
    /// the root). Never creates nodes.
    pub fn has_key(&self, prefix: &str, key: &str) -> bool {
        match self.resolve_existing(self.root, prefix) {
            Some(base) => self.step_existing(base, key).is_some(),
            None => false,
        }
    }

    fn resolve_existing(&self, id: NodeId, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(id);
        }
        let mut current = id;
        for segment in path.split('.') {
            current = self.step_existing(current, segment)?;
        }
        Some(current)
    }

    fn step_existing(&self, id: NodeId, segment: &str) -> Option<NodeId> {
        let node = self.node(id);
        match node.kind() {
            NodeKind::Map => node.find_child(segment),
            NodeKind::Array => segment.parse().ok().and_then(|i| node.find_index(i)),
            NodeKind::Scalar => None,
        }
    }

    // ----- dirty tracking and notification --------------------------------

    /// Enqueue a dirty mark for `id` and every ancestor up to the root.
    ///
    /// The mark is split into one entry per category bit so independent
    /// categories are delivered separately; duplicate entries collapse
    /// until the next drain.
    pub(crate) fn mark_dirty(&mut self, id: NodeId, flags: ChangeFlags) {
        let qualifier = flags & ChangeFlags::RECURSIVE;
        let mut current = Some(id);
        while let Some(node) = current {
            for bit in [ChangeFlags::VALUE, ChangeFlags::TYPE, ChangeFlags::STRUCTURE] {
                if flags.contains(bit) {
                    self.dirty.insert((node, bit | qualifier));
                }
            }
            current = self.node(node).parent;
        }
    }

    /// Subscribe to a node's change notifications.
    ///
    /// The callback runs synchronously during [`tick`](Self::tick)'s drain,
    /// once per pending (node, flag) entry.
    pub fn subscribe(
        &mut self,
        id: NodeId,
        callback: impl FnMut(&mut PropertyTree, ChangeEvent) + 'static,
    ) -> SubscriberId {
        let sid = self.next_subscriber_id();
        self.node_subscribers
            .entry(id)
            .or_default()
            .push((sid, Box::new(callback)));
        sid
    }

    /// Subscribe to the tree-level reloaded notification, fired
    /// synchronously inside [`reload`](Self::reload) after a successful
    /// reload.
    pub fn subscribe_reloaded(
        &mut self,
        callback: impl FnMut(&mut PropertyTree) + 'static,
    ) -> SubscriberId {
        let sid = self.next_subscriber_id();
        self.reload_subscribers.push((sid, Box::new(callback)));
        sid
    }

    /// Drop a subscription. Takes effect for the next delivery cycle, and
    /// may be called from inside a delivered callback.
    pub fn unsubscribe(&mut self, sid: SubscriberId) {
        for list in self.node_subscribers.values_mut() {
            list.retain(|(s, _)| *s != sid);
        }
        self.reload_subscribers.retain(|(s, _)| *s != sid);
        if self.drain_depth > 0 {
            // The live lists are moved out while notifications run; record
            // the id so the merge-back drops it too.
            self.pending_unsubscribes.push(sid);
        }
    }

    fn next_subscriber_id(&mut self) -> SubscriberId {
        let sid = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        sid
    }

    /// Run one maintenance cycle: poll the backing file (at most once per
    /// poll interval) and reload if it changed, then drain the dirty set
    /// into per-node notifications.
    ///
    /// Reload happens before the drain, so notifications observed in a tick
    /// reflect the post-reload state. The drain runs even when the reload
    /// fails; the error is returned afterwards. Returns whether a reload
    /// happened.
    pub fn tick(&mut self) -> Result<bool> {
        let mut reloaded = Ok(false);
        let due = self
            .last_poll
            .is_none_or(|at| at.elapsed() >= self.poll_interval);
        if due && self.source.is_some() {
            self.last_poll = Some(Instant::now());
            reloaded = self.reload_if_needed();
        }
        self.drain_dirty();
        reloaded
    }

    fn drain_dirty(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        let entries: Vec<(NodeId, ChangeFlags)> = self.dirty.drain(..).collect();

        // The subscriber map is moved out so callbacks can receive the tree
        // mutably; subscriptions made inside a callback land in the fresh
        // map and are merged back afterwards, and unsubscribes issued
        // inside a callback are replayed over the merged map.
        let mut subscribers = std::mem::take(&mut self.node_subscribers);
        self.drain_depth += 1;
        for (node, flags) in entries {
            if let Some(list) = subscribers.get_mut(&node) {
                for (_, callback) in list.iter_mut() {
                    callback(self, ChangeEvent { node, flags });
                }
            }
        }
        self.drain_depth -= 1;
        for (node, mut added) in std::mem::take(&mut self.node_subscribers) {
            subscribers.entry(node).or_default().append(&mut added);
        }
        self.node_subscribers = subscribers;
        self.apply_pending_unsubscribes();
    }

    fn notify_reloaded(&mut self) {
        let mut subscribers = std::mem::take(&mut self.reload_subscribers);
        self.drain_depth += 1;
        for (_, callback) in subscribers.iter_mut() {
            callback(self);
        }
        self.drain_depth -= 1;
        let mut added = std::mem::take(&mut self.reload_subscribers);
        subscribers.append(&mut added);
        self.reload_subscribers = subscribers;
        self.apply_pending_unsubscribes();
    }

    /// Replay unsubscribes that arrived while the subscriber lists were
    /// moved out. Deferred until the outermost delivery cycle finishes so a
    /// nested cycle cannot drop ids the outer one still needs to filter.
    fn apply_pending_unsubscribes(&mut self) {
        if self.drain_depth > 0 || self.pending_unsubscribes.is_empty() {
            return;
        }
        let removed = std::mem::take(&mut self.pending_unsubscribes);
        for list in self.node_subscribers.values_mut() {
            list.retain(|(s, _)| !removed.contains(s));
        }
        self.reload_subscribers.retain(|(s, _)| !removed.contains(s));
    }

    // ----- reload / save --------------------------------------------------

    /// Re-parse the backing file over the existing root, then fire the
    /// tree-level reloaded notification.
    ///
    /// The file is read and parsed in full before the tree is touched: any
    /// I/O or parse failure leaves the prior in-memory state intact and
    /// fires nothing. Children present in the old tree but absent from the
    /// new document are not pruned; they stay behind with their last state.
    pub fn reload(&mut self) -> Result<()> {
        let (text, modified) = self.read_source()?;
        let doc = yaml::parse_document(&text)?;
        self.last_modified = Some(modified);
        let root = self.root;
        yaml::apply_document(self, root, &doc);
        if let Some(source) = &self.source {
            tracing::info!(source = %source.display(), "reloaded property tree");
        }
        self.notify_reloaded();
        Ok(())
    }

    /// Reload when the backing file's modification time changed since the
    /// last load or reload. Returns whether a reload happened.
    pub fn reload_if_needed(&mut self) -> Result<bool> {
        let path = self.source.as_ref().ok_or(Error::NoSource)?;
        let modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
        if self.last_modified == Some(modified) {
            return Ok(false);
        }
        self.reload()?;
        Ok(true)
    }

    fn read_source(&self) -> Result<(String, SystemTime)> {
        let path = self.source.as_ref().ok_or(Error::NoSource)?;
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        let modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
        Ok((text, modified))
    }

    /// Serialize the tree back to its backing file.
    pub fn save(&self) -> Result<()> {
        let path = self.source.as_ref().ok_or(Error::NoSource)?;
        self.save_to(path, false)
    }

    /// Serialize the tree back to its backing file, marking every scalar
    /// entry that was never read with an `# unread` comment so unused
    /// configuration can be audited.
    pub fn save_with_annotations(&self) -> Result<()> {
        let path = self.source.as_ref().ok_or(Error::NoSource)?;
        self.save_to(path, true)
    }

    /// Serialize the tree to an arbitrary file.
    pub fn save_to(&self, path: &Path, annotate: bool) -> Result<()> {
        let text = emit::emit(self, self.root, annotate);
        fs::write(path, text).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(target_file = %path.display(), annotate, "saved property tree");
        Ok(())
    }

    /// Serialize the tree to a document string.
    pub fn to_yaml_string(&self) -> String {
        emit::emit(self, self.root, false)
    }

    // ----- document adapter hooks (load direction) ------------------------

    /// Overwrite the scalar text from the document. Marks `VALUE` only when
    /// the text actually changed.
    pub(crate) fn set_raw(&mut self, id: NodeId, text: String) {
        let node = self.node_mut(id);
        node.is_set = true;
        if node.raw != text {
            node.raw = text;
            self.mark_dirty(id, ChangeFlags::VALUE);
        }
    }

    /// Commit the node to `Map` kind for the document being applied. A
    /// previous `Array` commitment is replaced wholesale (the old children
    /// become unreachable until the tree is dropped) and marked as a
    /// recursive structure change.
    pub(crate) fn force_map(&mut self, id: NodeId) {
        match self.node(id).children {
            Children::Map(_) => {}
            Children::None => {
                self.node_mut(id).children = Children::Map(IndexMap::new());
            }
            Children::Array(_) => {
                self.node_mut(id).children = Children::Map(IndexMap::new());
                self.mark_dirty(id, ChangeFlags::STRUCTURE | ChangeFlags::RECURSIVE);
            }
        }
    }

    /// Commit the node to `Array` kind for the document being applied.
    /// Counterpart of [`force_map`](Self::force_map).
    pub(crate) fn force_array(&mut self, id: NodeId) {
        match self.node(id).children {
            Children::Array(_) => {}
            Children::None => {
                self.node_mut(id).children = Children::Array(Vec::new());
            }
            Children::Map(_) => {
                self.node_mut(id).children = Children::Array(Vec::new());
                self.mark_dirty(id, ChangeFlags::STRUCTURE | ChangeFlags::RECURSIVE);
            }
        }
    }

    // ----- debug ----------------------------------------------------------

    /// Render the subtree under `id` as an indented debug listing.
    pub fn dump(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.dump_into(id, 0, &mut out);
        out
    }

    fn dump_into(&self, id: NodeId, depth: usize, out: &mut String) {
        use std::fmt::Write;
        let pad = "  ".repeat(depth);
        let node = self.node(id);
        match &node.children {
            Children::None => {
                let _ = writeln!(out, "{pad}{:?}", node.raw);
            }
            Children::Map(map) => {
                let _ = writeln!(out, "{pad}map {{");
                for (key, child) in map {
                    let grand = self.node(*child);
                    if grand.kind() == NodeKind::Scalar {
                        let _ = writeln!(out, "{pad}  {key} = {:?}", grand.raw);
                    } else {
                        let _ = writeln!(out, "{pad}  {key} =");
                        self.dump_into(*child, depth + 2, out);
                    }
                }
                let _ = writeln!(out, "{pad}}}");
            }
            Children::Array(items) => {
                let _ = writeln!(out, "{pad}array [");
                for child in items {
                    self.dump_into(*child, depth + 1, out);
                }
                let _ = writeln!(out, "{pad}]");
            }
        }
    }
}
