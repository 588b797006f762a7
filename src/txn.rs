use std::collections::HashSet;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::bitset::ByteBitset;
use crate::node::{Leaf, Node};
use crate::raw_iter::RawIter;
use crate::tree::Tree;
use crate::watch::Watch;

/// Upper bound on per-transaction bookkeeping. Once the number of queued
/// watch handles passes this, precise tracking is abandoned in favor of the
/// slow notification fallback; the writable-node cache is likewise capped.
pub(crate) const DEFAULT_MODIFIED_CACHE: usize = 8192;

/// Identity of a node for the lifetime of a transaction.
///
/// Membership is only ever tested for nodes reachable from the transaction
/// root. Nodes shared with earlier trees stay allocated for the whole
/// transaction, so a recycled address can only denote a node this
/// transaction allocated itself, which is exactly what the set tracks.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct NodeId(usize);

impl NodeId {
    fn of<T>(node: &Arc<Node<T>>) -> Self {
        NodeId(Arc::as_ptr(node) as usize)
    }
}

/// Copy-on-write state shared by all write paths of a transaction.
struct WriteCtx {
    /// Identities of nodes this transaction created and may edit in place.
    writable: Option<HashSet<NodeId>>,
    /// Watch handles queued for closing at notify.
    track_channels: HashSet<Watch>,
    track_overflow: bool,
    track_mutate: bool,
}

impl WriteCtx {
    fn new() -> Self {
        WriteCtx {
            writable: None,
            track_channels: HashSet::new(),
            track_overflow: false,
            track_mutate: false,
        }
    }

    fn track_channel(&mut self, watch: Watch) {
        if self.track_overflow {
            return;
        }
        if self.track_channels.len() >= DEFAULT_MODIFIED_CACHE {
            self.track_overflow = true;
            self.track_channels = HashSet::new();
            return;
        }
        self.track_channels.insert(watch);
    }

    /// Returns mutable access to the node in `slot`, cloning it first unless
    /// this transaction already owns it.
    ///
    /// The first write to a node queues the superseded node handle (and,
    /// when `for_leaf_update` is set, the handle of the leaf about to be
    /// replaced) and installs a copy with a fresh handle. Later writes find
    /// the node in the writable set and edit it in place.
    fn writable_node<'a, T>(
        &mut self,
        slot: &'a mut Arc<Node<T>>,
        for_leaf_update: bool,
    ) -> &'a mut Node<T> {
        let reuse = match &self.writable {
            Some(writable) => {
                writable.contains(&NodeId::of(slot)) && Arc::get_mut(slot).is_some()
            }
            None => false,
        };
        if reuse {
            // The node handle was queued when this transaction first wrote
            // the node; only a leaf about to be replaced still needs it.
            if self.track_mutate && for_leaf_update {
                if let Some(leaf) = &slot.leaf {
                    let watch = leaf.watch.clone();
                    self.track_channel(watch);
                }
            }
            return Arc::get_mut(slot).expect("writable node is uniquely referenced");
        }

        if self.track_mutate {
            self.track_channel(slot.watch.clone());
            if for_leaf_update {
                if let Some(leaf) = &slot.leaf {
                    self.track_channel(leaf.watch.clone());
                }
            }
        }

        *slot = Arc::new(Node {
            watch: Watch::new(),
            leaf: slot.leaf.clone(),
            prefix: slot.prefix.clone(),
            index: slot.index.clone(),
            children: slot.children.clone(),
        });

        let writable = self.writable.get_or_insert_with(HashSet::new);
        if writable.len() >= DEFAULT_MODIFIED_CACHE {
            // Losing entries only costs extra copies, never correctness.
            writable.clear();
        }
        writable.insert(NodeId::of(slot));
        Arc::get_mut(slot).expect("freshly created node is uniquely referenced")
    }
}

/// A batch of mutations that commits atomically as a new [`Tree`].
///
/// A transaction has a single writer, enforced by the mutating methods
/// taking exclusive access; readers keep using the tree it was started
/// from. Reads through the transaction observe its own uncommitted writes. With [`track_mutate`](Txn::track_mutate) enabled the
/// transaction records every node and leaf it supersedes and closes their
/// [`Watch`] handles when notified, typically at [`commit`](Txn::commit).
pub struct Txn<T> {
    root: Arc<Node<T>>,
    /// The root at transaction start, kept for the slow notification walk.
    snap: Arc<Node<T>>,
    size: usize,
    ctx: WriteCtx,
}

impl<T> Txn<T> {
    pub(crate) fn new(tree: &Tree<T>) -> Self {
        Txn {
            root: tree.root.clone(),
            snap: tree.root.clone(),
            size: tree.size,
            ctx: WriteCtx::new(),
        }
    }

    /// Enables or disables tracking of superseded watch handles. Tracking
    /// costs memory proportional to the number of touched nodes (bounded,
    /// with a slow-path fallback) and is off by default.
    pub fn track_mutate(&mut self, track: bool) {
        self.ctx.track_mutate = track;
    }

    /// Number of entries the tree will hold once committed.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Looks up `key` in the transaction's uncommitted state.
    pub fn get(&self, key: &[u8]) -> Option<&T> {
        self.root.get(key)
    }

    /// Like [`Node::get_watch`], against the transaction's uncommitted
    /// state.
    pub fn get_watch(&self, key: &[u8]) -> (Watch, Option<&T>) {
        self.root.get_watch(key)
    }

    /// Splits off an independent transaction with the same uncommitted
    /// state. Neither transaction observes the other's later writes. The
    /// fork starts with tracking disabled.
    pub fn fork(&mut self) -> Txn<T> {
        // Nodes written so far are now shared with the fork, so neither
        // side may keep editing them in place.
        self.ctx.writable = None;
        Txn {
            root: self.root.clone(),
            snap: self.snap.clone(),
            size: self.size,
            ctx: WriteCtx::new(),
        }
    }

    /// Commits, returning the new tree, and delivers queued notifications.
    pub fn commit(&mut self) -> Tree<T> {
        let tree = self.commit_only();
        if self.ctx.track_mutate {
            self.notify();
        }
        tree
    }

    /// Commits without delivering notifications. Call
    /// [`notify`](Txn::notify) once the new tree is visible to observers.
    pub fn commit_only(&mut self) -> Tree<T> {
        self.ctx.writable = None;
        Tree::from_parts(self.root.clone(), self.size)
    }

    /// Closes the watch handle of everything this transaction superseded.
    /// Later calls are no-ops.
    pub fn notify(&mut self) {
        if !self.ctx.track_mutate {
            return;
        }
        if self.ctx.track_overflow {
            self.slow_notify();
        } else {
            for watch in self.ctx.track_channels.drain() {
                watch.close();
            }
        }
        self.ctx.track_channels = HashSet::new();
        self.ctx.track_overflow = false;
    }

    // Precise tracking was dropped at some point, so compare the snapshot
    // taken at transaction start against the committed root node by node.
    // Raw iteration yields paths in ascending order on both sides, which
    // makes this a lockstep merge: a path present only on the snapshot side
    // was deleted, a path present only on the root side was inserted, and
    // equal paths compare handle identities to detect replacement.
    fn slow_notify(&self) {
        let mut snap_iter = RawIter::new(&self.snap);
        let mut root_iter = RawIter::new(&self.root);
        while snap_iter.front().is_some() || root_iter.front().is_some() {
            let Some(snap_elem) = snap_iter.front() else {
                // Nothing remains on the snapshot side, nothing to close.
                return;
            };
            let Some(root_elem) = root_iter.front() else {
                // The rest of the snapshot is gone from the new tree.
                close_node(snap_elem);
                snap_iter.advance();
                continue;
            };
            match snap_iter.path().cmp(root_iter.path()) {
                std::cmp::Ordering::Less => {
                    close_node(snap_elem);
                    snap_iter.advance();
                }
                std::cmp::Ordering::Greater => {
                    root_iter.advance();
                }
                std::cmp::Ordering::Equal => {
                    if snap_elem.watch != root_elem.watch {
                        snap_elem.watch.close();
                    }
                    match (&snap_elem.leaf, &root_elem.leaf) {
                        (Some(snap_leaf), Some(root_leaf)) => {
                            if snap_leaf.watch != root_leaf.watch {
                                snap_leaf.watch.close();
                            }
                        }
                        (Some(snap_leaf), None) => snap_leaf.watch.close(),
                        _ => {}
                    }
                    snap_iter.advance();
                    root_iter.advance();
                }
            }
        }
    }
}

impl<T: Clone> Txn<T> {
    /// Inserts or updates `key`, returning the previous value if any.
    pub fn insert(&mut self, key: &[u8], value: T) -> Option<T> {
        let stored = Bytes::copy_from_slice(key);
        let (old, did_update) =
            Self::insert_rec(&mut self.ctx, &mut self.root, &stored, key, value);
        if !did_update {
            self.size += 1;
        }
        old
    }

    fn insert_rec(
        ctx: &mut WriteCtx,
        slot: &mut Arc<Node<T>>,
        key: &Bytes,
        search: &[u8],
        value: T,
    ) -> (Option<T>, bool) {
        // Key exhausted: the entry lives at this node.
        if search.is_empty() {
            let n = ctx.writable_node(slot, true);
            let old = n.leaf.as_ref().map(|leaf| leaf.value.clone());
            let did_update = old.is_some();
            n.leaf = Some(Arc::new(Leaf::new(key.clone(), value)));
            return (old, did_update);
        }

        let n = ctx.writable_node(slot, false);
        let label = search[0];
        let Some(idx) = n.child_index(label) else {
            // No edge: attach the remainder as a fresh leaf node.
            let prefix = key.slice(key.len() - search.len()..);
            n.add_child(
                label,
                Arc::new(Node::leaf_node(prefix, Leaf::new(key.clone(), value))),
            );
            return (None, false);
        };

        let child_prefix = n.children[idx].prefix.clone();
        let common = common_prefix_len(search, &child_prefix);
        if common == child_prefix.len() {
            return Self::insert_rec(ctx, &mut n.children[idx], key, &search[common..], value);
        }

        // The search key diverges inside the child's fragment. A new split
        // node takes the shared head; the existing child keeps the tail.
        let consumed = key.len() - search.len();
        let split = Arc::new(Node::with_prefix(key.slice(consumed..consumed + common)));
        let mut lower = std::mem::replace(&mut n.children[idx], split);
        {
            let trimmed = ctx.writable_node(&mut lower, false);
            trimmed.prefix = trimmed.prefix.slice(common..);
        }
        let split_node =
            Arc::get_mut(&mut n.children[idx]).expect("fresh split node is uniquely referenced");
        let lower_label = lower.prefix[0];
        split_node.add_child(lower_label, lower);

        let rest = &search[common..];
        if rest.is_empty() {
            split_node.leaf = Some(Arc::new(Leaf::new(key.clone(), value)));
        } else {
            let prefix = key.slice(key.len() - rest.len()..);
            split_node.add_child(
                rest[0],
                Arc::new(Node::leaf_node(prefix, Leaf::new(key.clone(), value))),
            );
        }
        (None, false)
    }

    /// Removes `key`, returning its value. A miss leaves the tree untouched
    /// and queues no notifications.
    pub fn delete(&mut self, key: &[u8]) -> Option<T> {
        // Probe read-only first so only a hit clones the path.
        if self.root.get(key).is_none() {
            return None;
        }
        let leaf = Self::delete_rec(&mut self.ctx, &mut self.root, true, key);
        self.size -= 1;
        Some(leaf.value.clone())
    }

    fn delete_rec(
        ctx: &mut WriteCtx,
        slot: &mut Arc<Node<T>>,
        is_root: bool,
        search: &[u8],
    ) -> Arc<Leaf<T>> {
        if search.is_empty() {
            let n = ctx.writable_node(slot, true);
            let leaf = n.leaf.take().expect("probed leaf is present");
            if !is_root && n.children.len() == 1 {
                Self::merge_child(ctx, n);
            }
            return leaf;
        }

        let label = search[0];
        let n = ctx.writable_node(slot, false);
        let idx = n.child_index(label).expect("probed edge is present");
        let child_prefix_len = n.children[idx].prefix.len();
        let leaf = Self::delete_rec(
            ctx,
            &mut n.children[idx],
            false,
            &search[child_prefix_len..],
        );

        let child_empty = {
            let child = &n.children[idx];
            child.leaf.is_none() && child.children.is_empty()
        };
        if child_empty {
            n.remove_child(label);
            if !is_root && n.children.len() == 1 && n.leaf.is_none() {
                Self::merge_child(ctx, n);
            }
        }
        leaf
    }

    /// Removes every key starting with `prefix`. Returns whether the tree
    /// changed.
    pub fn delete_prefix(&mut self, prefix: &[u8]) -> bool {
        if !Self::prefix_reachable(&self.root, prefix) {
            return false;
        }
        let removed = Self::delete_prefix_rec(&mut self.ctx, &mut self.root, true, prefix);
        self.size -= removed;
        true
    }

    // The subtree cut happens where the remaining search either runs out or
    // ends inside a child's fragment; in both cases that child's subtree
    // lies entirely under the prefix.
    fn prefix_reachable(n: &Node<T>, search: &[u8]) -> bool {
        if search.is_empty() {
            return true;
        }
        let Some(child) = n.child(search[0]) else {
            return false;
        };
        if !child.prefix.starts_with(search) && !search.starts_with(&child.prefix[..]) {
            return false;
        }
        if child.prefix.len() > search.len() {
            true
        } else {
            Self::prefix_reachable(child, &search[child.prefix.len()..])
        }
    }

    fn delete_prefix_rec(
        ctx: &mut WriteCtx,
        slot: &mut Arc<Node<T>>,
        is_root: bool,
        search: &[u8],
    ) -> usize {
        if search.is_empty() {
            // Everything below goes, this node's own entry included.
            let removed = Self::track_subtree(ctx, slot);
            let n = ctx.writable_node(slot, true);
            n.leaf = None;
            n.index = ByteBitset::new_empty();
            n.children = Vec::new();
            return removed;
        }

        let label = search[0];
        let n = ctx.writable_node(slot, false);
        let idx = n.child_index(label).expect("probed edge is present");
        let child_prefix_len = n.children[idx].prefix.len();
        let rest = if child_prefix_len > search.len() {
            &[][..]
        } else {
            &search[child_prefix_len..]
        };
        let removed = Self::delete_prefix_rec(ctx, &mut n.children[idx], false, rest);

        let child_empty = {
            let child = &n.children[idx];
            child.leaf.is_none() && child.children.is_empty()
        };
        if child_empty {
            n.remove_child(label);
            if !is_root && n.children.len() == 1 && n.leaf.is_none() {
                Self::merge_child(ctx, n);
            }
        }
        removed
    }

    // Counts the leaves below `n` and queues every node and leaf handle in
    // the subtree.
    fn track_subtree(ctx: &mut WriteCtx, n: &Node<T>) -> usize {
        let mut removed = 0;
        if ctx.track_mutate {
            ctx.track_channel(n.watch.clone());
        }
        if let Some(leaf) = &n.leaf {
            removed += 1;
            if ctx.track_mutate {
                ctx.track_channel(leaf.watch.clone());
            }
        }
        for child in &n.children {
            removed += Self::track_subtree(ctx, child);
        }
        removed
    }

    // Absorb the sole remaining child: concatenate prefixes and adopt its
    // leaf and children. The absorbed node is retired, so its handle is
    // queued; its leaf lives on and keeps its handle.
    fn merge_child(ctx: &mut WriteCtx, n: &mut Node<T>) {
        let child = n.children[0].clone();
        if ctx.track_mutate {
            ctx.track_channel(child.watch.clone());
        }

        let mut prefix = BytesMut::with_capacity(n.prefix.len() + child.prefix.len());
        prefix.extend_from_slice(&n.prefix);
        prefix.extend_from_slice(&child.prefix);
        n.prefix = prefix.freeze();
        n.leaf = child.leaf.clone();
        n.index = child.index.clone();
        n.children = child.children.clone();
    }
}

fn close_node<T>(n: &Node<T>) {
    n.watch.close();
    if let Some(leaf) = &n.leaf {
        leaf.watch.close();
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
