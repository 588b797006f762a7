use std::sync::Arc;

use bytes::Bytes;

use crate::bitset::ByteBitset;
use crate::iter::Iter;
use crate::path_iter::PathIter;
use crate::reverse_iter::ReverseIter;
use crate::watch::Watch;

/// A key/value pair stored in the tree, together with its watch handle.
///
/// Leaves are shared between node versions; the handle is only closed when
/// the value for the key is replaced or the key is removed.
#[derive(Debug)]
pub(crate) struct Leaf<T> {
    pub(crate) watch: Watch,
    pub(crate) key: Bytes,
    pub(crate) value: T,
}

impl<T> Leaf<T> {
    pub(crate) fn new(key: Bytes, value: T) -> Self {
        Leaf {
            watch: Watch::new(),
            key,
            value,
        }
    }
}

/// An immutable node of the radix tree.
///
/// A node carries the byte fragment that all keys below it share beyond
/// their parent's position (`prefix`), an optional leaf when a key ends
/// here, and its children indexed by the first byte of their prefix. The
/// child index is a 256-bit presence set whose rank over a label addresses
/// the compact, label-sorted child vector.
///
/// Nodes of committed trees are never mutated, so all read operations here
/// take `&self` and are safe to run from any number of threads.
#[derive(Debug)]
pub struct Node<T> {
    pub(crate) watch: Watch,
    pub(crate) leaf: Option<Arc<Leaf<T>>>,
    pub(crate) prefix: Bytes,
    pub(crate) index: ByteBitset,
    pub(crate) children: Vec<Arc<Node<T>>>,
}

impl<T> Node<T> {
    pub(crate) fn new() -> Self {
        Self::with_prefix(Bytes::new())
    }

    pub(crate) fn with_prefix(prefix: Bytes) -> Self {
        Node {
            watch: Watch::new(),
            leaf: None,
            prefix,
            index: ByteBitset::new_empty(),
            children: Vec::new(),
        }
    }

    pub(crate) fn leaf_node(prefix: Bytes, leaf: Leaf<T>) -> Self {
        let mut node = Self::with_prefix(prefix);
        node.leaf = Some(Arc::new(leaf));
        node
    }

    pub(crate) fn is_leaf(&self) -> bool {
        self.leaf.is_some()
    }

    pub(crate) fn child(&self, label: u8) -> Option<&Node<T>> {
        self.child_index(label).map(|idx| self.children[idx].as_ref())
    }

    pub(crate) fn child_index(&self, label: u8) -> Option<usize> {
        if self.index.is_set(label) {
            Some(self.index.rank(label))
        } else {
            None
        }
    }

    /// The first child whose label is greater than or equal to `label`,
    /// along with its position in the child vector.
    pub(crate) fn lower_bound_child(&self, label: u8) -> Option<(usize, &Node<T>)> {
        let found = self.index.next_set_at_or_above(label)?;
        let idx = self.index.rank(found);
        Some((idx, self.children[idx].as_ref()))
    }

    pub(crate) fn add_child(&mut self, label: u8, child: Arc<Node<T>>) {
        debug_assert!(!self.index.is_set(label), "child label already present");
        let idx = self.index.rank(label);
        self.children.insert(idx, child);
        self.index.set(label);
        debug_assert_eq!(self.children.len(), self.index.count() as usize);
    }

    pub(crate) fn remove_child(&mut self, label: u8) {
        if !self.index.is_set(label) {
            return;
        }
        let idx = self.index.rank(label);
        self.children.remove(idx);
        self.index.unset(label);
    }

    /// Looks up `key`, returning its value together with the watch handle of
    /// the finest granularity encountered along the way.
    ///
    /// On a hit the handle belongs to the leaf itself. On a miss it belongs
    /// to the deepest node the search reached, which is closed by any later
    /// mutation that could turn the miss into a hit.
    pub fn get_watch(&self, key: &[u8]) -> (Watch, Option<&T>) {
        let mut n = self;
        let mut watch = &n.watch;
        let mut search = key;
        loop {
            // Check for key exhaustion.
            if search.is_empty() {
                if let Some(leaf) = &n.leaf {
                    return (leaf.watch.clone(), Some(&leaf.value));
                }
                break;
            }

            // Look for an edge.
            match n.child(search[0]) {
                Some(child) => n = child,
                None => break,
            }

            // Update to the finest granularity as the search makes progress.
            watch = &n.watch;

            // Consume the search prefix.
            match search.strip_prefix(&n.prefix[..]) {
                Some(rest) => search = rest,
                None => break,
            }
        }
        (watch.clone(), None)
    }

    /// Looks up `key` and returns its value.
    pub fn get(&self, key: &[u8]) -> Option<&T> {
        self.get_watch(key).1
    }

    /// Returns the entry with the longest stored key that is a prefix of
    /// `key`. An empty stored key matches every lookup.
    pub fn longest_prefix(&self, key: &[u8]) -> Option<(&[u8], &T)> {
        let mut last: Option<&Arc<Leaf<T>>> = None;
        let mut n = self;
        let mut search = key;
        loop {
            if n.is_leaf() {
                last = n.leaf.as_ref();
            }
            if search.is_empty() {
                break;
            }
            match n.child(search[0]) {
                Some(child) => n = child,
                None => break,
            }
            match search.strip_prefix(&n.prefix[..]) {
                Some(rest) => search = rest,
                None => break,
            }
        }
        last.map(|leaf| (&leaf.key[..], &leaf.value))
    }

    /// Returns the entry with the smallest key in this subtree.
    pub fn minimum(&self) -> Option<(&[u8], &T)> {
        let mut n = self;
        loop {
            if let Some(leaf) = &n.leaf {
                return Some((&leaf.key[..], &leaf.value));
            }
            match n.children.first() {
                Some(child) => n = child.as_ref(),
                None => return None,
            }
        }
    }

    /// Returns the entry with the largest key in this subtree.
    pub fn maximum(&self) -> Option<(&[u8], &T)> {
        let mut n = self;
        loop {
            if let Some(child) = n.children.last() {
                n = child.as_ref();
                continue;
            }
            return n.leaf.as_ref().map(|leaf| (&leaf.key[..], &leaf.value));
        }
    }

    /// Visits every entry in ascending key order. The callback returns
    /// `true` to stop the walk.
    pub fn walk<F>(&self, mut f: F)
    where
        F: FnMut(&[u8], &T) -> bool,
    {
        walk_node(self, &mut f);
    }

    /// Visits every entry in descending key order. The callback returns
    /// `true` to stop the walk.
    pub fn walk_backwards<F>(&self, mut f: F)
    where
        F: FnMut(&[u8], &T) -> bool,
    {
        walk_node_backwards(self, &mut f);
    }

    /// Visits every entry whose key starts with `prefix`, in ascending
    /// order. The callback returns `true` to stop the walk.
    pub fn walk_prefix<F>(&self, prefix: &[u8], mut f: F)
    where
        F: FnMut(&[u8], &T) -> bool,
    {
        let mut n = self;
        let mut search = prefix;
        loop {
            if search.is_empty() {
                walk_node(n, &mut f);
                return;
            }

            match n.child(search[0]) {
                Some(child) => n = child,
                None => return,
            }

            if let Some(rest) = search.strip_prefix(&n.prefix[..]) {
                search = rest;
            } else if n.prefix.starts_with(search) {
                // The search prefix ends inside this node's fragment, so the
                // whole subtree lies under it.
                walk_node(n, &mut f);
                return;
            } else {
                return;
            }
        }
    }

    /// Visits the entries stored at prefixes of `path`, from the root down.
    /// Where [`walk_prefix`](Node::walk_prefix) visits the entries *under* a
    /// prefix, this visits the entries *above* it. The callback returns
    /// `true` to stop the walk.
    pub fn walk_path<F>(&self, path: &[u8], mut f: F)
    where
        F: FnMut(&[u8], &T) -> bool,
    {
        for (key, value) in self.path_iter(path) {
            if f(key, value) {
                return;
            }
        }
    }

    /// Returns an iterator over this subtree in ascending key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns an iterator over this subtree in descending key order.
    pub fn reverse_iter(&self) -> ReverseIter<'_, T> {
        ReverseIter::new(self)
    }

    /// Returns an iterator over the entries stored at prefixes of `path`.
    pub fn path_iter<'a>(&'a self, path: &'a [u8]) -> PathIter<'a, T> {
        PathIter::new(self, path)
    }
}

fn walk_node<T, F>(n: &Node<T>, f: &mut F) -> bool
where
    F: FnMut(&[u8], &T) -> bool,
{
    if let Some(leaf) = &n.leaf {
        if f(&leaf.key, &leaf.value) {
            return true;
        }
    }
    for child in &n.children {
        if walk_node(child, f) {
            return true;
        }
    }
    false
}

fn walk_node_backwards<T, F>(n: &Node<T>, f: &mut F) -> bool
where
    F: FnMut(&[u8], &T) -> bool,
{
    if let Some(leaf) = &n.leaf {
        if f(&leaf.key, &leaf.value) {
            return true;
        }
    }
    for child in n.children.iter().rev() {
        if walk_node_backwards(child, f) {
            return true;
        }
    }
    false
}
