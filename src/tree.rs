use std::sync::Arc;

use crate::iter::Iter;
use crate::node::Node;
use crate::txn::Txn;

/// An immutable radix tree mapping byte string keys to values of type `T`.
///
/// A `Tree` is a cheap handle over an immutable root node: cloning it
/// copies a pointer and a counter. Mutations leave `self` untouched and
/// hand back a new tree that shares every node off the mutation path with
/// its predecessor, so old versions remain fully readable. Batched
/// mutations go through [`txn`](Tree::txn).
#[derive(Debug)]
pub struct Tree<T> {
    pub(crate) root: Arc<Node<T>>,
    pub(crate) size: usize,
}

impl<T> Tree<T> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Tree {
            root: Arc::new(Node::new()),
            size: 0,
        }
    }

    pub(crate) fn from_parts(root: Arc<Node<T>>, size: usize) -> Self {
        Tree { root, size }
    }

    /// Number of entries in the tree.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The root node, the entry point for all read operations.
    pub fn root(&self) -> &Node<T> {
        &self.root
    }

    /// Starts a transaction. The tree itself is never affected; the
    /// transaction commits into a new tree.
    pub fn txn(&self) -> Txn<T> {
        Txn::new(self)
    }

    /// Looks up `key`.
    pub fn get(&self, key: &[u8]) -> Option<&T> {
        self.root.get(key)
    }
}

impl<T: Clone> Tree<T> {
    /// Inserts or updates a single key, committing immediately. Returns the
    /// new tree and the previous value if the key was present.
    pub fn insert(&self, key: &[u8], value: T) -> (Tree<T>, Option<T>) {
        let mut txn = self.txn();
        let old = txn.insert(key, value);
        (txn.commit(), old)
    }

    /// Removes a single key, committing immediately. Returns the new tree
    /// and the removed value if the key was present.
    pub fn delete(&self, key: &[u8]) -> (Tree<T>, Option<T>) {
        let mut txn = self.txn();
        let old = txn.delete(key);
        (txn.commit(), old)
    }

    /// Removes every key starting with `prefix`, committing immediately.
    /// The flag reports whether anything changed.
    pub fn delete_prefix(&self, prefix: &[u8]) -> (Tree<T>, bool) {
        let mut txn = self.txn();
        let changed = txn.delete_prefix(prefix);
        (txn.commit(), changed)
    }
}

impl<T> Clone for Tree<T> {
    fn clone(&self) -> Self {
        Tree {
            root: Arc::clone(&self.root),
            size: self.size,
        }
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> IntoIterator for &'a Tree<T> {
    type Item = (&'a [u8], &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.root().iter()
    }
}
