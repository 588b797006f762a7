use std::cmp::Ordering;
use std::collections::HashSet;

use crate::iter::{compare_prefix, seek_prefix_from};
use crate::node::Node;
use crate::watch::Watch;

/// Iterates a subtree in descending key order.
///
/// The traversal is the mirror image of [`Iter`](crate::Iter) with one
/// twist: a node's own entry sorts before everything below it, so the node
/// is pushed back under its children and marked as expanded, and its entry
/// is only yielded once the subtree has drained.
pub struct ReverseIter<'a, T> {
    start: &'a Node<T>,
    node: Option<&'a Node<T>>,
    stack: Option<Vec<&'a Node<T>>>,
    /// Nodes whose children have already been pushed onto the stack.
    expanded: HashSet<usize>,
}

fn addr<T>(n: &Node<T>) -> usize {
    n as *const Node<T> as usize
}

impl<'a, T> ReverseIter<'a, T> {
    pub(crate) fn new(start: &'a Node<T>) -> Self {
        ReverseIter {
            start,
            node: Some(start),
            stack: None,
            expanded: HashSet::new(),
        }
    }

    /// Restricts iteration to keys starting with `prefix` and returns the
    /// watch handle of the finest granularity seen.
    pub fn seek_prefix_watch(&mut self, prefix: &[u8]) -> Watch {
        let (node, watch) = seek_prefix_from(self.start, prefix);
        self.stack = None;
        self.expanded.clear();
        self.node = node;
        watch
    }

    /// Restricts iteration to keys starting with `prefix`.
    pub fn seek_prefix(&mut self, prefix: &[u8]) {
        self.seek_prefix_watch(prefix);
    }

    /// Positions the iterator at the largest key less than or equal to
    /// `key`; subsequent calls to `next` yield all such keys in descending
    /// order.
    pub fn seek_reverse_lower_bound(&mut self, key: &[u8]) {
        let mut stack: Vec<&'a Node<T>> = Vec::new();
        self.expanded.clear();
        let mut n = self.start;
        self.node = None;
        let mut search = key;
        loop {
            match compare_prefix(&n.prefix, search) {
                Ordering::Less => {
                    // The node's fragment sorts below the search key, so
                    // every key in the subtree qualifies. Left unexpanded,
                    // iteration will descend to the subtree's maximum.
                    stack.push(n);
                    break;
                }
                Ordering::Greater => {
                    // Everything below sorts after the search key.
                    break;
                }
                Ordering::Equal => {}
            }

            if let Some(leaf) = &n.leaf {
                if &leaf.key[..] == key {
                    // Exact match. The children hold longer, larger keys
                    // and are excluded, so mark the node as expanded.
                    self.expanded.insert(addr(n));
                    stack.push(n);
                    break;
                }
                // The leaf sorts below the search key. Without children it
                // is the bound itself; otherwise some children may hold
                // larger keys that still qualify, and the leaf must be
                // yielded after them.
                self.expanded.insert(addr(n));
                stack.push(n);
                if n.children.is_empty() {
                    break;
                }
            }

            search = &search[n.prefix.len()..];
            if search.is_empty() {
                // The search key ended here without an exact match, so all
                // children sort above it.
                break;
            }

            let (idx, child) = match n.lower_bound_child(search[0]) {
                Some((idx, child)) => (idx, Some(child)),
                None => (n.children.len(), None),
            };
            // Children before the lower bound hold strictly smaller keys
            // and qualify wholesale. Pushed in ascending order, the largest
            // is popped first.
            for sibling in n.children[..idx].iter() {
                stack.push(sibling.as_ref());
            }
            match child {
                Some(child) => n = child,
                None => break,
            }
        }
        self.stack = Some(stack);
    }
}

impl<'a, T> Iterator for ReverseIter<'a, T> {
    type Item = (&'a [u8], &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node;
        let stack = self.stack.get_or_insert_with(|| match node {
            Some(n) => vec![n],
            None => Vec::new(),
        });
        while let Some(n) = stack.pop() {
            let already_expanded = self.expanded.contains(&addr(n));

            if !n.children.is_empty() && !already_expanded {
                self.expanded.insert(addr(n));
                // Children pushed in ascending order so the largest pops
                // first; the node itself goes back underneath them, its
                // entry due only after the subtree.
                for child in n.children.iter() {
                    stack.push(child.as_ref());
                }
                stack.push(n);
                continue;
            }

            if already_expanded {
                self.expanded.remove(&addr(n));
            }

            if let Some(leaf) = &n.leaf {
                return Some((&leaf.key[..], &leaf.value));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use crate::tree::Tree;

    fn tree_of(keys: &[&[u8]]) -> Tree<usize> {
        let tree = Tree::new();
        let mut txn = tree.txn();
        for (i, key) in keys.iter().enumerate() {
            txn.insert(key, i);
        }
        txn.commit()
    }

    fn drain_reverse_lower_bound(tree: &Tree<usize>, key: &[u8]) -> Vec<Vec<u8>> {
        let mut iter = tree.root().reverse_iter();
        iter.seek_reverse_lower_bound(key);
        iter.map(|(k, _)| k.to_vec()).collect()
    }

    #[test]
    fn fresh_iterator_yields_everything_descending() {
        let tree = tree_of(&[b"cherry", b"apple", b"banana"]);
        let keys: Vec<&[u8]> = tree.root().reverse_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"cherry"[..], &b"banana"[..], &b"apple"[..]]);
    }

    #[test]
    fn reverse_lower_bound_between_keys() {
        let tree = tree_of(&[b"001", b"002", b"005", b"010", b"200", b"201"]);
        assert_eq!(
            drain_reverse_lower_bound(&tree, b"100"),
            vec![b"010".to_vec(), b"005".to_vec(), b"002".to_vec(), b"001".to_vec()]
        );
    }

    #[test]
    fn reverse_lower_bound_exact_and_boundaries() {
        let tree = tree_of(&[b"001", b"002", b"005"]);
        assert_eq!(
            drain_reverse_lower_bound(&tree, b"002"),
            vec![b"002".to_vec(), b"001".to_vec()]
        );
        assert_eq!(
            drain_reverse_lower_bound(&tree, b"000"),
            Vec::<Vec<u8>>::new()
        );
        assert_eq!(
            drain_reverse_lower_bound(&tree, b"999"),
            vec![b"005".to_vec(), b"002".to_vec(), b"001".to_vec()]
        );
    }

    #[test]
    fn reverse_lower_bound_with_nested_prefixes() {
        let tree = tree_of(&[b"f", b"fo", b"foo", b"food", b"bug"]);
        assert_eq!(
            drain_reverse_lower_bound(&tree, b"foo"),
            vec![b"foo".to_vec(), b"fo".to_vec(), b"f".to_vec(), b"bug".to_vec()]
        );
    }

    #[test]
    fn reverse_seek_prefix_restricts_iteration() {
        let tree = tree_of(&[b"foo/a", b"foo/b", b"zip"]);
        let mut iter = tree.root().reverse_iter();
        iter.seek_prefix(b"foo/");
        let keys: Vec<&[u8]> = iter.map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&b"foo/b"[..], &b"foo/a"[..]]);
    }

    #[test]
    fn reverse_lower_bound_on_empty_tree() {
        let tree: Tree<usize> = Tree::new();
        assert_eq!(
            drain_reverse_lower_bound(&tree, b"x"),
            Vec::<Vec<u8>>::new()
        );
    }

    proptest! {
        #[test]
        fn reverse_lower_bound_matches_ordered_map(
            keys in prop::collection::hash_set(prop::array::uniform8(0u8..=255), 1..256),
            bound in prop::array::uniform8(0u8..=255),
        ) {
            let mut oracle = BTreeMap::new();
            let tree = Tree::new();
            let mut txn = tree.txn();
            for (i, key) in keys.iter().enumerate() {
                txn.insert(key, i);
                oracle.insert(key.to_vec(), i);
            }
            let tree = txn.commit();

            let got = drain_reverse_lower_bound(&tree, &bound);
            let expected: Vec<Vec<u8>> = oracle
                .range(..=bound.to_vec())
                .rev()
                .map(|(k, _)| k.clone())
                .collect();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn reverse_iteration_mirrors_forward(
            keys in prop::collection::hash_set(prop::array::uniform8(0u8..=255), 1..256),
        ) {
            let tree = Tree::new();
            let mut txn = tree.txn();
            for (i, key) in keys.iter().enumerate() {
                txn.insert(key, i);
            }
            let tree = txn.commit();

            let mut forward: Vec<Vec<u8>> =
                tree.root().iter().map(|(k, _)| k.to_vec()).collect();
            let backward: Vec<Vec<u8>> =
                tree.root().reverse_iter().map(|(k, _)| k.to_vec()).collect();
            forward.reverse();
            prop_assert_eq!(forward, backward);
        }
    }
}
