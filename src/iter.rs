use std::cmp::Ordering;

use crate::node::Node;
use crate::watch::Watch;

/// Iterates a subtree in ascending key order.
///
/// Fresh iterators cover the whole subtree they were created from. The seek
/// methods restrict what the iterator yields: [`seek_prefix`](Iter::seek_prefix)
/// to the keys under a prefix, [`seek_lower_bound`](Iter::seek_lower_bound)
/// to the keys greater than or equal to a bound. Seeking again restarts
/// from the original subtree.
pub struct Iter<'a, T> {
    start: &'a Node<T>,
    node: Option<&'a Node<T>>,
    stack: Option<Vec<&'a Node<T>>>,
}

/// Descends from `start` along `prefix`. Returns the node whose subtree
/// holds all keys with that prefix (if any) and the watch handle of the
/// deepest node reached, hit or miss.
pub(crate) fn seek_prefix_from<'a, T>(
    start: &'a Node<T>,
    prefix: &[u8],
) -> (Option<&'a Node<T>>, Watch) {
    let mut n = start;
    let mut watch = &n.watch;
    let mut search = prefix;
    loop {
        if search.is_empty() {
            return (Some(n), watch.clone());
        }

        match n.child(search[0]) {
            Some(child) => n = child,
            None => return (None, watch.clone()),
        }
        watch = &n.watch;

        if let Some(rest) = search.strip_prefix(&n.prefix[..]) {
            search = rest;
        } else if n.prefix.starts_with(search) {
            return (Some(n), watch.clone());
        } else {
            return (None, watch.clone());
        }
    }
}

/// Compares a node's prefix against the same-length head of the remaining
/// search key. Drives both lower-bound seeks.
pub(crate) fn compare_prefix(prefix: &[u8], search: &[u8]) -> Ordering {
    if prefix.len() < search.len() {
        prefix.cmp(&search[..prefix.len()])
    } else {
        prefix.cmp(search)
    }
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(start: &'a Node<T>) -> Self {
        Iter {
            start,
            node: Some(start),
            stack: None,
        }
    }

    /// Restricts iteration to keys starting with `prefix` and returns the
    /// watch handle of the finest granularity seen. The handle is closed by
    /// any later mutation that adds or removes a key under the prefix.
    pub fn seek_prefix_watch(&mut self, prefix: &[u8]) -> Watch {
        let (node, watch) = seek_prefix_from(self.start, prefix);
        self.stack = None;
        self.node = node;
        watch
    }

    /// Restricts iteration to keys starting with `prefix`.
    pub fn seek_prefix(&mut self, prefix: &[u8]) {
        self.seek_prefix_watch(prefix);
    }

    // Descend to the smallest leaf below `n`, queueing the bypassed larger
    // siblings so iteration resumes with them afterwards. Pushes are in
    // reverse label order because the stack pops from the end.
    fn push_min(stack: &mut Vec<&'a Node<T>>, mut n: &'a Node<T>) {
        loop {
            if n.leaf.is_some() {
                stack.push(n);
                return;
            }
            if n.children.len() > 1 {
                for sibling in n.children[1..].iter().rev() {
                    stack.push(sibling.as_ref());
                }
            }
            match n.children.first() {
                Some(first) => n = first.as_ref(),
                // Not possible in a well-formed tree; only an empty root
                // has neither leaf nor children.
                None => return,
            }
        }
    }

    /// Positions the iterator at the smallest key greater than or equal to
    /// `key`; subsequent calls to `next` yield all such keys in ascending
    /// order.
    pub fn seek_lower_bound(&mut self, key: &[u8]) {
        // The stack is rebuilt from scratch: only a subset of each node's
        // children on the path qualifies, so lazy expansion from a start
        // node cannot be reused here.
        let mut stack = Vec::new();
        let mut n = self.start;
        self.node = None;
        let mut search = key;
        loop {
            match compare_prefix(&n.prefix, search) {
                Ordering::Greater => {
                    // This node's fragment sorts above the search key, so
                    // every key in the subtree does too. The smallest of
                    // them is the lower bound.
                    Self::push_min(&mut stack, n);
                    break;
                }
                Ordering::Less => {
                    // Everything below sorts before the search key.
                    break;
                }
                Ordering::Equal => {}
            }

            if let Some(leaf) = &n.leaf {
                if &leaf.key[..] == key {
                    stack.push(n);
                    break;
                }
            }

            search = &search[n.prefix.len()..];
            if search.is_empty() {
                // The search key ended here without an exact leaf match, so
                // the node's leaf (if any) and all children sort above it.
                Self::push_min(&mut stack, n);
                break;
            }

            let Some((idx, child)) = n.lower_bound_child(search[0]) else {
                break;
            };
            for sibling in n.children[idx + 1..].iter().rev() {
                stack.push(sibling.as_ref());
            }
            n = child;
        }
        self.stack = Some(stack);
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (&'a [u8], &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node;
        let stack = self.stack.get_or_insert_with(|| match node {
            Some(n) => vec![n],
            None => Vec::new(),
        });
        while let Some(n) = stack.pop() {
            // Push children in reverse label order so the smallest child is
            // visited next, keeping the traversal pre-order.
            for child in n.children.iter().rev() {
                stack.push(child.as_ref());
            }
            if let Some(leaf) = &n.leaf {
                return Some((&leaf.key[..], &leaf.value));
            }
        }
        None
    }
}
