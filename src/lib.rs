//! An immutable radix tree keyed on byte strings.
//!
//! The tree can be treated as an ordered map. Compared to a hash map it
//! additionally offers prefix lookups, longest-prefix matching, ordered and
//! reverse-ordered iteration with seek primitives, and cheap snapshots:
//! every mutation produces a new [`Tree`] that shares all untouched nodes
//! with its predecessors, so committed trees can be read from any number of
//! threads without coordination.
//!
//! Batches of mutations go through a [`Txn`], which clones only the nodes on
//! the paths it actually writes and commits them atomically as a new root.
//! Transactions can also track which nodes they supersede and close the
//! [`Watch`] handles of those nodes at commit, letting observers block on or
//! poll for changes to a key or subtree.
//!
//! Keys are arbitrary byte strings with one caveat: storing a key that is a
//! strict prefix of another key leaves iteration order between the two
//! unspecified (lookups still work). Appending a terminator byte such as
//! `\0` to every key sidesteps this.
//!
//! ```
//! use iradix::Tree;
//!
//! let tree = Tree::new();
//! let (tree, _) = tree.insert(b"hello", 1);
//! let (tree, _) = tree.insert(b"world", 2);
//!
//! assert_eq!(tree.len(), 2);
//! assert_eq!(tree.get(b"hello"), Some(&1));
//!
//! let keys: Vec<&[u8]> = tree.root().iter().map(|(k, _)| k).collect();
//! assert_eq!(keys, vec![&b"hello"[..], &b"world"[..]]);
//! ```

pub mod bitset;
mod iter;
mod node;
mod path_iter;
mod raw_iter;
mod reverse_iter;
mod tree;
mod txn;
mod watch;

pub use iter::Iter;
pub use node::Node;
pub use path_iter::PathIter;
pub use reverse_iter::ReverseIter;
pub use tree::Tree;
pub use txn::Txn;
pub use watch::Watch;
