use std::thread;
use std::time::Duration;

use iradix::Tree;

#[test]
fn committed_update_wakes_a_blocked_watcher() {
    let (tree, _) = Tree::new().insert(b"config/limit", 10);
    let (watch, value) = tree.root().get_watch(b"config/limit");
    assert_eq!(value, Some(&10));

    let waiter = thread::spawn(move || {
        watch.wait();
    });

    let mut txn = tree.txn();
    txn.track_mutate(true);
    txn.insert(b"config/limit", 20);
    txn.commit();

    waiter.join().unwrap();
}

#[test]
fn prefix_watch_fires_for_subtree_changes_only() {
    let tree = Tree::new();
    let mut txn = tree.txn();
    txn.insert(b"svc/a/addr", 1);
    txn.insert(b"svc/b/addr", 2);
    let tree = txn.commit();

    let mut iter = tree.root().iter();
    let a_watch = iter.seek_prefix_watch(b"svc/a/");
    let mut iter = tree.root().iter();
    let b_watch = iter.seek_prefix_watch(b"svc/b/");

    let mut txn = tree.txn();
    txn.track_mutate(true);
    txn.insert(b"svc/a/port", 3);
    txn.commit();

    assert!(a_watch.wait_for(Duration::from_millis(100)));
    assert!(!b_watch.is_closed());
}

#[test]
fn notify_is_deferred_until_requested() {
    let (tree, _) = Tree::new().insert(b"key", 1);
    let (watch, _) = tree.root().get_watch(b"key");

    let mut txn = tree.txn();
    txn.track_mutate(true);
    txn.insert(b"key", 2);
    let committed = txn.commit_only();
    assert_eq!(committed.get(b"key"), Some(&2));
    assert!(!watch.is_closed());

    txn.notify();
    assert!(watch.is_closed());
}
