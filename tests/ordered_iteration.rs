use im::OrdMap;
use iradix::Tree;
use rand::rngs::ThreadRng;
use rand::RngCore;

#[test]
fn iteration_matches_ordered_map() {
    const N: u64 = 512;
    let mut rng = ThreadRng::default();
    let mut oracle: OrdMap<Vec<u8>, u64> = OrdMap::new();
    let tree = Tree::new();
    let mut txn = tree.txn();
    for i in 0..N {
        let mut key = [0u8; 8];
        rng.fill_bytes(&mut key);
        oracle.insert(key.to_vec(), i);
        txn.insert(&key, i);
    }
    let tree = txn.commit();

    assert_eq!(tree.len(), oracle.len());

    let forward: Vec<(Vec<u8>, u64)> = tree
        .root()
        .iter()
        .map(|(k, v)| (k.to_vec(), *v))
        .collect();
    let expected: Vec<(Vec<u8>, u64)> = oracle.iter().map(|(k, v)| (k.clone(), *v)).collect();
    assert_eq!(forward, expected);

    let backward: Vec<(Vec<u8>, u64)> = tree
        .root()
        .reverse_iter()
        .map(|(k, v)| (k.to_vec(), *v))
        .collect();
    let mut expected_backward = expected;
    expected_backward.reverse();
    assert_eq!(backward, expected_backward);
}

#[test]
fn walk_agrees_with_iter() {
    let mut rng = ThreadRng::default();
    let tree = Tree::new();
    let mut txn = tree.txn();
    for i in 0..128u64 {
        let mut key = [0u8; 8];
        rng.fill_bytes(&mut key);
        txn.insert(&key, i);
    }
    let tree = txn.commit();

    let mut walked = Vec::new();
    tree.root().walk(|k, v| {
        walked.push((k.to_vec(), *v));
        false
    });
    let iterated: Vec<(Vec<u8>, u64)> = tree
        .root()
        .iter()
        .map(|(k, v)| (k.to_vec(), *v))
        .collect();
    assert_eq!(walked, iterated);
}
