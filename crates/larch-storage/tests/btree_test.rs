//! B+ tree integration tests.
//!
//! Runs the index through the full page store (buffer pool + disk) with
//! deliberately small node sizes so splits, merges, redistribution and
//! root adjustment all trigger. A structural checker verifies the tree
//! invariants after every interesting state: key ordering within nodes,
//! separator bounds, size bounds, parent back-pointers, uniform leaf
//! depth, and the leaf chain yielding all keys in ascending order.

use larch_common::config::{IndexConfig, StorageConfig};
use larch_common::page::PageId;
use larch_common::types::RecordId;
use larch_storage::btree::node_kind;
use larch_storage::{BPlusTree, IndexKey, Int64Comparator, InternalNode, LeafNode, NodeKind, PageStore};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tempfile::tempdir;

const TEST_CONFIG: IndexConfig = IndexConfig {
    leaf_max_size: 4,
    internal_max_size: 4,
};

fn open_store(dir: &tempfile::TempDir, frames: usize) -> Arc<PageStore> {
    Arc::new(
        PageStore::open(&StorageConfig {
            data_path: dir.path().join("larch.db"),
            buffer_pool_frames: frames,
            fsync_enabled: false,
        })
        .unwrap(),
    )
}

fn open_tree(store: &Arc<PageStore>, name: &str) -> BPlusTree {
    BPlusTree::new(name, Arc::clone(store), Int64Comparator, TEST_CONFIG).unwrap()
}

fn key(v: i64) -> IndexKey {
    IndexKey::from_i64(v)
}

fn rid(v: i64) -> RecordId {
    RecordId::from_u64(v as u64)
}

fn insert(tree: &BPlusTree, v: i64) -> bool {
    tree.insert(&key(v), rid(v)).unwrap()
}

fn remove(tree: &BPlusTree, v: i64) {
    tree.remove(&key(v)).unwrap()
}

fn get(tree: &BPlusTree, v: i64) -> Option<RecordId> {
    tree.get(&key(v)).unwrap()
}

fn collect_keys(tree: &BPlusTree) -> Vec<i64> {
    tree.iter()
        .unwrap()
        .map(|item| item.unwrap().0.to_i64())
        .collect()
}

/// Walks the whole tree verifying structural invariants; returns all keys
/// in ascending order.
fn check_invariants(tree: &BPlusTree, store: &PageStore) -> Vec<i64> {
    let root_id = tree.get_root_page_id();
    if !root_id.is_valid() {
        assert!(tree.is_empty());
        return Vec::new();
    }

    let mut leaves = Vec::new();
    check_node(store, root_id, PageId::INVALID, None, None, true, &mut leaves);

    // The leaf chain must enumerate exactly the in-order leaves.
    let mut chained = Vec::new();
    let mut keys = Vec::new();
    let mut next = leaves[0];
    while next.is_valid() {
        chained.push(next);
        let guard = store.fetch_page_read(next).unwrap();
        let leaf = LeafNode::new(&guard.data()[..]);
        for i in 0..leaf.size() {
            keys.push(leaf.key_at(i).to_i64());
        }
        next = leaf.next_leaf_id();
    }
    assert_eq!(chained, leaves, "leaf chain disagrees with in-order leaves");
    assert!(
        keys.windows(2).all(|w| w[0] < w[1]),
        "leaf chain keys not strictly increasing: {keys:?}"
    );
    keys
}

/// Recursive structural check. `lower` is an inclusive bound, `upper`
/// exclusive, matching separator semantics. Returns the subtree height.
#[allow(clippy::too_many_arguments)]
fn check_node(
    store: &PageStore,
    page_id: PageId,
    expected_parent: PageId,
    lower: Option<i64>,
    upper: Option<i64>,
    is_root: bool,
    leaves: &mut Vec<PageId>,
) -> usize {
    let guard = store.fetch_page_read(page_id).unwrap();
    let data = &guard.data()[..];

    match node_kind(data).expect("page without a node tag") {
        NodeKind::Leaf => {
            let leaf = LeafNode::new(data);
            assert_eq!(leaf.page_id(), page_id);
            assert_eq!(leaf.parent_id(), expected_parent);
            assert!(leaf.size() <= leaf.max_size());
            if !is_root {
                assert!(
                    leaf.size() >= leaf.min_size(),
                    "leaf {page_id} under min size"
                );
            }
            for i in 0..leaf.size() {
                let k = leaf.key_at(i).to_i64();
                if i > 0 {
                    assert!(leaf.key_at(i - 1).to_i64() < k);
                }
                if let Some(lo) = lower {
                    assert!(k >= lo, "leaf {page_id}: key {k} below bound {lo}");
                }
                if let Some(hi) = upper {
                    assert!(k < hi, "leaf {page_id}: key {k} not below bound {hi}");
                }
            }
            leaves.push(page_id);
            1
        }
        NodeKind::Internal => {
            let node = InternalNode::new(data);
            assert_eq!(node.page_id(), page_id);
            assert_eq!(node.parent_id(), expected_parent);
            assert!(node.size() >= 2, "internal {page_id} has fewer than 2 children");
            assert!(node.size() <= node.max_size());
            if !is_root {
                assert!(node.size() >= node.min_size());
            }

            let mut height = None;
            for i in 0..node.size() {
                if i > 1 {
                    assert!(node.key_at(i - 1).to_i64() < node.key_at(i).to_i64());
                }
                let child_lower = if i == 0 {
                    lower
                } else {
                    Some(node.key_at(i).to_i64())
                };
                let child_upper = if i + 1 < node.size() {
                    Some(node.key_at(i + 1).to_i64())
                } else {
                    upper
                };
                assert_eq!(
                    node.index_of_child(node.child_at(i)),
                    Some(i),
                    "duplicate child pointer in internal {page_id}"
                );
                let child_height = check_node(
                    store,
                    node.child_at(i),
                    page_id,
                    child_lower,
                    child_upper,
                    false,
                    leaves,
                );
                match height {
                    None => height = Some(child_height),
                    Some(h) => assert_eq!(h, child_height, "leaves at unequal depth"),
                }
            }
            height.unwrap() + 1
        }
    }
}

// ---------------------------------------------------------------------
// Point operations and the concrete small-tree scenarios
// ---------------------------------------------------------------------

#[test]
fn test_empty_tree() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    assert!(tree.is_empty());
    assert_eq!(tree.get_root_page_id(), PageId::INVALID);
    assert_eq!(get(&tree, 5), None);
    assert_eq!(collect_keys(&tree), Vec::<i64>::new());
}

#[test]
fn test_single_insert_and_get() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    assert!(insert(&tree, 5));
    assert!(!tree.is_empty());
    assert_eq!(get(&tree, 5), Some(rid(5)));
    assert_eq!(get(&tree, 4), None);
    check_invariants(&tree, &store);
}

#[test]
fn test_sequential_inserts_split_leaf() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    for v in 1..=5 {
        assert!(insert(&tree, v));
    }

    assert_eq!(collect_keys(&tree), vec![1, 2, 3, 4, 5]);
    let keys = check_invariants(&tree, &store);
    assert_eq!(keys, vec![1, 2, 3, 4, 5]);

    // The root must have grown into an internal node with separator 3
    // over two linked leaves [1,2] -> [3,4,5].
    let root_id = tree.get_root_page_id();
    let root_guard = store.fetch_page_read(root_id).unwrap();
    assert_eq!(node_kind(&root_guard.data()[..]), Some(NodeKind::Internal));
    let root = InternalNode::new(&root_guard.data()[..]);
    assert_eq!(root.size(), 2);
    assert_eq!(root.key_at(1).to_i64(), 3);

    let left_guard = store.fetch_page_read(root.child_at(0)).unwrap();
    let left = LeafNode::new(&left_guard.data()[..]);
    assert_eq!((0..left.size()).map(|i| left.key_at(i).to_i64()).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(left.next_leaf_id(), root.child_at(1));

    let right_guard = store.fetch_page_read(root.child_at(1)).unwrap();
    let right = LeafNode::new(&right_guard.data()[..]);
    assert_eq!(
        (0..right.size()).map(|i| right.key_at(i).to_i64()).collect::<Vec<_>>(),
        vec![3, 4, 5]
    );
    assert_eq!(right.next_leaf_id(), PageId::INVALID);
}

#[test]
fn test_duplicate_insert_rejected() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    for v in [3, 1, 4] {
        assert!(insert(&tree, v));
    }
    // Second insert of 1 fails and must not clobber the stored value
    assert!(!tree.insert(&key(1), rid(999)).unwrap());
    assert_eq!(get(&tree, 1), Some(rid(1)));

    for v in [5, 9, 2, 6] {
        assert!(insert(&tree, v));
    }
    assert_eq!(collect_keys(&tree), vec![1, 2, 3, 4, 5, 6, 9]);
    check_invariants(&tree, &store);
}

#[test]
fn test_remove_middle_key() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    for v in 1..=10 {
        insert(&tree, v);
    }
    remove(&tree, 5);

    assert_eq!(get(&tree, 5), None);
    assert_eq!(collect_keys(&tree), vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);
    check_invariants(&tree, &store);
}

#[test]
fn test_remove_down_to_single_leaf() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    for v in 1..=10 {
        insert(&tree, v);
    }
    for v in 1..=9 {
        remove(&tree, v);
        check_invariants(&tree, &store);
    }

    // The tree collapsed back to a single root leaf holding [10]
    let root_id = tree.get_root_page_id();
    let guard = store.fetch_page_read(root_id).unwrap();
    assert_eq!(node_kind(&guard.data()[..]), Some(NodeKind::Leaf));
    let leaf = LeafNode::new(&guard.data()[..]);
    assert_eq!(leaf.size(), 1);
    assert_eq!(leaf.key_at(0).to_i64(), 10);
    assert_eq!(get(&tree, 10), Some(rid(10)));
}

#[test]
fn test_remove_all_empties_tree() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    for v in 1..=10 {
        insert(&tree, v);
    }
    for v in 1..=10 {
        remove(&tree, v);
    }

    assert!(tree.is_empty());
    assert_eq!(tree.get_root_page_id(), PageId::INVALID);
    assert_eq!(tree.iter().unwrap().count(), 0);

    // The emptied tree accepts new keys again
    assert!(insert(&tree, 42));
    assert_eq!(get(&tree, 42), Some(rid(42)));
}

#[test]
fn test_remove_absent_key_is_noop() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    remove(&tree, 7); // empty tree

    for v in 1..=8 {
        insert(&tree, v);
    }
    remove(&tree, 100);
    remove(&tree, 4);
    remove(&tree, 4); // second removal of the same key

    assert_eq!(collect_keys(&tree), vec![1, 2, 3, 5, 6, 7, 8]);
    check_invariants(&tree, &store);
}

// ---------------------------------------------------------------------
// Larger workloads
// ---------------------------------------------------------------------

#[test]
fn test_random_insert_then_get() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 256);
    let tree = open_tree(&store, "t");

    let mut values: Vec<i64> = (0..500).collect();
    values.shuffle(&mut rand::rng());

    for &v in &values {
        assert!(insert(&tree, v));
    }

    let keys = check_invariants(&tree, &store);
    assert_eq!(keys, (0..500).collect::<Vec<_>>());
    for v in 0..500 {
        assert_eq!(get(&tree, v), Some(rid(v)));
    }
}

#[test]
fn test_random_removals() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 256);
    let tree = open_tree(&store, "t");

    let mut values: Vec<i64> = (0..400).collect();
    values.shuffle(&mut rand::rng());
    for &v in &values {
        insert(&tree, v);
    }

    let (gone, kept): (Vec<i64>, Vec<i64>) = values.iter().copied().partition(|&v| v % 2 == 0);
    for &v in &gone {
        remove(&tree, v);
    }

    let keys = check_invariants(&tree, &store);
    let mut expected: Vec<i64> = kept;
    expected.sort_unstable();
    assert_eq!(keys, expected);
    for &v in &gone {
        assert_eq!(get(&tree, v), None);
    }
}

#[test]
fn test_reverse_insertion_order() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 256);
    let tree = open_tree(&store, "t");

    for v in (0..200).rev() {
        assert!(insert(&tree, v));
    }
    let keys = check_invariants(&tree, &store);
    assert_eq!(keys, (0..200).collect::<Vec<_>>());
}

#[test]
fn test_eviction_pressure_round_trips_pages() {
    let dir = tempdir().unwrap();
    // A pool far smaller than the tree forces pages through disk, while
    // still covering the latches and fresh pages of a full split cascade
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    for v in 0..300 {
        assert!(insert(&tree, v));
    }
    for v in 0..300 {
        assert_eq!(get(&tree, v), Some(rid(v)));
    }
    let keys = check_invariants(&tree, &store);
    assert_eq!(keys.len(), 300);
}

// ---------------------------------------------------------------------
// Iterators
// ---------------------------------------------------------------------

#[test]
fn test_iterator_crosses_leaf_boundaries() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 256);
    let tree = open_tree(&store, "t");

    for v in 0..100 {
        insert(&tree, v * 2);
    }

    let items: Vec<(i64, RecordId)> = tree
        .iter()
        .unwrap()
        .map(|item| {
            let (k, r) = item.unwrap();
            (k.to_i64(), r)
        })
        .collect();

    assert_eq!(items.len(), 100);
    for (i, (k, r)) in items.iter().enumerate() {
        assert_eq!(*k, i as i64 * 2);
        assert_eq!(*r, rid(i as i64 * 2));
    }
}

#[test]
fn test_iter_from_starts_at_lower_bound() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 256);
    let tree = open_tree(&store, "t");

    for v in 0..50 {
        insert(&tree, v * 3); // 0, 3, 6, ..., 147
    }

    // Exact match
    let first = tree.iter_from(&key(30)).unwrap().next().unwrap().unwrap();
    assert_eq!(first.0.to_i64(), 30);

    // Absent key: starts at the smallest key >= 31
    let first = tree.iter_from(&key(31)).unwrap().next().unwrap().unwrap();
    assert_eq!(first.0.to_i64(), 33);

    // Before the smallest key
    let first = tree.iter_from(&key(-5)).unwrap().next().unwrap().unwrap();
    assert_eq!(first.0.to_i64(), 0);

    // Beyond the largest key: empty scan
    assert_eq!(tree.iter_from(&key(1000)).unwrap().count(), 0);

    // Tail scan sees every remaining key
    let tail: Vec<i64> = tree
        .iter_from(&key(100)).unwrap()
        .map(|item| item.unwrap().0.to_i64())
        .collect();
    assert_eq!(tail, (34..50).map(|v| v * 3).collect::<Vec<_>>());
}

// ---------------------------------------------------------------------
// File helpers, debug output, header page
// ---------------------------------------------------------------------

#[test]
fn test_insert_and_remove_from_file() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    let insert_path = dir.path().join("insert.txt");
    std::fs::write(&insert_path, "1\n5\n3\n2\n4\n").unwrap();
    tree.insert_from_file(&insert_path).unwrap();
    assert_eq!(collect_keys(&tree), vec![1, 2, 3, 4, 5]);

    let remove_path = dir.path().join("remove.txt");
    std::fs::write(&remove_path, "2\n4\n").unwrap();
    tree.remove_from_file(&remove_path).unwrap();
    assert_eq!(collect_keys(&tree), vec![1, 3, 5]);
}

#[test]
fn test_ill_formed_line_terminates_file_load() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    let path = dir.path().join("insert.txt");
    std::fs::write(&path, "1\n2\nnot-a-number\n3\n").unwrap();
    tree.insert_from_file(&path).unwrap();

    // Loading stops at the bad line; 3 is never inserted
    assert_eq!(collect_keys(&tree), vec![1, 2]);
}

#[test]
fn test_draw_and_dump() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);
    let tree = open_tree(&store, "t");

    // Drawing an empty tree writes nothing
    let dot_path = dir.path().join("tree.dot");
    tree.draw(&dot_path).unwrap();
    assert!(!dot_path.exists());

    for v in 1..=9 {
        insert(&tree, v);
    }

    tree.draw(&dot_path).unwrap();
    let dot = std::fs::read_to_string(&dot_path).unwrap();
    assert!(dot.starts_with("digraph G {"));
    assert!(dot.contains("LEAF_"));
    assert!(dot.contains("INT_"));

    let text = tree.dump().unwrap();
    assert!(text.contains("Internal"));
    assert!(text.contains("Leaf"));
    for v in 1..=9 {
        assert!(text.contains(&format!(" {v}")));
    }
    tree.print().unwrap();
}

#[test]
fn test_two_indexes_share_one_store() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 256);
    let a = open_tree(&store, "index_a");
    let b = open_tree(&store, "index_b");

    for v in 0..50 {
        insert(&a, v);
        insert(&b, v + 1000);
    }

    assert_ne!(a.get_root_page_id(), b.get_root_page_id());
    assert_eq!(get(&a, 10), Some(rid(10)));
    assert_eq!(get(&a, 1010), None);
    assert_eq!(get(&b, 1010), Some(rid(1010)));
    check_invariants(&a, &store);
    check_invariants(&b, &store);
}

#[test]
fn test_root_registered_in_header_page() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 64);

    let root_id = {
        let tree = open_tree(&store, "t");
        for v in 1..=20 {
            insert(&tree, v);
        }
        tree.get_root_page_id()
    };

    // A new tree handle on the same name picks up the recorded root
    let reopened = open_tree(&store, "t");
    assert_eq!(reopened.get_root_page_id(), root_id);
    assert_eq!(get(&reopened, 13), Some(rid(13)));
    assert_eq!(collect_keys(&reopened), (1..=20).collect::<Vec<_>>());
}

// ---------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------

#[test]
fn test_concurrent_readers_with_writer() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 512);
    let tree = Arc::new(open_tree(&store, "t"));

    // Pre-populate a stable key range that is never removed
    for v in 0..200 {
        insert(&tree, v);
    }

    let writer = {
        let tree = Arc::clone(&tree);
        std::thread::spawn(move || {
            for v in 200..600 {
                assert!(tree.insert(&key(v), rid(v)).unwrap());
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let tree = Arc::clone(&tree);
            std::thread::spawn(move || {
                for round in 0..50 {
                    for v in 0..200 {
                        // Stable keys must never go missing mid-write
                        assert_eq!(
                            tree.get(&key(v)).unwrap(),
                            Some(rid(v)),
                            "round {round}: stable key {v} vanished"
                        );
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let keys = check_invariants(&tree, &store);
    assert_eq!(keys, (0..600).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_disjoint_ranges() {
    const THREADS: i64 = 4;
    const PER_THREAD: i64 = 200;

    let dir = tempdir().unwrap();
    let store = open_store(&dir, 512);
    let tree = Arc::new(open_tree(&store, "t"));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            std::thread::spawn(move || {
                let base = t * PER_THREAD;
                for v in base..base + PER_THREAD {
                    assert!(tree.insert(&key(v), rid(v)).unwrap());
                }
                // Remove the odd keys of this thread's own range
                for v in base..base + PER_THREAD {
                    if v % 2 == 1 {
                        tree.remove(&key(v)).unwrap();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    // Exactly the even keys of every range survive
    let keys = check_invariants(&tree, &store);
    let expected: Vec<i64> = (0..THREADS * PER_THREAD).filter(|v| v % 2 == 0).collect();
    assert_eq!(keys, expected);
    for v in 0..THREADS * PER_THREAD {
        let expected = if v % 2 == 0 { Some(rid(v)) } else { None };
        assert_eq!(tree.get(&key(v)).unwrap(), expected);
    }
}

#[test]
fn test_concurrent_interleaved_scans() {
    let dir = tempdir().unwrap();
    let store = open_store(&dir, 512);
    let tree = Arc::new(open_tree(&store, "t"));

    for v in 0..300 {
        insert(&tree, v * 2);
    }

    let writer = {
        let tree = Arc::clone(&tree);
        std::thread::spawn(move || {
            // Insert odd keys between the existing even ones
            for v in 0..300 {
                assert!(tree.insert(&key(v * 2 + 1), rid(v * 2 + 1)).unwrap());
            }
        })
    };

    let scanner = {
        let tree = Arc::clone(&tree);
        std::thread::spawn(move || {
            for _ in 0..20 {
                let keys: Vec<i64> = tree
                    .iter()
                    .unwrap()
                    .map(|item| item.unwrap().0.to_i64())
                    .collect();
                // Snapshots are always sorted and contain every stable key
                assert!(keys.windows(2).all(|w| w[0] < w[1]));
                let evens = keys.iter().filter(|k| *k % 2 == 0).count();
                assert_eq!(evens, 300);
            }
        })
    };

    writer.join().unwrap();
    scanner.join().unwrap();

    let keys = check_invariants(&tree, &store);
    assert_eq!(keys, (0..600).collect::<Vec<_>>());
}
