//! Integration tests for the B+Tree index

use std::sync::Arc;

use quarry::buffer::BufferPoolManager;
use quarry::common::{PageId, RecordId, SlotId};
use quarry::index::{BPlusTree, IntegerComparator};
use quarry::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn key(k: u32) -> [u8; 4] {
    k.to_le_bytes()
}

fn rid(k: u32) -> RecordId {
    RecordId::new(PageId::new(k), SlotId::new((k % 100) as u16))
}

fn create_tree(
    leaf_max: usize,
    internal_max: usize,
) -> (
    BPlusTree<IntegerComparator>,
    Arc<BufferPoolManager>,
    NamedTempFile,
) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(32, 2, dm));
    let tree = BPlusTree::new(
        "test_index",
        Arc::clone(&bpm),
        IntegerComparator,
        4,
        leaf_max,
        internal_max,
    )
    .unwrap();
    (tree, bpm, temp_file)
}

fn collect_keys(tree: &BPlusTree<IntegerComparator>) -> Vec<u32> {
    tree.begin()
        .unwrap()
        .map(|entry| {
            let (k, _) = entry.unwrap();
            u32::from_le_bytes(k[..4].try_into().unwrap())
        })
        .collect()
}

#[test]
fn test_btree_empty() {
    let (tree, _bpm, _temp) = create_tree(4, 4);

    assert!(tree.is_empty());
    assert_eq!(tree.get_value(&key(1)).unwrap(), None);
    assert!(tree.begin().unwrap().is_end());
    assert!(collect_keys(&tree).is_empty());
}

#[test]
fn test_btree_insert_and_get() {
    let (mut tree, _bpm, _temp) = create_tree(8, 8);

    for k in [10u32, 20, 30] {
        assert!(tree.insert(&key(k), rid(k)).unwrap());
    }
    assert!(!tree.is_empty());

    assert_eq!(tree.get_value(&key(10)).unwrap(), Some(rid(10)));
    assert_eq!(tree.get_value(&key(20)).unwrap(), Some(rid(20)));
    assert_eq!(tree.get_value(&key(30)).unwrap(), Some(rid(30)));
    assert_eq!(tree.get_value(&key(15)).unwrap(), None);
}

#[test]
fn test_btree_duplicate_insert_rejected() {
    let (mut tree, _bpm, _temp) = create_tree(4, 4);

    assert!(tree.insert(&key(7), rid(7)).unwrap());
    assert!(!tree.insert(&key(7), rid(99)).unwrap());

    // The original value survives
    assert_eq!(tree.get_value(&key(7)).unwrap(), Some(rid(7)));
}

#[test]
fn test_btree_split_cascade_ascending() {
    // Tiny fanout so ten inserts split leaves and internal pages
    let (mut tree, _bpm, _temp) = create_tree(3, 3);

    let root_before = tree.root_page_id();
    for k in 1..=10u32 {
        assert!(tree.insert(&key(k), rid(k)).unwrap(), "insert {}", k);
    }
    // The root must have moved as the tree grew taller
    assert_ne!(tree.root_page_id(), root_before);

    for k in 1..=10u32 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "get {}", k);
    }
    assert_eq!(tree.get_value(&key(11)).unwrap(), None);

    // Scenario: full forward scan sees 1..=10 in order
    assert_eq!(collect_keys(&tree), (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_btree_split_cascade_descending() {
    let (mut tree, _bpm, _temp) = create_tree(3, 3);

    for k in (1..=10u32).rev() {
        assert!(tree.insert(&key(k), rid(k)).unwrap(), "insert {}", k);
    }
    for k in 1..=10u32 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "get {}", k);
    }
    assert_eq!(collect_keys(&tree), (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_btree_delete_coalesce() {
    let (mut tree, _bpm, _temp) = create_tree(3, 3);

    for k in 1..=10u32 {
        tree.insert(&key(k), rid(k)).unwrap();
    }
    let root_grown = tree.root_page_id();

    // Deleting from the top coalesces leaves and internal pages and
    // shrinks the tree height
    for k in [10u32, 9, 8, 7] {
        tree.remove(&key(k)).unwrap();
    }
    assert_ne!(tree.root_page_id(), root_grown);

    for k in 1..=6u32 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "get {}", k);
    }
    for k in 7..=10u32 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), None, "stale {}", k);
    }

    // The leaf chain stays ordered and complete
    assert_eq!(collect_keys(&tree), (1..=6).collect::<Vec<_>>());
}

#[test]
fn test_btree_delete_redistributes_from_sibling() {
    // leaf_max 4: leaves hold up to 3 records, min fill 2
    let (mut tree, _bpm, _temp) = create_tree(4, 4);

    for k in 1..=5u32 {
        tree.insert(&key(k), rid(k)).unwrap();
    }
    // Leaves now split as {1,2} | {3,4,5}; deleting 1 underflows the
    // left leaf, which borrows 3 from its right sibling and updates the
    // parent separator
    tree.remove(&key(1)).unwrap();

    for k in 2..=5u32 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "get {}", k);
    }
    assert_eq!(tree.get_value(&key(1)).unwrap(), None);
    assert_eq!(collect_keys(&tree), vec![2, 3, 4, 5]);
}

#[test]
fn test_btree_delete_to_empty_and_reinsert() {
    let (mut tree, _bpm, _temp) = create_tree(3, 3);

    for k in 1..=5u32 {
        tree.insert(&key(k), rid(k)).unwrap();
    }
    for k in 1..=5u32 {
        tree.remove(&key(k)).unwrap();
    }

    assert!(tree.is_empty());
    for k in 1..=5u32 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), None);
    }
    assert!(tree.begin().unwrap().is_end());

    // The index is usable again after emptying
    for k in [4u32, 2, 6] {
        assert!(tree.insert(&key(k), rid(k)).unwrap());
    }
    assert_eq!(collect_keys(&tree), vec![2, 4, 6]);
}

#[test]
fn test_btree_remove_missing_key_is_noop() {
    let (mut tree, _bpm, _temp) = create_tree(4, 4);

    for k in [1u32, 2, 3] {
        tree.insert(&key(k), rid(k)).unwrap();
    }
    tree.remove(&key(42)).unwrap();

    assert_eq!(collect_keys(&tree), vec![1, 2, 3]);
}

#[test]
fn test_btree_iterator_from_key() {
    let (mut tree, _bpm, _temp) = create_tree(3, 3);

    for k in 1..=10u32 {
        tree.insert(&key(k), rid(k)).unwrap();
    }

    let keys: Vec<u32> = tree
        .begin_at(&key(5))
        .unwrap()
        .map(|entry| {
            let (k, _) = entry.unwrap();
            u32::from_le_bytes(k[..4].try_into().unwrap())
        })
        .collect();
    assert_eq!(keys, (5..=10).collect::<Vec<_>>());

    // Positioning past the largest key yields an exhausted iterator
    let mut iter = tree.begin_at(&key(11)).unwrap();
    assert_eq!(iter.next_entry().unwrap(), None);
}

#[test]
fn test_btree_mixed_workload() {
    let (mut tree, _bpm, _temp) = create_tree(4, 4);

    // Insert 0..50 in a scrambled but deterministic order
    let keys: Vec<u32> = (0..50u32).map(|i| (i * 7) % 50).collect();
    for &k in &keys {
        assert!(tree.insert(&key(k), rid(k)).unwrap(), "insert {}", k);
    }

    for k in 0..50u32 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "get {}", k);
    }

    // Delete every third key
    for k in (0..50u32).step_by(3) {
        tree.remove(&key(k)).unwrap();
    }

    let mut expected = Vec::new();
    for k in 0..50u32 {
        if k % 3 == 0 {
            assert_eq!(tree.get_value(&key(k)).unwrap(), None, "stale {}", k);
        } else {
            assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "get {}", k);
            expected.push(k);
        }
    }
    assert_eq!(collect_keys(&tree), expected);
}

#[test]
fn test_btree_reopen_from_header_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(32, 2, dm));
        let mut tree = BPlusTree::new(
            "orders_pk",
            Arc::clone(&bpm),
            IntegerComparator,
            4,
            4,
            4,
        )
        .unwrap();

        for k in 1..=20u32 {
            tree.insert(&key(k), rid(k)).unwrap();
        }
        bpm.flush_all_pages().unwrap();
    }

    let dm = Arc::new(DiskManager::new(&path).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(32, 2, dm));
    let tree = BPlusTree::new(
        "orders_pk",
        Arc::clone(&bpm),
        IntegerComparator,
        4,
        4,
        4,
    )
    .unwrap();

    assert!(!tree.is_empty());
    for k in 1..=20u32 {
        assert_eq!(tree.get_value(&key(k)).unwrap(), Some(rid(k)), "get {}", k);
    }
    assert_eq!(collect_keys(&tree), (1..=20).collect::<Vec<_>>());
}
