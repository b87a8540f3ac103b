//! Tests for BTree
//!
//! These tests verify:
//! - Insertion with root and child splits
//! - Lookups and upserts
//! - Deletion with borrowing, merging and root collapse
//! - Ordering/occupancy invariants under randomized workloads
//! - Root pointer persistence and free block reuse

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::PathBuf;

use invstore::btree::BTree;
use invstore::storage::{BlockStore, MAX_BLOCKS};
use invstore::{Config, StoreError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

const HEADER_SIZE: usize = 10;
/// 32 content bytes: capacity 3
const SMALL_BLOCK: usize = 42;
/// 52 content bytes: capacity 5
const MEDIUM_BLOCK: usize = 62;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_tree() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("index.bt");
    (temp_dir, path)
}

fn open_tree(path: &PathBuf, block_size: usize) -> BTree {
    BTree::open(path, HEADER_SIZE, block_size).unwrap()
}

/// Grow the file with zeroed blocks until it holds `blocks` of them
fn pad_to_blocks(path: &PathBuf, block_size: usize, blocks: u32) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_len(blocks as u64 * block_size as u64).unwrap();
}

fn keys_of(tree: &mut BTree) -> Vec<u32> {
    tree.entries().unwrap().into_iter().map(|(k, _)| k).collect()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_new_tree_layout() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, SMALL_BLOCK);

    assert_eq!(tree.capacity(), 3);
    assert_eq!(tree.min_keys(), 2);
    assert_eq!(tree.root_id(), 1);
    assert_eq!(tree.block_count(), 2);
    assert_eq!(tree.depth().unwrap(), 1);
    assert!(tree.is_empty());
    assert_eq!(tree.find(1).unwrap(), None);
    tree.verify().unwrap();
}

#[test]
fn test_open_with_config() {
    let (_temp, path) = setup_temp_tree();
    let config = Config::builder().block_size(MEDIUM_BLOCK).build();

    let tree = BTree::open_with(&path, &config).unwrap();
    assert_eq!(tree.capacity(), config.node_capacity());
    assert_eq!(tree.capacity(), 5);
}

#[test]
fn test_open_rejects_tiny_blocks() {
    let (_temp, path) = setup_temp_tree();
    // 20 content bytes hold a single key
    let result = BTree::open(&path, HEADER_SIZE, 30);
    assert!(matches!(result, Err(StoreError::Config(_))));
}

#[test]
fn test_open_rejects_invalid_root_pointer() {
    let (_temp, path) = setup_temp_tree();
    {
        let mut tree = open_tree(&path, SMALL_BLOCK);
        tree.put(1, 1).unwrap();
    }

    for bad_root in [0u16, 500] {
        {
            let mut store = BlockStore::open(&path, HEADER_SIZE, SMALL_BLOCK).unwrap();
            let mut meta = store.load_block(0).unwrap().unwrap();
            meta.header.next_id = bad_root;
            meta.flush_header(&mut store).unwrap();
        }
        let result = BTree::open(&path, HEADER_SIZE, SMALL_BLOCK);
        assert!(matches!(result, Err(StoreError::Integrity(_))));
    }
}

// =============================================================================
// Insert/Find Tests
// =============================================================================

#[test]
fn test_insert_and_find_small_capacity() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, SMALL_BLOCK);

    for key in [5u32, 3, 8, 1, 9, 2, 7] {
        tree.put(key, key * 10).unwrap();
    }

    for key in [1u32, 2, 3, 5, 7, 8, 9] {
        assert_eq!(tree.find(key).unwrap(), Some(key * 10), "key {}", key);
    }
    for key in [0u32, 4, 6, 10] {
        assert_eq!(tree.find(key).unwrap(), None, "key {}", key);
    }

    assert_eq!(keys_of(&mut tree), vec![1, 2, 3, 5, 7, 8, 9]);
    assert_eq!(tree.depth().unwrap(), 2);
    tree.verify().unwrap();
}

#[test]
fn test_delete_internal_key_scenario() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, SMALL_BLOCK);
    for key in [5u32, 3, 8, 1, 9, 2, 7] {
        tree.put(key, key * 10).unwrap();
    }

    assert!(tree.delete(5).unwrap());

    assert_eq!(tree.find(5).unwrap(), None);
    for key in [1u32, 2, 3, 7, 8, 9] {
        assert_eq!(tree.find(key).unwrap(), Some(key * 10), "key {}", key);
    }
    tree.verify().unwrap();
}

#[test]
fn test_root_split_moves_root_pointer() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, SMALL_BLOCK);

    tree.put(1, 1).unwrap();
    tree.put(2, 2).unwrap();
    tree.put(3, 3).unwrap();
    assert_eq!(tree.root_id(), 1);

    tree.put(4, 4).unwrap();
    assert_ne!(tree.root_id(), 1);
    assert_eq!(tree.depth().unwrap(), 2);

    let mut store = BlockStore::open(&path, HEADER_SIZE, SMALL_BLOCK).unwrap();
    let meta = store.load_block(0).unwrap().unwrap();
    assert_eq!(meta.header.next_id, tree.root_id());
}

#[test]
fn test_put_existing_key_replaces_value() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, SMALL_BLOCK);
    for key in 1..=20u32 {
        tree.put(key, key).unwrap();
    }

    // Both leaf and internal keys get replaced in place
    for key in 1..=20u32 {
        tree.put(key, key + 1000).unwrap();
    }

    assert_eq!(tree.len().unwrap(), 20);
    for key in 1..=20u32 {
        assert_eq!(tree.find(key).unwrap(), Some(key + 1000));
    }
    tree.verify().unwrap();
}

#[test]
fn test_ascending_and_descending_inserts() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, SMALL_BLOCK);

    for key in 0..200u32 {
        tree.put(key, key).unwrap();
    }
    for key in (200..400u32).rev() {
        tree.put(key, key).unwrap();
    }

    assert_eq!(keys_of(&mut tree), (0..400).collect::<Vec<u32>>());
    tree.verify().unwrap();
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_missing_key() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, SMALL_BLOCK);

    assert!(!tree.delete(7).unwrap());

    tree.put(7, 70).unwrap();
    assert!(!tree.delete(8).unwrap());
    assert!(tree.delete(7).unwrap());
    assert!(!tree.delete(7).unwrap());
    assert!(tree.is_empty());
}

#[test]
fn test_delete_everything_collapses_to_leaf_root() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, SMALL_BLOCK);
    for key in 1..=100u32 {
        tree.put(key, key).unwrap();
    }
    assert!(tree.depth().unwrap() > 2);

    for key in 1..=100u32 {
        assert!(tree.delete(key).unwrap(), "key {}", key);
        tree.verify().unwrap();
    }

    assert!(tree.is_empty());
    assert_eq!(tree.depth().unwrap(), 1);
    assert_eq!(tree.len().unwrap(), 0);
}

#[test]
fn test_delete_in_reverse_order() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, MEDIUM_BLOCK);
    for key in 1..=150u32 {
        tree.put(key, key).unwrap();
    }

    for key in (1..=150u32).rev() {
        assert!(tree.delete(key).unwrap());
        if key % 10 == 0 {
            tree.verify().unwrap();
            assert_eq!(keys_of(&mut tree), (1..key).collect::<Vec<u32>>());
        }
    }
    assert!(tree.is_empty());
}

#[test]
fn test_delete_every_other_key() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, SMALL_BLOCK);
    for key in 0..120u32 {
        tree.put(key, key * 2).unwrap();
    }

    for key in (0..120u32).step_by(2) {
        assert!(tree.delete(key).unwrap());
    }

    tree.verify().unwrap();
    for key in 0..120u32 {
        let expected = if key % 2 == 1 { Some(key * 2) } else { None };
        assert_eq!(tree.find(key).unwrap(), expected, "key {}", key);
    }
}

// =============================================================================
// Block Reuse Tests
// =============================================================================

#[test]
fn test_freed_nodes_are_reused() {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, SMALL_BLOCK);
    for key in 1..=60u32 {
        tree.put(key, key).unwrap();
    }
    let grown = tree.block_count();

    for key in 1..=60u32 {
        tree.delete(key).unwrap();
    }
    // Only the meta block and the root remain in use
    assert_eq!(tree.free_block_count().unwrap() as u32, grown - 2);

    for key in 1..=60u32 {
        tree.put(key, key).unwrap();
    }
    assert_eq!(tree.block_count(), grown);
    assert_eq!(tree.free_block_count().unwrap(), 0);
    tree.verify().unwrap();
}

// =============================================================================
// Full File Tests
// =============================================================================

#[test]
fn test_root_split_without_room_keeps_old_root() {
    let (_temp, path) = setup_temp_tree();
    {
        let mut tree = open_tree(&path, SMALL_BLOCK);
        for key in 1..=3u32 {
            tree.put(key, key * 10).unwrap();
        }
    }
    pad_to_blocks(&path, SMALL_BLOCK, MAX_BLOCKS - 1);

    {
        let mut tree = open_tree(&path, SMALL_BLOCK);
        let result = tree.put(4, 40);
        assert!(matches!(result, Err(StoreError::Storage(_))));

        assert_eq!(tree.root_id(), 1);
        assert_eq!(tree.block_count(), MAX_BLOCKS - 1);
        assert_eq!(tree.free_block_count().unwrap(), 0);
        assert_eq!(tree.find(2).unwrap(), Some(20));
        assert_eq!(tree.find(4).unwrap(), None);
    }

    let mut tree = open_tree(&path, SMALL_BLOCK);
    assert_eq!(tree.root_id(), 1);
    tree.verify().unwrap();
    assert_eq!(tree.entries().unwrap(), vec![(1, 10), (2, 20), (3, 30)]);
}

#[test]
fn test_puts_until_full_leave_tree_readable() {
    let (_temp, path) = setup_temp_tree();
    {
        let mut tree = open_tree(&path, SMALL_BLOCK);
        for key in 1..=3u32 {
            tree.put(key, key).unwrap();
        }
    }
    pad_to_blocks(&path, SMALL_BLOCK, MAX_BLOCKS - 4);

    let mut stored = vec![1, 2, 3];
    {
        let mut tree = open_tree(&path, SMALL_BLOCK);
        for key in 4..=100u32 {
            match tree.put(key, key) {
                Ok(()) => stored.push(key),
                Err(err) => {
                    assert!(matches!(err, StoreError::Storage(_)));
                    break;
                }
            }
        }
        assert!(stored.len() < 100);
        assert_eq!(tree.free_block_count().unwrap(), 0);
        tree.verify().unwrap();
    }

    let mut tree = open_tree(&path, SMALL_BLOCK);
    tree.verify().unwrap();
    assert_eq!(keys_of(&mut tree), stored);
    assert_eq!(tree.free_block_count().unwrap(), 0);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_preserves_entries() {
    let (_temp, path) = setup_temp_tree();
    let root_id;
    {
        let mut tree = open_tree(&path, SMALL_BLOCK);
        for key in 1..=100u32 {
            tree.put(key, key + 7).unwrap();
        }
        for key in (1..=100u32).filter(|k| k % 3 == 0) {
            tree.delete(key).unwrap();
        }
        root_id = tree.root_id();
        tree.sync().unwrap();
    }

    let mut tree = open_tree(&path, SMALL_BLOCK);
    assert_eq!(tree.root_id(), root_id);
    tree.verify().unwrap();
    for key in 1..=100u32 {
        let expected = if key % 3 == 0 { None } else { Some(key + 7) };
        assert_eq!(tree.find(key).unwrap(), expected);
    }
}

// =============================================================================
// Randomized Workload Tests
// =============================================================================

fn run_random_workload(block_size: usize, seed: u64, ops: usize, key_space: u32) {
    let (_temp, path) = setup_temp_tree();
    let mut tree = open_tree(&path, block_size);
    let mut model: BTreeMap<u32, u32> = BTreeMap::new();
    let mut rng = StdRng::seed_from_u64(seed);

    for step in 0..ops {
        let key = rng.gen_range(0..key_space);
        if rng.gen_bool(0.6) {
            let value = rng.gen::<u32>();
            tree.put(key, value).unwrap();
            model.insert(key, value);
        } else {
            let removed = tree.delete(key).unwrap();
            assert_eq!(removed, model.remove(&key).is_some(), "step {} key {}", step, key);
        }

        if step % 100 == 0 {
            tree.verify().unwrap();
        }
    }

    tree.verify().unwrap();
    let expected: Vec<(u32, u32)> = model.iter().map(|(&k, &v)| (k, v)).collect();
    assert_eq!(tree.entries().unwrap(), expected);
    for key in 0..key_space {
        assert_eq!(tree.find(key).unwrap(), model.get(&key).copied());
    }
}

#[test]
fn test_random_workload_capacity_3() {
    run_random_workload(SMALL_BLOCK, 7, 3000, 400);
}

#[test]
fn test_random_workload_capacity_5() {
    run_random_workload(MEDIUM_BLOCK, 42, 3000, 600);
}

#[test]
fn test_random_workload_default_geometry() {
    run_random_workload(Config::default().block_size, 1234, 5000, 5000);
}
