//! Tests for the free block chain
//!
//! These tests verify:
//! - Push appends at the tail, pop detaches the tail
//! - Freed blocks are marked deleted, recycled blocks come back cleared
//! - Each anchor uses its own block-0 field
//! - Invalid frees are rejected

use std::path::PathBuf;

use invstore::storage::{BlockHeader, BlockStore, FreeList, FreeListAnchor};
use invstore::StoreError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store(blocks: usize) -> (TempDir, BlockStore) {
    let temp_dir = TempDir::new().unwrap();
    let path: PathBuf = temp_dir.path().join("free.bs");
    let mut store = BlockStore::open(&path, 10, 42).unwrap();
    for _ in 0..blocks {
        store.create_block().unwrap();
    }
    (temp_dir, store)
}

const NEXT: FreeList = FreeList::new(FreeListAnchor::Next);
const PREV: FreeList = FreeList::new(FreeListAnchor::Prev);

// =============================================================================
// Push/Pop Tests
// =============================================================================

#[test]
fn test_empty_list() {
    let (_temp, mut store) = setup_store(3);

    assert!(NEXT.is_empty(&mut store).unwrap());
    assert_eq!(NEXT.len(&mut store).unwrap(), 0);
    assert!(NEXT.pop(&mut store).unwrap().is_none());
}

#[test]
fn test_push_appends_at_tail() {
    let (_temp, mut store) = setup_store(5);

    NEXT.push(&mut store, 2).unwrap();
    NEXT.push(&mut store, 4).unwrap();
    NEXT.push(&mut store, 1).unwrap();

    assert_eq!(NEXT.blocks(&mut store).unwrap(), vec![2, 4, 1]);
    assert_eq!(NEXT.len(&mut store).unwrap(), 3);
    assert!(!NEXT.is_empty(&mut store).unwrap());
}

#[test]
fn test_pop_takes_tail() {
    let (_temp, mut store) = setup_store(5);
    NEXT.push(&mut store, 2).unwrap();
    NEXT.push(&mut store, 4).unwrap();
    NEXT.push(&mut store, 1).unwrap();

    let popped: Vec<u16> = std::iter::from_fn(|| NEXT.pop(&mut store).unwrap())
        .map(|b| b.id())
        .collect();

    assert_eq!(popped, vec![1, 4, 2]);
    assert!(NEXT.is_empty(&mut store).unwrap());
}

#[test]
fn test_push_many_keeps_batch_order() {
    let (_temp, mut store) = setup_store(7);
    NEXT.push(&mut store, 5).unwrap();

    NEXT.push_many(&mut store, &[2, 6, 3]).unwrap();

    assert_eq!(NEXT.blocks(&mut store).unwrap(), vec![5, 2, 6, 3]);
    for id in [2, 3, 5, 6] {
        assert!(store.load_block(id).unwrap().unwrap().header.is_deleted);
    }
}

#[test]
fn test_pop_many_matches_repeated_pop() {
    let (_temp, mut store) = setup_store(7);
    NEXT.push_many(&mut store, &[1, 2, 3, 4, 5]).unwrap();

    let popped: Vec<u16> = NEXT.pop_many(&mut store, 3).unwrap().iter().map(|b| b.id()).collect();
    assert_eq!(popped, vec![5, 4, 3]);
    assert_eq!(NEXT.blocks(&mut store).unwrap(), vec![1, 2]);

    let rest: Vec<u16> = NEXT.pop_many(&mut store, 10).unwrap().iter().map(|b| b.id()).collect();
    assert_eq!(rest, vec![2, 1]);
    assert!(NEXT.is_empty(&mut store).unwrap());
    assert!(NEXT.pop_many(&mut store, 2).unwrap().is_empty());
}

#[test]
fn test_pop_many_restored_by_reversed_push_many() {
    let (_temp, mut store) = setup_store(6);
    PREV.push_many(&mut store, &[4, 1, 3]).unwrap();

    let taken: Vec<u16> = PREV.pop_many(&mut store, 2).unwrap().iter().rev().map(|b| b.id()).collect();
    PREV.push_many(&mut store, &taken).unwrap();

    assert_eq!(PREV.blocks(&mut store).unwrap(), vec![4, 1, 3]);
}

#[test]
fn test_freed_block_is_marked_deleted() {
    let (_temp, mut store) = setup_store(3);
    let mut block = store.load_block(2).unwrap().unwrap();
    block.header.record_length = 500;
    block.header.is_leaf = true;
    block.flush_header(&mut store).unwrap();

    NEXT.push(&mut store, 2).unwrap();

    let block = store.load_block(2).unwrap().unwrap();
    assert!(block.header.is_deleted);
    assert_eq!(block.header.record_length, 0);
    assert!(!block.header.is_leaf);
}

#[test]
fn test_recycled_block_header_is_cleared() {
    let (_temp, mut store) = setup_store(4);
    NEXT.push(&mut store, 3).unwrap();

    let block = NEXT.pop(&mut store).unwrap().unwrap();
    assert_eq!(block.id(), 3);
    assert_eq!(block.header, BlockHeader::default());

    let on_disk = store.load_block(3).unwrap().unwrap();
    assert_eq!(on_disk.header, BlockHeader::default());
}

// =============================================================================
// Anchor Tests
// =============================================================================

#[test]
fn test_next_anchor_uses_block_zero_next() {
    let (_temp, mut store) = setup_store(3);
    NEXT.push(&mut store, 2).unwrap();

    let root = store.load_block(0).unwrap().unwrap();
    assert_eq!(root.header.next_id, 2);
    assert_eq!(root.header.prev_id, 0);
}

#[test]
fn test_prev_anchor_leaves_block_zero_next_alone() {
    let (_temp, mut store) = setup_store(4);
    let mut root = store.load_block(0).unwrap().unwrap();
    root.header.next_id = 1;
    root.flush_header(&mut store).unwrap();

    PREV.push(&mut store, 3).unwrap();

    let root = store.load_block(0).unwrap().unwrap();
    assert_eq!(root.header.next_id, 1);
    assert_eq!(root.header.prev_id, 3);
    assert_eq!(PREV.blocks(&mut store).unwrap(), vec![3]);
    assert!(NEXT.blocks(&mut store).is_err());
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_push_sentinel_rejected() {
    let (_temp, mut store) = setup_store(2);
    let result = NEXT.push(&mut store, 0);
    assert!(matches!(result, Err(StoreError::Integrity(_))));
}

#[test]
fn test_double_free_rejected() {
    let (_temp, mut store) = setup_store(3);
    NEXT.push(&mut store, 1).unwrap();

    let result = NEXT.push(&mut store, 1);
    assert!(matches!(result, Err(StoreError::Integrity(_))));
    assert_eq!(NEXT.blocks(&mut store).unwrap(), vec![1]);
}

#[test]
fn test_push_many_rejects_bad_batch_untouched() {
    let (_temp, mut store) = setup_store(5);
    NEXT.push(&mut store, 4).unwrap();

    let repeated = NEXT.push_many(&mut store, &[1, 2, 1]);
    assert!(matches!(repeated, Err(StoreError::Integrity(_))));

    let already_free = NEXT.push_many(&mut store, &[2, 4]);
    assert!(matches!(already_free, Err(StoreError::Integrity(_))));

    assert_eq!(NEXT.blocks(&mut store).unwrap(), vec![4]);
    for id in [1, 2, 3] {
        assert!(!store.load_block(id).unwrap().unwrap().header.is_deleted);
    }
}

#[test]
fn test_push_missing_block_rejected() {
    let (_temp, mut store) = setup_store(2);
    let result = NEXT.push(&mut store, 9);
    assert!(matches!(result, Err(StoreError::Integrity(_))));
}

#[test]
fn test_chain_through_live_block_is_integrity_error() {
    let (_temp, mut store) = setup_store(3);
    let mut root = store.load_block(0).unwrap().unwrap();
    root.header.next_id = 2;
    root.flush_header(&mut store).unwrap();

    let result = NEXT.pop(&mut store);
    assert!(matches!(result, Err(StoreError::Integrity(_))));
}
