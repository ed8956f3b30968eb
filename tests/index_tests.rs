//! Tests for the index tree
//!
//! These tests verify:
//! - Splits keep the tree ordered and perfectly balanced
//! - Chain heads travel with their hash through splits and removals
//! - Removed nodes go back to the free list

use std::sync::Arc;

use pmapkv::header::{self, EOF};
use pmapkv::index::{IndexDriver, IndexNode};
use pmapkv::storage::{FileBackend, Storage};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_index() -> (TempDir, IndexDriver) {
    let temp_dir = TempDir::new().unwrap();
    let backend = FileBackend::open(&temp_dir.path().join("tree.idx")).unwrap();
    let storage = Arc::new(Storage::new("tree", backend));
    header::initialize(&storage).unwrap();
    (temp_dir, IndexDriver::new(storage))
}

fn chain_of(hash: i32) -> u64 {
    10_000 + hash as u64
}

fn insert(index: &IndexDriver, hash: i32) -> IndexNode {
    let mut path = index.locate(hash).unwrap();
    assert_eq!(path.pop(), Some(EOF), "hash {} already indexed", hash);
    let node = index.insert(&mut path, hash, chain_of(hash)).unwrap();
    assert!(node.contains(hash));
    node
}

fn remove(index: &IndexDriver, hash: i32) {
    let mut path = index.locate(hash).unwrap();
    index.remove_hash(&mut path, hash).unwrap();
}

/// In-order hashes, checking chain heads and collecting leaf depths
fn walk(index: &IndexDriver, position: u64, depth: usize, hashes: &mut Vec<i32>, leaves: &mut Vec<usize>) {
    if position == EOF {
        leaves.push(depth);
        return;
    }
    let node = index.read_node(position).unwrap();
    walk(index, node.before, depth + 1, hashes, leaves);
    hashes.push(node.hash1);
    assert_eq!(node.pair1, chain_of(node.hash1));
    walk(index, node.center, depth + 1, hashes, leaves);
    if !node.is_single() {
        assert!(node.hash1 < node.hash2);
        hashes.push(node.hash2);
        assert_eq!(node.pair2, chain_of(node.hash2));
        walk(index, node.after, depth + 1, hashes, leaves);
    }
}

fn in_order(index: &IndexDriver) -> (Vec<i32>, Vec<usize>) {
    let mut hashes = Vec::new();
    let mut leaves = Vec::new();
    walk(index, index.top_position().unwrap(), 0, &mut hashes, &mut leaves);
    (hashes, leaves)
}

// =============================================================================
// Insertion Tests
// =============================================================================

#[test]
fn test_first_insert_creates_root() {
    let (_temp, index) = setup_temp_index();
    assert_eq!(index.top_position().unwrap(), EOF);

    let node = insert(&index, 46);

    assert_eq!(index.top_position().unwrap(), node.position);
    assert!(node.is_single());
    assert_eq!(node.pair1, chain_of(46));
}

#[test]
fn test_second_insert_fills_slack() {
    let (_temp, index) = setup_temp_index();
    insert(&index, 46);
    let node = insert(&index, 40);

    assert_eq!((node.hash1, node.hash2), (40, 46));
    assert_eq!((node.pair1, node.pair2), (chain_of(40), chain_of(46)));
}

#[test]
fn test_third_insert_splits_root() {
    let (_temp, index) = setup_temp_index();
    insert(&index, 46);
    insert(&index, 40);
    let placed = insert(&index, 73);

    assert_eq!(placed.hash1, 73);
    let root = index.read_node(index.top_position().unwrap()).unwrap();
    assert_eq!((root.hash1, root.hash2), (46, 46));
    assert_eq!(index.read_node(root.before).unwrap().hash1, 40);
    assert_eq!(index.read_node(root.center).unwrap().hash1, 73);
}

#[test]
fn test_split_sequence_stays_balanced() {
    let (_temp, index) = setup_temp_index();
    let keys = [46, 40, 73, 72, 22, 34, 78, 13, 48, 10];

    for (n, key) in keys.iter().enumerate() {
        insert(&index, *key);

        let mut expected = keys[..=n].to_vec();
        expected.sort();
        let (hashes, leaves) = in_order(&index);
        assert_eq!(hashes, expected);
        assert!(leaves.windows(2).all(|w| w[0] == w[1]), "unbalanced after {}", key);
    }
}

#[test]
fn test_many_random_inserts_stay_balanced() {
    let (_temp, index) = setup_temp_index();
    let mut keys: Vec<i32> = (0..2000).map(|i| i * 7 - 5000).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(3));

    for key in &keys {
        insert(&index, *key);
    }

    let (hashes, leaves) = in_order(&index);
    keys.sort();
    assert_eq!(hashes, keys);
    assert!(leaves.windows(2).all(|w| w[0] == w[1]));
    for key in &keys {
        assert!(index.find(*key).unwrap().is_some());
    }
    assert!(index.find(1).unwrap().is_none());
}

// =============================================================================
// Removal Tests
// =============================================================================

#[test]
fn test_remove_keeps_order_and_chain_heads() {
    let (_temp, index) = setup_temp_index();
    let mut keys: Vec<i32> = (0..300).collect();
    let mut rng = StdRng::seed_from_u64(11);
    keys.shuffle(&mut rng);
    for key in &keys {
        insert(&index, *key);
    }

    keys.shuffle(&mut rng);
    let (gone, kept) = keys.split_at(150);
    for key in gone {
        remove(&index, *key);
    }

    let mut expected = kept.to_vec();
    expected.sort();
    assert_eq!(in_order(&index).0, expected);
    for key in gone {
        assert!(index.find(*key).unwrap().is_none());
    }
}

#[test]
fn test_remove_everything_frees_all_nodes() {
    let (_temp, index) = setup_temp_index();
    for key in 0..100 {
        insert(&index, key);
    }
    let size = index.storage().len().unwrap();

    for key in (0..100).rev() {
        remove(&index, key);
    }
    assert_eq!(index.top_position().unwrap(), EOF);

    // Rebuilding the same tree needs no new space
    for key in 0..100 {
        insert(&index, key);
    }
    assert_eq!(index.storage().len().unwrap(), size);
}

#[test]
fn test_reinsert_after_removal() {
    let (_temp, index) = setup_temp_index();
    for key in [5, 1, 9, 3, 7] {
        insert(&index, key);
    }
    remove(&index, 5);
    remove(&index, 1);
    insert(&index, 5);
    insert(&index, 2);

    assert_eq!(in_order(&index).0, vec![2, 3, 5, 7, 9]);
}
