//! Tests for full-scan iteration
//!
//! These tests verify:
//! - Every pair is visited exactly once, in hash order
//! - Completeness for ascending, descending and random insertion orders
//! - Fail-fast behavior after a mutation

use pmapkv::{Config, HashCode, PairFormat, PmapError, Store};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_store() -> (TempDir, Store<i32, i32>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .directory(temp_dir.path(), "iter")
        .pair_format(PairFormat::Partitioned)
        .build();
    let store = Store::open(config).unwrap();
    (temp_dir, store)
}

fn collect(store: &Store<i32, i32>) -> Vec<(i32, i32)> {
    store.iter().map(|entry| entry.unwrap()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Mod10(i32);

impl HashCode for Mod10 {
    fn hash_code(&self) -> i32 {
        self.0 % 10
    }
}

// =============================================================================
// Completeness Tests
// =============================================================================

#[test]
fn test_scan_ascending_inserts() {
    let (_temp, store) = setup_temp_store();
    for i in 0..1000 {
        store.put(i, i * 2).unwrap();
    }

    let expected: Vec<(i32, i32)> = (0..1000).map(|i| (i, i * 2)).collect();
    assert_eq!(collect(&store), expected);
}

#[test]
fn test_scan_descending_inserts() {
    let (_temp, store) = setup_temp_store();
    for i in (0..1000).rev() {
        store.put(i, -i).unwrap();
    }

    let expected: Vec<(i32, i32)> = (0..1000).map(|i| (i, -i)).collect();
    assert_eq!(collect(&store), expected);
}

#[test]
fn test_scan_random_inserts() {
    let (_temp, store) = setup_temp_store();
    let mut keys: Vec<i32> = (-500..500).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(7));

    for key in &keys {
        store.put(*key, key.wrapping_mul(31)).unwrap();
    }

    let expected: Vec<(i32, i32)> = (-500..500).map(|k: i32| (k, k.wrapping_mul(31))).collect();
    assert_eq!(collect(&store), expected);
}

#[test]
fn test_scan_after_removals() {
    let (_temp, store) = setup_temp_store();
    let mut keys: Vec<i32> = (0..400).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(99));

    for key in &keys {
        store.put(*key, *key).unwrap();
    }
    for key in keys.iter().filter(|k| *k % 2 == 1) {
        store.remove(key).unwrap();
    }

    let expected: Vec<(i32, i32)> = (0..400).filter(|k| k % 2 == 0).map(|k| (k, k)).collect();
    assert_eq!(collect(&store), expected);
}

#[test]
fn test_scan_visits_whole_chains() {
    let temp = TempDir::new().unwrap();
    let store: Store<Mod10, i32> = Store::open_path(temp.path().join("chains.bin")).unwrap();

    for i in 0..100 {
        store.put(Mod10(i), i).unwrap();
    }

    let mut seen: Vec<i32> = store.values().map(|v| v.unwrap()).collect();
    assert_eq!(seen.len(), 100);
    seen.sort();
    assert_eq!(seen, (0..100).collect::<Vec<_>>());

    // Hash order first: every bucket is contiguous
    let buckets: Vec<i32> = store.keys().map(|k| k.unwrap().0 % 10).collect();
    let mut sorted = buckets.clone();
    sorted.sort();
    assert_eq!(buckets, sorted);
}

#[test]
fn test_keys_and_values_views() {
    let (_temp, store) = setup_temp_store();
    store.put(3, 30).unwrap();
    store.put(1, 10).unwrap();
    store.put(2, 20).unwrap();

    let keys: Vec<i32> = store.keys().map(|k| k.unwrap()).collect();
    let values: Vec<i32> = store.values().map(|v| v.unwrap()).collect();
    assert_eq!(keys, vec![1, 2, 3]);
    assert_eq!(values, vec![10, 20, 30]);
}

// =============================================================================
// Fail-Fast Tests
// =============================================================================

#[test]
fn test_put_invalidates_iterator() {
    let (_temp, store) = setup_temp_store();
    for i in 0..10 {
        store.put(i, i).unwrap();
    }

    let mut iter = store.iter();
    assert_eq!(iter.next().unwrap().unwrap(), (0, 0));

    store.put(100, 100).unwrap();

    assert!(matches!(
        iter.next(),
        Some(Err(PmapError::ConcurrentModification))
    ));
    assert!(iter.next().is_none());
}

#[test]
fn test_update_and_remove_invalidate_iterator() {
    let (_temp, store) = setup_temp_store();
    store.put(1, 1).unwrap();
    store.put(2, 2).unwrap();

    let mut iter = store.iter();
    store.put(1, 11).unwrap();
    assert!(matches!(iter.next(), Some(Err(PmapError::ConcurrentModification))));

    let mut iter = store.iter();
    store.remove(&2).unwrap();
    assert!(matches!(iter.next(), Some(Err(PmapError::ConcurrentModification))));

    let mut iter = store.iter();
    store.clear().unwrap();
    assert!(matches!(iter.next(), Some(Err(PmapError::ConcurrentModification))));
}

#[test]
fn test_reads_do_not_invalidate_iterator() {
    let (_temp, store) = setup_temp_store();
    for i in 0..5 {
        store.put(i, i).unwrap();
    }

    let mut iter = store.iter();
    assert_eq!(iter.next().unwrap().unwrap(), (0, 0));
    assert_eq!(store.get(&3).unwrap(), Some(3));
    assert_eq!(store.remove(&42).unwrap(), None);
    assert_eq!(iter.count(), 4);
}
