//! Tests for space reuse
//!
//! These tests verify:
//! - Partitioned pairs and freed index nodes are recycled
//! - Append-only pairs always grow the files
//! - Replacing a value leaves the old partitioned record in place
//! - Reused space survives a reopen

use pmapkv::pair::{BLOCK_HEADER_SIZE, PAIR_HEADER_SIZE};
use pmapkv::{Config, PairFormat, Store};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open(temp: &TempDir, format: PairFormat) -> Store<u32, String> {
    Store::open(
        Config::builder()
            .directory(temp.path(), "alloc")
            .pair_format(format)
            .build(),
    )
    .unwrap()
}

fn value(i: u32) -> String {
    format!("payload-{:06}", i)
}

fn fill(store: &Store<u32, String>, range: std::ops::Range<u32>) {
    for i in range {
        store.put(i, value(i)).unwrap();
    }
}

fn drain(store: &Store<u32, String>, range: std::ops::Range<u32>) {
    for i in range {
        assert_eq!(store.remove(&i).unwrap(), Some(value(i)));
    }
}

// =============================================================================
// Reuse Tests
// =============================================================================

#[test]
fn test_partitioned_reuses_removed_space() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, PairFormat::Partitioned);

    fill(&store, 0..500);
    let after_first = store.file_size().unwrap();

    drain(&store, 0..500);
    fill(&store, 500..1000);
    let after_second = store.file_size().unwrap();

    assert!(
        after_second <= after_first + 1024,
        "grew from {} to {}",
        after_first,
        after_second
    );
    for i in 500..1000 {
        assert_eq!(store.get(&i).unwrap(), Some(value(i)));
    }
}

#[test]
fn test_append_always_grows() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, PairFormat::Append);

    fill(&store, 0..500);
    let after_first = store.file_size().unwrap();

    drain(&store, 0..500);
    fill(&store, 500..1000);
    let after_second = store.file_size().unwrap();

    assert!(after_second > after_first);
}

#[test]
fn test_smaller_pairs_fit_in_freed_blocks() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, PairFormat::Partitioned);

    store.put(1, "x".repeat(400)).unwrap();
    store.remove(&1).unwrap();
    let size = store.file_size().unwrap();

    // Several small pairs carved out of one freed block
    for i in 10..14 {
        store.put(i, "y".repeat(40)).unwrap();
    }

    // Only index nodes and pair headers may be added, no data blocks
    assert!(store.file_size().unwrap() <= size + 4 * 48 + 3 * 20);
    for i in 10..14 {
        assert_eq!(store.get(&i).unwrap(), Some("y".repeat(40)));
    }
}

#[test]
fn test_larger_pair_spans_freed_blocks() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, PairFormat::Partitioned);

    for i in 0..4 {
        store.put(i, "a".repeat(50)).unwrap();
    }
    for i in 0..4 {
        store.remove(&i).unwrap();
    }

    let big = "b".repeat(230);
    store.put(99, big.clone()).unwrap();
    assert_eq!(store.get(&99).unwrap(), Some(big));
}

#[test]
fn test_update_does_not_reclaim_partitioned_space() {
    let temp = TempDir::new().unwrap();
    let store = open(&temp, PairFormat::Partitioned);

    store.put(7, value(1)).unwrap();
    let record = PAIR_HEADER_SIZE
        + BLOCK_HEADER_SIZE
        + bincode::serialize(&(7u32, value(1))).unwrap().len() as u64;
    let before = store.file_size().unwrap();

    // Same encoded length, so a reclaimed record would fit exactly
    assert_eq!(store.put(7, value(2)).unwrap(), Some(value(1)));
    let after_update = store.file_size().unwrap();
    assert_eq!(after_update, before + record);

    // A new key in the same root node gets fresh space too
    store.put(8, value(3)).unwrap();
    assert_eq!(store.file_size().unwrap(), after_update + record);

    assert_eq!(store.get(&7).unwrap(), Some(value(2)));
    assert_eq!(store.get(&8).unwrap(), Some(value(3)));
    assert_eq!(store.len().unwrap(), 2);
}

#[test]
fn test_free_lists_survive_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let store = open(&temp, PairFormat::Partitioned);
        fill(&store, 0..200);
        drain(&store, 0..200);
        store.close().unwrap();
    }

    let store = open(&temp, PairFormat::Partitioned);
    assert!(store.is_empty().unwrap());
    let before = store.file_size().unwrap();

    fill(&store, 200..400);
    assert!(store.file_size().unwrap() <= before + 1024);
    for i in 200..400 {
        assert_eq!(store.get(&i).unwrap(), Some(value(i)));
    }
}
