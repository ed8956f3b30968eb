//! Pair Module
//!
//! Key/value records and the collision chains that link them.
//!
//! ## Record Formats
//! ```text
//! Append:       ┌─────────┬──────────────┬──────────┐
//!               │ len i32 │ bytes        │ next u64 │
//!               └─────────┴──────────────┴──────────┘
//!
//! Partitioned:  header ┌──────────┬─────────┬───────────┐
//!                      │ next u64 │ len u32 │ first u64 │──┐
//!                      └──────────┴─────────┴───────────┘  │
//!               block  ┌──────────┬──────────┬───────┐ ◄───┘
//!                      │ cap u32  │ next u64 │ bytes │──► next block ...
//!                      └──────────┴──────────┴───────┘
//! ```
//!
//! Every pair of one hash bucket is reachable from the index node through the
//! `next` links, terminated by `EOF`.

mod append;
mod driver;
mod partitioned;

pub use driver::{PairDriver, RemovedPair};
pub use partitioned::{BLOCK_HEADER_SIZE, PAIR_HEADER_SIZE};

/// A data block of a partitioned pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub position: u64,
    pub capacity: u32,
}

/// A pair record as read from storage
#[derive(Debug, Clone)]
pub struct Pair {
    /// Offset of the record (the header for partitioned pairs)
    pub position: u64,

    /// Next pair of the same chain, `EOF` at the end
    pub next: u64,

    /// Encoded key and value
    pub data: Vec<u8>,

    /// Data blocks in chain order (empty for append records)
    pub blocks: Vec<Block>,
}
