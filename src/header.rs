//! Index file header
//!
//! ## Layout (52 bytes, big-endian)
//! ```text
//! ┌────────┬──────┬─────────────────────────────────────────────────┐
//! │ offset │ size │ field                                           │
//! ├────────┼──────┼─────────────────────────────────────────────────┤
//! │ 0      │ 8    │ root node offset                                │
//! │ 8      │ 4    │ pair count                                      │
//! │ 12     │ 8    │ head of the free index node list                │
//! │ 20     │ 8    │ head of the free pair header list               │
//! │ 28     │ 8    │ head of the free data block list                │
//! │ 36     │ 8    │ allocation cursor (logical length when mapped)  │
//! │ 44     │ 8    │ signature                                       │
//! └────────┴──────┴─────────────────────────────────────────────────┘
//! ```
//!
//! Every offset field uses [`EOF`] for "none".

use tracing::{debug, warn};

use crate::error::{PmapError, Result};
use crate::storage::Storage;

/// "No such position" marker. Stored as the signed 64-bit value -1.
pub const EOF: u64 = u64::MAX;

pub const ROOT_OFFSET: u64 = 0;
pub const COUNT_OFFSET: u64 = 8;
pub const FREE_NODE_OFFSET: u64 = 12;
pub const FREE_PAIR_HEADER_OFFSET: u64 = 20;
pub const FREE_PAIR_DATA_OFFSET: u64 = 28;
pub const CURSOR_OFFSET: u64 = 36;
pub const SIGNATURE_OFFSET: u64 = 44;

/// Size of the header; index nodes start here
pub const HEADER_SIZE: u64 = 52;

/// Magic value identifying an index file
pub const SIGNATURE: u64 = 123_456_789;

/// Truncate `storage` and write a fresh header for an empty map
pub fn initialize(storage: &Storage) -> Result<()> {
    let mut backend = storage.lock();
    backend.set_len(0)?;
    backend.write_u64_at(ROOT_OFFSET, EOF)?;
    backend.write_i32_at(COUNT_OFFSET, 0)?;
    backend.write_u64_at(FREE_NODE_OFFSET, EOF)?;
    backend.write_u64_at(FREE_PAIR_HEADER_OFFSET, EOF)?;
    backend.write_u64_at(FREE_PAIR_DATA_OFFSET, EOF)?;
    backend.write_u64_at(CURSOR_OFFSET, HEADER_SIZE)?;
    backend.write_u64_at(SIGNATURE_OFFSET, SIGNATURE)?;
    debug!(storage = storage.name(), "Initialized index header");
    Ok(())
}

/// Fail with `Corruption` unless `storage` starts with a valid header
pub fn check_signature(storage: &Storage) -> Result<()> {
    let found = if storage.len()? < HEADER_SIZE {
        None
    } else {
        Some(storage.read_u64_at(SIGNATURE_OFFSET)?)
    };

    if found != Some(SIGNATURE) {
        warn!(storage = storage.name(), ?found, "Index signature mismatch");
        return Err(PmapError::Corruption(format!(
            "{} is not an index file (bad signature)",
            storage.name()
        )));
    }
    Ok(())
}

/// Persisted number of pairs
pub fn read_count(storage: &Storage) -> Result<usize> {
    let count = storage.read_i32_at(COUNT_OFFSET)?;
    usize::try_from(count)
        .map_err(|_| PmapError::Corruption(format!("negative pair count {}", count)))
}

pub fn write_count(storage: &Storage, count: usize) -> Result<()> {
    let count = i32::try_from(count)
        .map_err(|_| PmapError::Corruption(format!("pair count {} overflows", count)))?;
    storage.write_i32_at(COUNT_OFFSET, count)
}
