//! Append-only pair records
//!
//! Written once at the end of the pair storage and never reclaimed.

use crate::error::{PmapError, Result};
use crate::storage::Storage;

use super::Pair;

const LEN_SIZE: u64 = 4;
const NEXT_SIZE: u64 = 8;

pub(crate) fn read(storage: &Storage, position: u64) -> Result<Pair> {
    let mut backend = storage.lock();
    backend.seek(position)?;
    let len = backend.read_i32()?;
    let len = usize::try_from(len).map_err(|_| {
        PmapError::Corruption(format!("pair at {} has negative length {}", position, len))
    })?;
    let data = backend.read_bytes(len)?;
    let next = backend.read_u64()?;
    Ok(Pair {
        position,
        next,
        data,
        blocks: Vec::new(),
    })
}

/// Append a new record and return its offset
pub(crate) fn write(storage: &Storage, data: &[u8], next: u64) -> Result<u64> {
    let len = i32::try_from(data.len())
        .map_err(|_| PmapError::Codec(format!("pair of {} bytes is too large", data.len())))?;

    let mut record = Vec::with_capacity(data.len() + (LEN_SIZE + NEXT_SIZE) as usize);
    record.extend_from_slice(&len.to_be_bytes());
    record.extend_from_slice(data);
    record.extend_from_slice(&next.to_be_bytes());

    let mut backend = storage.lock();
    let position = backend.len()?;
    backend.write_bytes_at(position, &record)?;
    Ok(position)
}

pub(crate) fn set_next(storage: &Storage, pair: &Pair, next: u64) -> Result<()> {
    storage.write_u64_at(pair.position + LEN_SIZE + pair.data.len() as u64, next)
}
