//! Partitioned pair records and the fragmenting allocator
//!
//! A pair is a fixed 20-byte header plus a chain of data blocks. Removed
//! headers and blocks go onto two free lists whose heads live in the index
//! header:
//!
//! ```text
//! free headers:  head ──► [next | . | .] ──► [next | . | .] ──► EOF
//! free blocks:   head ──► [cap | next | ...] ──► [cap | next | ...] ──► EOF
//! ```
//!
//! Allocation consumes free blocks until the requested length is covered.
//! A block bigger than what is still needed is split: the used part is cut
//! from the back and the front stays on the free list, unless the leftover
//! would not even fit a block header, in which case the whole block is used.

use tracing::debug;

use crate::error::{PmapError, Result};
use crate::header::{EOF, FREE_PAIR_DATA_OFFSET, FREE_PAIR_HEADER_OFFSET};
use crate::storage::Storage;

use super::{Block, Pair};

/// next(8) | length(4) | first block(8)
pub const PAIR_HEADER_SIZE: u64 = 20;

/// capacity(4) | next block(8)
pub const BLOCK_HEADER_SIZE: u64 = 12;

const BLOCK_NEXT_OFFSET: u64 = 4;

// =============================================================================
// Records
// =============================================================================

pub(crate) fn read(storage: &Storage, position: u64) -> Result<Pair> {
    let mut backend = storage.lock();
    backend.seek(position)?;
    let next = backend.read_u64()?;
    let len = backend.read_i32()?;
    let len = usize::try_from(len).map_err(|_| {
        PmapError::Corruption(format!("pair at {} has negative length {}", position, len))
    })?;
    let mut block = backend.read_u64()?;

    let mut data = Vec::with_capacity(len);
    let mut blocks = Vec::new();
    while block != EOF {
        backend.seek(block)?;
        let capacity = backend.read_u32()?;
        let following = backend.read_u64()?;
        let take = (capacity as usize).min(len - data.len());
        data.extend_from_slice(&backend.read_bytes(take)?);
        blocks.push(Block {
            position: block,
            capacity,
        });
        block = following;
    }

    if data.len() != len {
        return Err(PmapError::Corruption(format!(
            "pair at {} holds {} of {} bytes",
            position,
            data.len(),
            len
        )));
    }

    Ok(Pair {
        position,
        next,
        data,
        blocks,
    })
}

/// Allocate space for `data`, write the record and return its header offset
pub(crate) fn write(index: &Storage, pairs: &Storage, data: &[u8], next: u64) -> Result<u64> {
    let len = i32::try_from(data.len())
        .map_err(|_| PmapError::Codec(format!("pair of {} bytes is too large", data.len())))?;

    let header = allocate_header(index, pairs)?;
    let blocks = allocate_blocks(index, pairs, len as u32)?;

    let mut backend = pairs.lock();
    let mut written = 0usize;
    for (i, block) in blocks.iter().enumerate() {
        let following = blocks.get(i + 1).map_or(EOF, |b| b.position);
        let take = (block.capacity as usize).min(data.len() - written);
        backend.seek(block.position)?;
        backend.write_u32(block.capacity)?;
        backend.write_u64(following)?;
        backend.write_all(&data[written..written + take])?;
        written += take;
    }

    let first = blocks.first().map_or(EOF, |b| b.position);
    backend.seek(header)?;
    backend.write_u64(next)?;
    backend.write_i32(len)?;
    backend.write_u64(first)?;
    Ok(header)
}

pub(crate) fn set_next(storage: &Storage, pair: &Pair, next: u64) -> Result<()> {
    storage.write_u64_at(pair.position, next)
}

/// Return the header and every data block of `pair` to the free lists
pub(crate) fn free(index: &Storage, pairs: &Storage, pair: &Pair) -> Result<()> {
    let free_header = index.read_u64_at(FREE_PAIR_HEADER_OFFSET)?;
    pairs.write_u64_at(pair.position, free_header)?;
    index.write_u64_at(FREE_PAIR_HEADER_OFFSET, pair.position)?;

    if let (Some(first), Some(last)) = (pair.blocks.first(), pair.blocks.last()) {
        let free_data = index.read_u64_at(FREE_PAIR_DATA_OFFSET)?;
        pairs.write_u64_at(last.position + BLOCK_NEXT_OFFSET, free_data)?;
        index.write_u64_at(FREE_PAIR_DATA_OFFSET, first.position)?;
    }

    debug!(
        position = pair.position,
        blocks = pair.blocks.len(),
        "Freed partitioned pair"
    );
    Ok(())
}

// =============================================================================
// Allocator
// =============================================================================

fn allocate_header(index: &Storage, pairs: &Storage) -> Result<u64> {
    let head = index.read_u64_at(FREE_PAIR_HEADER_OFFSET)?;
    if head == EOF {
        return pairs.extend(PAIR_HEADER_SIZE);
    }
    let next = pairs.read_u64_at(head)?;
    index.write_u64_at(FREE_PAIR_HEADER_OFFSET, next)?;
    debug!(position = head, "Reused free pair header");
    Ok(head)
}

/// Blocks covering `len` bytes, taken from the free list first
fn allocate_blocks(index: &Storage, pairs: &Storage, len: u32) -> Result<Vec<Block>> {
    let mut remaining = len;
    let mut blocks = Vec::new();
    let mut head = index.read_u64_at(FREE_PAIR_DATA_OFFSET)?;

    while remaining > 0 && head != EOF {
        let capacity = pairs.read_u32_at(head)?;
        let following = pairs.read_u64_at(head + BLOCK_NEXT_OFFSET)?;

        if capacity <= remaining {
            blocks.push(Block {
                position: head,
                capacity,
            });
            remaining -= capacity;
            head = following;
            continue;
        }

        let leftover = (capacity - remaining) as u64;
        if leftover > BLOCK_HEADER_SIZE {
            // Keep the front on the free list, hand out the back
            pairs.write_u32_at(head, (leftover - BLOCK_HEADER_SIZE) as u32)?;
            blocks.push(Block {
                position: head + leftover,
                capacity: remaining,
            });
            debug!(position = head, leftover, "Split free data block");
        } else {
            blocks.push(Block {
                position: head,
                capacity,
            });
            head = following;
        }
        remaining = 0;
    }

    index.write_u64_at(FREE_PAIR_DATA_OFFSET, head)?;
    if !blocks.is_empty() {
        debug!(blocks = blocks.len(), "Reused free data blocks");
    }

    if remaining > 0 || blocks.is_empty() {
        let position = pairs.extend(BLOCK_HEADER_SIZE + remaining as u64)?;
        blocks.push(Block {
            position,
            capacity: remaining,
        });
    }
    Ok(blocks)
}
