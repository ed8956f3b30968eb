//! Pair chain driver
//!
//! Finds, adds and removes pairs in the collision chain of one hash, and
//! dispatches record I/O to the configured [`PairFormat`].

use std::sync::Arc;

use tracing::trace;

use crate::codec::Codec;
use crate::config::PairFormat;
use crate::error::Result;
use crate::header::EOF;
use crate::index::IndexNode;
use crate::storage::Storage;

use super::{append, partitioned, Pair};

/// Outcome of removing a key from its chain
#[derive(Debug)]
pub struct RemovedPair<V> {
    /// The unlinked record
    pub pair: Pair,

    /// Value it held
    pub value: V,

    /// The chain has no pairs left; the hash must leave the index
    pub chain_empty: bool,
}

/// Record I/O and chain edits over the pair storage
pub struct PairDriver {
    index: Arc<Storage>,
    pairs: Arc<Storage>,
    format: PairFormat,
}

impl PairDriver {
    pub fn new(index: Arc<Storage>, pairs: Arc<Storage>, format: PairFormat) -> Self {
        Self {
            index,
            pairs,
            format,
        }
    }

    pub fn format(&self) -> PairFormat {
        self.format
    }

    /// Drop every record
    pub fn truncate(&self) -> Result<()> {
        self.pairs.set_len(0)
    }

    pub fn storage_len(&self) -> Result<u64> {
        self.pairs.len()
    }

    pub fn sync(&self) -> Result<()> {
        self.pairs.sync()
    }

    pub fn read_pair(&self, position: u64) -> Result<Pair> {
        match self.format {
            PairFormat::Append => append::read(&self.pairs, position),
            PairFormat::Partitioned => partitioned::read(&self.pairs, position),
        }
    }

    fn write_pair(&self, data: &[u8], next: u64) -> Result<u64> {
        match self.format {
            PairFormat::Append => append::write(&self.pairs, data, next),
            PairFormat::Partitioned => partitioned::write(&self.index, &self.pairs, data, next),
        }
    }

    fn set_next(&self, pair: &Pair, next: u64) -> Result<()> {
        match self.format {
            PairFormat::Append => append::set_next(&self.pairs, pair, next),
            PairFormat::Partitioned => partitioned::set_next(&self.pairs, pair, next),
        }
    }

    fn release(&self, pair: &Pair) -> Result<()> {
        match self.format {
            PairFormat::Append => Ok(()),
            PairFormat::Partitioned => partitioned::free(&self.index, &self.pairs, pair),
        }
    }

    // =========================================================================
    // Chain Operations
    // =========================================================================

    /// Walk the chain from `head` until `key` is found
    ///
    /// Returns the matching pair with its value, and the pair before it.
    fn scan<K, V, C>(
        &self,
        head: u64,
        key: &K,
        codec: &C,
    ) -> Result<(Option<(Pair, V)>, Option<Pair>)>
    where
        K: Eq,
        C: Codec<K, V>,
    {
        let mut previous = None;
        let mut cursor = head;
        while cursor != EOF {
            let pair = self.read_pair(cursor)?;
            let (found, value) = codec.decode(&pair.data)?;
            if &found == key {
                return Ok((Some((pair, value)), previous));
            }
            cursor = pair.next;
            previous = Some(pair);
        }
        Ok((None, previous))
    }

    /// Value stored for `key` in the chain starting at `head`
    pub fn find<K, V, C>(&self, head: u64, key: &K, codec: &C) -> Result<Option<V>>
    where
        K: Eq,
        C: Codec<K, V>,
    {
        let (found, _) = self.scan(head, key, codec)?;
        Ok(found.map(|(_, value)| value))
    }

    /// Insert or replace `key` in the chain of `hash` held by `node`
    ///
    /// A replacement takes over the old record's place in the chain. Rewrites
    /// `node` when the chain head changes. Returns the previous value.
    pub fn add_pair<K, V, C>(
        &self,
        node: &mut IndexNode,
        hash: i32,
        key: &K,
        value: &V,
        codec: &C,
    ) -> Result<Option<V>>
    where
        K: Eq,
        C: Codec<K, V>,
    {
        let data = codec.encode(key, value)?;
        let head = node.chain_head(hash)?;
        let (target, previous) = self.scan(head, key, codec)?;

        let next = target.as_ref().map_or(EOF, |(pair, _)| pair.next);
        let position = self.write_pair(&data, next)?;

        match &previous {
            Some(previous) => self.set_next(previous, position)?,
            None => {
                node.set_chain_head(hash, position)?;
                node.write(&self.index)?;
            }
        }

        trace!(
            hash,
            position,
            replaced = target.is_some(),
            "Added pair"
        );
        Ok(target.map(|(_, value)| value))
    }

    /// Unlink `key` from the chain of `hash` held by `node`
    ///
    /// When the chain becomes empty the node is left untouched; the caller
    /// removes the hash from the index instead.
    pub fn remove_pair<K, V, C>(
        &self,
        node: &mut IndexNode,
        hash: i32,
        key: &K,
        codec: &C,
    ) -> Result<Option<RemovedPair<V>>>
    where
        K: Eq,
        C: Codec<K, V>,
    {
        let head = node.chain_head(hash)?;
        let (target, previous) = self.scan(head, key, codec)?;
        let Some((pair, value)) = target else {
            return Ok(None);
        };

        let mut chain_empty = false;
        match &previous {
            Some(previous) => self.set_next(previous, pair.next)?,
            None if pair.next == EOF => chain_empty = true,
            None => {
                node.set_chain_head(hash, pair.next)?;
                node.write(&self.index)?;
            }
        }

        self.release(&pair)?;
        trace!(hash, position = pair.position, chain_empty, "Removed pair");
        Ok(Some(RemovedPair {
            pair,
            value,
            chain_empty,
        }))
    }
}
