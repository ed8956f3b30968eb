//! Index node encoding
//!
//! ## Node Format (48 bytes, big-endian)
//! ```text
//! ┌────────┬───────┬───────┬────────┬───────┬───────┬───────┐
//! │ before │ hash1 │ pair1 │ center │ hash2 │ pair2 │ after │
//! │ u64    │ i32   │ u64   │ u64    │ i32   │ u64   │ u64   │
//! └────────┴───────┴───────┴────────┴───────┴───────┴───────┘
//! ```
//!
//! A node with `hash1 == hash2` holds a single hash; its `pair2` and `after`
//! are unused. Free nodes reuse the `before` slot as the free-list link.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{PmapError, Result};
use crate::header::EOF;
use crate::storage::Storage;

/// Encoded size of a node
pub const NODE_SIZE: u64 = 48;

/// One node of the on-disk 2-3 tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexNode {
    /// Where the node lives (not encoded)
    pub position: u64,
    pub before: u64,
    pub hash1: i32,
    pub pair1: u64,
    pub center: u64,
    pub hash2: i32,
    pub pair2: u64,
    pub after: u64,
}

/// Where a search for a hash goes from a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The node holds the hash
    Found,
    /// Continue in this child (possibly `EOF`)
    Child(u64),
}

impl IndexNode {
    /// A leaf holding one hash with an empty chain
    pub fn leaf(position: u64, hash: i32) -> Self {
        Self {
            position,
            before: EOF,
            hash1: hash,
            pair1: EOF,
            center: EOF,
            hash2: hash,
            pair2: EOF,
            after: EOF,
        }
    }

    pub fn is_single(&self) -> bool {
        self.hash1 == self.hash2
    }

    pub fn contains(&self, hash: i32) -> bool {
        self.hash1 == hash || self.hash2 == hash
    }

    /// Route a search for `hash`
    pub fn step(&self, hash: i32) -> Step {
        if hash == self.hash1 {
            Step::Found
        } else if hash < self.hash1 {
            Step::Child(self.before)
        } else if hash < self.hash2 || self.is_single() {
            Step::Child(self.center)
        } else if hash == self.hash2 {
            Step::Found
        } else {
            Step::Child(self.after)
        }
    }

    /// Head of the pair chain for `hash`
    pub fn chain_head(&self, hash: i32) -> Result<u64> {
        if hash == self.hash1 {
            Ok(self.pair1)
        } else if hash == self.hash2 {
            Ok(self.pair2)
        } else {
            Err(self.missing(hash))
        }
    }

    pub fn set_chain_head(&mut self, hash: i32, pair: u64) -> Result<()> {
        if hash == self.hash1 {
            self.pair1 = pair;
        } else if hash == self.hash2 {
            self.pair2 = pair;
        } else {
            return Err(self.missing(hash));
        }
        Ok(())
    }

    /// Largest hash of the node with its chain head
    pub fn largest(&self) -> (i32, u64) {
        if self.is_single() {
            (self.hash1, self.pair1)
        } else {
            (self.hash2, self.pair2)
        }
    }

    /// Point the child slot that leads toward `hash` at `child`
    pub fn replace_child_toward(&mut self, hash: i32, child: u64) -> Result<()> {
        if hash < self.hash1 {
            self.before = child;
        } else if hash > self.hash1 && (self.is_single() || hash < self.hash2) {
            self.center = child;
        } else if !self.is_single() && hash > self.hash2 {
            self.after = child;
        } else {
            return Err(PmapError::Corruption(format!(
                "node at {} has no child toward hash {}",
                self.position, hash
            )));
        }
        Ok(())
    }

    /// Drop `hash` from a two-hash node by shifting the other slots left
    pub fn erase_by_shifting(&mut self, hash: i32) -> Result<()> {
        if self.is_single() {
            return Err(self.missing(hash));
        }
        if hash == self.hash1 {
            self.hash1 = self.hash2;
            self.before = self.center;
            self.pair1 = self.pair2;
            self.center = self.after;
        } else if hash == self.hash2 {
            self.hash2 = self.hash1;
            self.center = self.after;
        } else {
            return Err(self.missing(hash));
        }
        self.after = EOF;
        self.pair2 = EOF;
        Ok(())
    }

    /// Turn a two-hash node into a single-hash node holding `hash1`
    pub fn demote(&mut self) {
        self.hash2 = self.hash1;
        self.after = EOF;
        self.pair2 = EOF;
    }

    fn missing(&self, hash: i32) -> PmapError {
        PmapError::Corruption(format!(
            "node at {} does not hold hash {}",
            self.position, hash
        ))
    }

    // -------------------------------------------------------------------------
    // Encoding
    // -------------------------------------------------------------------------

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(NODE_SIZE as usize);
        buf.put_u64(self.before);
        buf.put_i32(self.hash1);
        buf.put_u64(self.pair1);
        buf.put_u64(self.center);
        buf.put_i32(self.hash2);
        buf.put_u64(self.pair2);
        buf.put_u64(self.after);
        buf
    }

    pub fn decode(position: u64, mut data: &[u8]) -> Result<Self> {
        if data.len() < NODE_SIZE as usize {
            return Err(PmapError::Corruption(format!(
                "index node at {} is truncated",
                position
            )));
        }
        Ok(Self {
            position,
            before: data.get_u64(),
            hash1: data.get_i32(),
            pair1: data.get_u64(),
            center: data.get_u64(),
            hash2: data.get_i32(),
            pair2: data.get_u64(),
            after: data.get_u64(),
        })
    }

    pub fn read(storage: &Storage, position: u64) -> Result<Self> {
        let mut raw = [0u8; NODE_SIZE as usize];
        storage.read_bytes_at(position, &mut raw)?;
        Self::decode(position, &raw)
    }

    pub fn write(&self, storage: &Storage) -> Result<()> {
        storage.write_bytes_at(self.position, &self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_hash(hash1: i32, hash2: i32) -> IndexNode {
        IndexNode {
            position: 52,
            before: 100,
            hash1,
            pair1: 200,
            center: 300,
            hash2,
            pair2: 400,
            after: 500,
        }
    }

    #[test]
    fn test_encode_layout() {
        let node = two_hash(7, 9);
        let raw = node.encode();
        assert_eq!(raw.len(), 48);
        assert_eq!(&raw[0..8], &100u64.to_be_bytes());
        assert_eq!(&raw[8..12], &7i32.to_be_bytes());
        assert_eq!(&raw[40..48], &500u64.to_be_bytes());
        assert_eq!(IndexNode::decode(52, &raw).unwrap(), node);
    }

    #[test]
    fn test_step_routes_by_hash() {
        let node = two_hash(10, 20);
        assert_eq!(node.step(10), Step::Found);
        assert_eq!(node.step(20), Step::Found);
        assert_eq!(node.step(5), Step::Child(100));
        assert_eq!(node.step(15), Step::Child(300));
        assert_eq!(node.step(25), Step::Child(500));

        let leaf = IndexNode::leaf(52, 10);
        assert_eq!(leaf.step(11), Step::Child(EOF));
        assert_eq!(leaf.step(9), Step::Child(EOF));
    }

    #[test]
    fn test_erase_first_hash_shifts_left() {
        let mut node = two_hash(10, 20);
        node.erase_by_shifting(10).unwrap();
        assert_eq!((node.hash1, node.hash2), (20, 20));
        assert_eq!((node.before, node.pair1, node.center), (300, 400, 500));
        assert_eq!((node.after, node.pair2), (EOF, EOF));
    }

    #[test]
    fn test_erase_second_hash() {
        let mut node = two_hash(10, 20);
        node.erase_by_shifting(20).unwrap();
        assert!(node.is_single());
        assert_eq!((node.before, node.pair1, node.center), (100, 200, 500));
    }

    #[test]
    fn test_replace_child_toward() {
        let mut node = two_hash(10, 20);
        node.replace_child_toward(15, 42).unwrap();
        assert_eq!(node.center, 42);
        node.replace_child_toward(30, 43).unwrap();
        assert_eq!(node.after, 43);
        assert!(node.replace_child_toward(20, 1).is_err());
    }
}
