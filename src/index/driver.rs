//! Index tree driver
//!
//! Search, insertion with upward splits, and hash removal on the 2-3 tree.
//! Recursion over the tree is replaced by an explicit path of node offsets
//! from the root down to the node of interest.
//!
//! ## Insertion
//! ```text
//! single-hash node          two-hash node (split)
//!   [a]  + b                  [a | c] + b
//!    →  [a | b]                →   [b]  pushed up into the parent
//!                                 /   \
//!                               [a]   [c]
//! ```
//!
//! The tree is never rebalanced on removal.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{PmapError, Result};
use crate::header::{CURSOR_OFFSET, EOF, FREE_NODE_OFFSET, ROOT_OFFSET};
use crate::storage::Storage;

use super::node::{IndexNode, Step, NODE_SIZE};

/// Operations on the index tree stored in one [`Storage`]
pub struct IndexDriver {
    storage: Arc<Storage>,
}

impl IndexDriver {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn top_position(&self) -> Result<u64> {
        self.storage.read_u64_at(ROOT_OFFSET)
    }

    fn set_root(&self, position: u64) -> Result<()> {
        debug!(root = position as i64, "Index root changed");
        self.storage.write_u64_at(ROOT_OFFSET, position)
    }

    pub fn read_node(&self, position: u64) -> Result<IndexNode> {
        IndexNode::read(&self.storage, position)
    }

    pub fn write_node(&self, node: &IndexNode) -> Result<()> {
        node.write(&self.storage)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Path from the root toward `hash`
    ///
    /// The last element is the node holding `hash`, or `EOF` when the hash is
    /// absent (the element before it is then the node where it belongs).
    pub fn locate(&self, hash: i32) -> Result<Vec<u64>> {
        let mut path = Vec::new();
        let mut position = self.top_position()?;
        loop {
            path.push(position);
            if position == EOF {
                return Ok(path);
            }
            match self.read_node(position)?.step(hash) {
                Step::Found => return Ok(path),
                Step::Child(child) => position = child,
            }
        }
    }

    /// The node holding `hash`, if any
    pub fn find(&self, hash: i32) -> Result<Option<IndexNode>> {
        let mut position = self.top_position()?;
        while position != EOF {
            let node = self.read_node(position)?;
            match node.step(hash) {
                Step::Found => return Ok(Some(node)),
                Step::Child(child) => position = child,
            }
        }
        Ok(None)
    }

    // =========================================================================
    // Free List
    // =========================================================================

    /// Take a node slot from the free list, or extend the storage by one node
    pub fn poll_free_node(&self) -> Result<u64> {
        let head = self.storage.read_u64_at(FREE_NODE_OFFSET)?;
        if head == EOF {
            let position = self.storage.extend(NODE_SIZE)?;
            // Keep the cursor current so a mapped reopen sees every node
            self.storage
                .write_u64_at(CURSOR_OFFSET, position + NODE_SIZE)?;
            return Ok(position);
        }
        let next = self.storage.read_u64_at(head)?;
        self.storage.write_u64_at(FREE_NODE_OFFSET, next)?;
        debug!(position = head, "Reused free index node");
        Ok(head)
    }

    /// Push a node slot onto the free list
    pub fn register_free_node(&self, position: u64) -> Result<()> {
        let head = self.storage.read_u64_at(FREE_NODE_OFFSET)?;
        self.storage.write_u64_at(position, head)?;
        self.storage.write_u64_at(FREE_NODE_OFFSET, position)?;
        debug!(position, "Freed index node");
        Ok(())
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Insert `hash` (absent from the tree) with chain head `pair`
    ///
    /// `path` runs from the root to the node where the hash belongs, without
    /// the trailing `EOF` of [`locate`](Self::locate); it is consumed. Returns
    /// the node that ended up holding `hash`.
    pub fn insert(&self, path: &mut Vec<u64>, hash: i32, pair: u64) -> Result<IndexNode> {
        let mut hash = hash;
        let mut pair = pair;
        let mut left = EOF;
        let mut right = EOF;
        let mut placed: Option<IndexNode> = None;

        loop {
            let Some(position) = path.pop() else {
                let mut root = IndexNode::leaf(self.poll_free_node()?, hash);
                root.pair1 = pair;
                root.before = left;
                root.center = right;
                self.write_node(&root)?;
                self.set_root(root.position)?;
                return Ok(placed.unwrap_or(root));
            };

            let mut current = self.read_node(position)?;

            if current.is_single() {
                if hash > current.hash1 {
                    current.hash2 = hash;
                    current.pair2 = pair;
                    current.center = left;
                    current.after = right;
                } else {
                    current.hash1 = hash;
                    current.after = current.center;
                    current.pair2 = current.pair1;
                    current.pair1 = pair;
                    current.before = left;
                    current.center = right;
                }
                self.write_node(&current)?;
                trace!(position, hash, "Inserted hash into node");
                return Ok(placed.unwrap_or(current));
            }

            let mut lower = IndexNode::leaf(self.poll_free_node()?, 0);
            let mut upper = IndexNode::leaf(self.poll_free_node()?, 0);
            let (up_hash, up_pair);

            if hash < current.hash1 {
                up_hash = current.hash1;
                up_pair = current.pair1;
                Self::fill(&mut lower, hash, pair, left, right);
                Self::fill(&mut upper, current.hash2, current.pair2, current.center, current.after);
                placed.get_or_insert(lower);
            } else if hash > current.hash2 {
                up_hash = current.hash2;
                up_pair = current.pair2;
                Self::fill(&mut lower, current.hash1, current.pair1, current.before, current.center);
                Self::fill(&mut upper, hash, pair, left, right);
                placed.get_or_insert(upper);
            } else {
                up_hash = hash;
                up_pair = pair;
                Self::fill(&mut lower, current.hash1, current.pair1, current.before, left);
                Self::fill(&mut upper, current.hash2, current.pair2, right, current.after);
            }

            self.write_node(&lower)?;
            self.write_node(&upper)?;
            self.register_free_node(current.position)?;
            debug!(
                position,
                lower = lower.position,
                upper = upper.position,
                up_hash,
                "Split index node"
            );

            hash = up_hash;
            pair = up_pair;
            left = lower.position;
            right = upper.position;
        }
    }

    fn fill(node: &mut IndexNode, hash: i32, pair: u64, before: u64, center: u64) {
        node.hash1 = hash;
        node.hash2 = hash;
        node.pair1 = pair;
        node.before = before;
        node.center = center;
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove `hash` from the tree
    ///
    /// `path` is a [`locate`](Self::locate) result ending at the node that
    /// holds `hash`; it is consumed.
    pub fn remove_hash(&self, path: &mut Vec<u64>, hash: i32) -> Result<()> {
        let position = path
            .pop()
            .filter(|p| *p != EOF)
            .ok_or_else(|| PmapError::Corruption(format!("hash {} is not indexed", hash)))?;
        let mut current = self.read_node(position)?;
        if !current.contains(hash) {
            return Err(PmapError::Corruption(format!(
                "node at {} does not hold hash {}",
                position, hash
            )));
        }

        // Walk to the in-order predecessor: the rightmost node of the
        // subtree left of `hash`.
        let mut descent: Vec<IndexNode> = Vec::new();
        let mut next = if hash == current.hash1 {
            current.before
        } else {
            current.center
        };
        while next != EOF {
            let node = self.read_node(next)?;
            next = if node.is_single() { node.center } else { node.after };
            descent.push(node);
        }

        let Some(mut upper_left) = descent.pop() else {
            if !current.is_single() {
                current.erase_by_shifting(hash)?;
                self.write_node(&current)?;
                trace!(position, hash, "Erased hash by shifting");
                return Ok(());
            }

            let replacement = current.center;
            match path.last() {
                None => self.set_root(replacement)?,
                Some(&parent_position) => {
                    let mut parent = self.read_node(parent_position)?;
                    parent.replace_child_toward(hash, replacement)?;
                    self.write_node(&parent)?;
                }
            }
            self.register_free_node(current.position)?;
            return Ok(());
        };

        let (key, key_pair) = upper_left.largest();
        if hash == current.hash1 {
            current.hash1 = key;
            current.pair1 = key_pair;
            if current.hash2 == hash {
                current.hash2 = key;
            }
        } else {
            current.hash2 = key;
            current.pair2 = key_pair;
        }

        if upper_left.is_single() {
            match descent.last_mut() {
                Some(parent) => {
                    if parent.is_single() {
                        parent.center = upper_left.before;
                    } else {
                        parent.after = upper_left.before;
                    }
                    self.write_node(parent)?;
                }
                None => {
                    if current.hash1 == key {
                        current.before = upper_left.before;
                    } else {
                        current.center = upper_left.before;
                    }
                }
            }
            self.write_node(&current)?;
            self.register_free_node(upper_left.position)?;
        } else {
            self.write_node(&current)?;
            upper_left.demote();
            self.write_node(&upper_left)?;
        }

        trace!(position, hash, replacement = key, "Replaced hash by predecessor");
        Ok(())
    }
}
