//! Full-scan cursor
//!
//! Walks every pair of the store in ascending hash order, then chain order.
//! Each frame of the stack is a node plus the phase it has reached:
//!
//! ```text
//! Before ──► Hash1 ──► Center ──► Hash2 ──► After
//!   │                    │                    │
//!   └─ descend before    └─ descend center    └─ descend after, then pop
//! ```
//!
//! The cursor itself is unsynchronized; callers hold the store read lock
//! around every step.

use crate::error::Result;
use crate::header::EOF;
use crate::pair::{Pair, PairDriver};

use super::driver::IndexDriver;
use super::node::IndexNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Before,
    Hash1,
    Center,
    Hash2,
    After,
}

impl Phase {
    fn next(self) -> Self {
        match self {
            Phase::Before => Phase::Hash1,
            Phase::Hash1 => Phase::Center,
            Phase::Center => Phase::Hash2,
            Phase::Hash2 => Phase::After,
            Phase::After => Phase::Before,
        }
    }
}

#[derive(Debug)]
struct Frame {
    node: IndexNode,
    phase: Phase,
}

impl Frame {
    fn new(node: IndexNode) -> Self {
        Self {
            node,
            phase: Phase::Before,
        }
    }
}

/// Position of a full scan over the tree and the pair chains
#[derive(Debug)]
pub struct ScanCursor {
    stack: Vec<Frame>,
    chain: u64,
    started: bool,
}

impl Default for ScanCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanCursor {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            chain: EOF,
            started: false,
        }
    }

    /// Next pair of the scan, `None` once everything has been visited
    pub fn next_pair(&mut self, index: &IndexDriver, pairs: &PairDriver) -> Result<Option<Pair>> {
        if !self.started {
            self.started = true;
            let root = index.top_position()?;
            if root != EOF {
                self.stack.push(Frame::new(index.read_node(root)?));
            }
        }

        loop {
            if self.chain != EOF {
                let pair = pairs.read_pair(self.chain)?;
                self.chain = pair.next;
                return Ok(Some(pair));
            }
            match self.next_chain(index)? {
                Some(head) => self.chain = head,
                None => return Ok(None),
            }
        }
    }

    /// Advance the tree walk to the next chain head
    fn next_chain(&mut self, index: &IndexDriver) -> Result<Option<u64>> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            let node = frame.node;
            let phase = frame.phase;

            match phase {
                Phase::Before | Phase::Center | Phase::After => {
                    let child = match phase {
                        Phase::Before => node.before,
                        Phase::Center => node.center,
                        _ => node.after,
                    };
                    if child != EOF {
                        let child = index.read_node(child)?;
                        self.stack.push(Frame::new(child));
                    } else if phase == Phase::After {
                        self.finish_frame();
                    } else {
                        frame.phase = phase.next();
                    }
                }
                Phase::Hash1 => {
                    frame.phase = Phase::Center;
                    if node.pair1 != EOF {
                        return Ok(Some(node.pair1));
                    }
                }
                Phase::Hash2 => {
                    frame.phase = Phase::After;
                    if !node.is_single() && node.pair2 != EOF {
                        return Ok(Some(node.pair2));
                    }
                }
            }
        }
    }

    /// Pop a finished frame and move its ancestors past the child just done
    fn finish_frame(&mut self) {
        loop {
            self.stack.pop();
            let Some(parent) = self.stack.last_mut() else {
                return;
            };
            parent.phase = parent.phase.next();
            if parent.phase != Phase::Before {
                return;
            }
        }
    }
}
