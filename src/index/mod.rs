//! Index Module
//!
//! The on-disk 2-3 tree mapping 32-bit hash codes to the head of a pair chain.
//!
//! ## Components
//! - `node`: 48-byte node encoding and per-node edits
//! - `driver`: search, insertion with splits, hash removal, node free list
//! - `iterator`: full-scan cursor over nodes and chains

mod driver;
mod iterator;
mod node;

pub use driver::IndexDriver;
pub use iterator::ScanCursor;
pub use node::{IndexNode, Step, NODE_SIZE};
