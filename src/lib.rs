//! # pmapkv
//!
//! An embedded, file-backed persistent map with:
//! - An on-disk 2-3 tree indexing 32-bit key hash codes
//! - Collision chains of serialized key/value pairs
//! - Append-only or space-reclaiming (partitioned) pair records
//! - Multiple-reader / single-writer locking and fail-fast iterators
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                               │
//! │          (RwLock, count, mutation counter, codec)           │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │    Index    │  chain   │    Pairs    │
//!   │ (2-3 tree)  │ ───────► │ (append or  │
//!   │             │  heads   │ partitioned)│
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────────────────────────────┐
//!   │              Storage                │
//!   │    (file / memory-mapped / split)   │
//!   └─────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use pmapkv::{Config, Store};
//!
//! let store: Store<String, u64> = Store::open(
//!     Config::builder().single_file("/tmp/counts.bin").build(),
//! )?;
//! store.put("apples".to_string(), 3)?;
//! assert_eq!(store.get(&"apples".to_string())?, Some(3));
//! # Ok::<(), pmapkv::PmapError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod header;
pub mod codec;
pub mod index;
pub mod pair;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{PmapError, Result};
pub use config::{Config, ConfigBuilder, Layout, PairFormat};
pub use codec::{BincodeCodec, Codec, HashCode};
pub use store::{Iter, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of pmapkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
