//! Storage Module
//!
//! Byte-addressable random access over a logical 64-bit address space.
//!
//! ## Responsibilities
//! - Seek to an offset and read/write fixed-width integers and byte arrays
//! - Grow or truncate the logical length
//! - Guard every seek-then-read/write sequence with a per-handle lock
//!
//! ## Backends
//! ```text
//! ┌──────────────────┬─────────────────────────────────────────────┐
//! │ FileBackend      │ direct per-call access to one file          │
//! │ MappedBackend    │ memory-mapped segments, length kept in the  │
//! │                  │ header allocation cursor                    │
//! │ SplitBackend     │ `name.0`, `name.1`, ... size-capped files   │
//! │                  │ behind one logical offset space             │
//! └──────────────────┴─────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian.

mod file;
mod mapped;
mod split;

pub use file::FileBackend;
pub use mapped::MappedBackend;
pub use split::SplitBackend;

use parking_lot::{Mutex, MutexGuard};

use crate::error::Result;

/// Cursor-based random access to a byte space
///
/// Implementations are not synchronized; [`Storage`] wraps them in a mutex.
pub trait Backend: Send {
    /// Move the cursor to `offset`
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Fill `buf` from the cursor, failing on a short read
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Write all of `buf` at the cursor
    fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Logical length of the byte space
    fn len(&self) -> Result<u64>;

    /// Grow or truncate the logical length
    fn set_len(&mut self, len: u64) -> Result<()>;

    /// Flush everything to the operating system / disk
    fn sync(&mut self) -> Result<()>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // -------------------------------------------------------------------------
    // Typed access at the cursor
    // -------------------------------------------------------------------------

    fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_all(&value.to_be_bytes())
    }

    fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_all(&value.to_be_bytes())
    }

    fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_all(&value.to_be_bytes())
    }

    // -------------------------------------------------------------------------
    // Typed access at an explicit offset
    // -------------------------------------------------------------------------

    fn read_i32_at(&mut self, offset: u64) -> Result<i32> {
        self.seek(offset)?;
        self.read_i32()
    }

    fn read_u32_at(&mut self, offset: u64) -> Result<u32> {
        self.seek(offset)?;
        self.read_u32()
    }

    fn read_u64_at(&mut self, offset: u64) -> Result<u64> {
        self.seek(offset)?;
        self.read_u64()
    }

    fn write_i32_at(&mut self, offset: u64, value: i32) -> Result<()> {
        self.seek(offset)?;
        self.write_i32(value)
    }

    fn write_u32_at(&mut self, offset: u64, value: u32) -> Result<()> {
        self.seek(offset)?;
        self.write_u32(value)
    }

    fn write_u64_at(&mut self, offset: u64, value: u64) -> Result<()> {
        self.seek(offset)?;
        self.write_u64(value)
    }

    fn read_bytes_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.seek(offset)?;
        self.read_exact(buf)
    }

    fn write_bytes_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.seek(offset)?;
        self.write_all(buf)
    }
}

/// A backend behind its own access lock
///
/// ## Concurrency:
/// - `lock()` hands out the backend for an atomic multi-step sequence
/// - The single-shot helpers lock for exactly one seek + read/write
/// - The lock is not reentrant: never hold a guard while calling another
///   method of the same `Storage`
pub struct Storage {
    /// Human readable name for logs and errors
    name: String,

    /// The backend, guarded by the access lock
    backend: Mutex<Box<dyn Backend>>,
}

impl Storage {
    /// Wrap a backend
    pub fn new(name: impl Into<String>, backend: impl Backend + 'static) -> Self {
        Self {
            name: name.into(),
            backend: Mutex::new(Box::new(backend)),
        }
    }

    /// Acquire the access lock for an atomic sequence
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Backend>> {
        self.backend.lock()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> Result<u64> {
        self.lock().len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.lock().is_empty()
    }

    pub fn set_len(&self, len: u64) -> Result<()> {
        self.lock().set_len(len)
    }

    /// Reserve `size` bytes at the end of the byte space and return their offset
    pub fn extend(&self, size: u64) -> Result<u64> {
        let mut backend = self.lock();
        let offset = backend.len()?;
        backend.set_len(offset + size)?;
        Ok(offset)
    }

    pub fn sync(&self) -> Result<()> {
        self.lock().sync()
    }

    pub fn read_i32_at(&self, offset: u64) -> Result<i32> {
        self.lock().read_i32_at(offset)
    }

    pub fn read_u32_at(&self, offset: u64) -> Result<u32> {
        self.lock().read_u32_at(offset)
    }

    pub fn read_u64_at(&self, offset: u64) -> Result<u64> {
        self.lock().read_u64_at(offset)
    }

    pub fn write_i32_at(&self, offset: u64, value: i32) -> Result<()> {
        self.lock().write_i32_at(offset, value)
    }

    pub fn write_u32_at(&self, offset: u64, value: u32) -> Result<()> {
        self.lock().write_u32_at(offset, value)
    }

    pub fn write_u64_at(&self, offset: u64, value: u64) -> Result<()> {
        self.lock().write_u64_at(offset, value)
    }

    pub fn read_bytes_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.lock().read_bytes_at(offset, buf)
    }

    pub fn write_bytes_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        self.lock().write_bytes_at(offset, buf)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("name", &self.name).finish()
    }
}
