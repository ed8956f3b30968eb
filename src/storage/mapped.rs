//! Memory-mapped backend
//!
//! ## Layout
//! ```text
//! file offset 0          52                  52 + SEGMENT_SIZE
//!    ┌─────────────────┬───────────────────┬───────────────────┬─────
//!    │ header mapping  │ segment 0         │ segment 1         │ ...
//!    └─────────────────┴───────────────────┴───────────────────┴─────
//! ```
//!
//! The file is grown one segment at a time and never shrinks. The logical
//! length lives in the header allocation cursor, so truncation only moves
//! the cursor.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};
use tracing::debug;

use crate::error::Result;
use crate::header::{CURSOR_OFFSET, HEADER_SIZE};
use crate::index::NODE_SIZE;

use super::Backend;

/// Bytes per mapped segment (a whole number of index nodes)
pub const SEGMENT_SIZE: u64 = 21_800 * NODE_SIZE;

/// Random access over a file through fixed-size memory-mapped segments
pub struct MappedBackend {
    file: File,
    header: MmapMut,
    segments: Vec<MmapMut>,
    position: u64,
}

impl MappedBackend {
    /// Open or create the file at `path` and map its header
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.metadata()?.len() < HEADER_SIZE {
            file.set_len(HEADER_SIZE)?;
        }

        // SAFETY: the mapping is only valid while no other process truncates
        // the file. Store files are owned by one process, the file is at least
        // HEADER_SIZE long, and the map lives no longer than `file`.
        let header = unsafe { MmapOptions::new().len(HEADER_SIZE as usize).map_mut(&file)? };

        Ok(Self {
            file,
            header,
            segments: Vec::new(),
            position: 0,
        })
    }

    fn cursor(&self) -> u64 {
        let at = CURSOR_OFFSET as usize;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.header[at..at + 8]);
        u64::from_be_bytes(buf)
    }

    fn set_cursor(&mut self, value: u64) {
        let at = CURSOR_OFFSET as usize;
        self.header[at..at + 8].copy_from_slice(&value.to_be_bytes());
    }

    /// Map segments up to and including `index`
    fn ensure_segment(&mut self, index: usize) -> Result<()> {
        while self.segments.len() <= index {
            let start = HEADER_SIZE + self.segments.len() as u64 * SEGMENT_SIZE;
            let end = start + SEGMENT_SIZE;
            if self.file.metadata()?.len() < end {
                self.file.set_len(end)?;
            }

            // SAFETY: same contract as the header mapping; the file has just
            // been grown to cover [start, end).
            let segment = unsafe {
                MmapOptions::new()
                    .offset(start)
                    .len(SEGMENT_SIZE as usize)
                    .map_mut(&self.file)?
            };
            debug!(segment = self.segments.len(), start, "Mapped index segment");
            self.segments.push(segment);
        }
        Ok(())
    }

    /// Mapping that holds `offset`, with the offset inside it
    fn region(&mut self, offset: u64) -> Result<(&mut [u8], usize)> {
        if offset < HEADER_SIZE {
            let local = offset as usize;
            return Ok((&mut self.header[..], local));
        }
        let relative = offset - HEADER_SIZE;
        let index = (relative / SEGMENT_SIZE) as usize;
        let local = (relative % SEGMENT_SIZE) as usize;
        self.ensure_segment(index)?;
        Ok((&mut self.segments[index][..], local))
    }

    /// End of an access of `len` bytes at the current position
    ///
    /// Offsets are signed 64-bit on disk, so anything past `i64::MAX`
    /// (including `EOF`) comes from a corrupt pointer.
    fn access_end(&self, len: usize) -> Result<u64> {
        self.position
            .checked_add(len as u64)
            .filter(|end| *end <= i64::MAX as u64)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("access of {} bytes at {} is out of range", len, self.position),
                )
                .into()
            })
    }

    fn check_readable(&self, len: usize) -> Result<()> {
        let end = self.access_end(len)?;
        if end > self.cursor().max(HEADER_SIZE) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read of {} bytes at {} past mapped length", len, self.position),
            )
            .into());
        }
        Ok(())
    }
}

impl Backend for MappedBackend {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.position = offset;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.check_readable(buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let (region, local) = self.region(self.position)?;
            let take = (region.len() - local).min(buf.len() - done);
            buf[done..done + take].copy_from_slice(&region[local..local + take]);
            done += take;
            self.position += take as u64;
        }
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.access_end(buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let (region, local) = self.region(self.position)?;
            let take = (region.len() - local).min(buf.len() - done);
            region[local..local + take].copy_from_slice(&buf[done..done + take]);
            done += take;
            self.position += take as u64;
        }
        if self.position > HEADER_SIZE && self.position > self.cursor() {
            self.set_cursor(self.position);
        }
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        Ok(self.cursor())
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        self.set_cursor(len);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.header.flush()?;
        for segment in &self.segments {
            segment.flush()?;
        }
        Ok(())
    }
}
